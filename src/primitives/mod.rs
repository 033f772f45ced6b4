//! 版本化能力原语：清单解析与注册表

pub mod manifest;
pub mod registry;

pub use manifest::{Manifest, Primitive, PrimitiveKind};
pub use registry::PrimitiveRegistry;
