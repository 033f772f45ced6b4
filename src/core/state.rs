//! Planner 状态机
//!
//! SelectingStrategy -> Stepping(1..max_steps) -> Finished | Exhausted；
//! Stepping 与 AwaitingObservation 交替：每次 next 产出一个动作后，必须由外部 feed 观察结果才能进入下一步。

use serde::Serialize;

/// 一次规划会话所处的阶段
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PlannerPhase {
    SelectingStrategy,
    /// 即将执行第 n 步（从 1 开始）
    Stepping(usize),
    /// 第 n 步已产出动作，等待观察结果
    AwaitingObservation(usize),
    Finished,
    Exhausted,
}
