//! PRP Compiler 命令行
//!
//! `prp-compiler compile <goal> --out prp.json`：收集上下文、合成并写出 PRP；任何错误退出码为 1。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use prp_compiler::config::load_config;
use prp_compiler::core::CompilerBuilder;
use prp_compiler::observability;

#[derive(Parser)]
#[command(name = "prp-compiler")]
#[command(about = "Compile a natural-language goal into a Product Requirement Prompt", long_about = None)]
struct Cli {
    /// 配置文件（叠加在 config/default.toml 之上）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出 debug 级别日志（Thought / Action / Observation）
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 编译一个目标
    Compile {
        goal: String,

        /// PRP JSON 输出路径
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        primitives_path: Option<PathBuf>,

        /// 跳过策略选择，直接使用该策略
        #[arg(long)]
        strategy: Option<String>,

        /// 同时写出编排结果（策略、schema、步骤）
        #[arg(long)]
        plan_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Commands::Compile {
            goal,
            out,
            primitives_path,
            strategy,
            plan_out,
        } => {
            let mut builder = CompilerBuilder::new(cfg);
            if let Some(path) = primitives_path {
                builder = builder.with_primitives_path(path);
            }
            let compiler = builder.build().context("Failed to initialize compiler")?;

            let plan = compiler.plan(&goal, strategy.as_deref()).await;
            if let Some(path) = &plan_out {
                let json = serde_json::to_string_pretty(&plan)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write plan to {}", path.display()))?;
                tracing::info!(path = %path.display(), "plan written");
            }
            if let Some(error) = &plan.error {
                bail!("context assembly failed: {error}");
            }

            let prp = compiler.synthesize(&plan).await?;
            std::fs::write(&out, serde_json::to_string_pretty(&prp)?)
                .with_context(|| format!("Failed to write PRP to {}", out.display()))?;

            let (prompt, completion, total) = compiler.token_usage();
            tracing::info!(prompt, completion, total, "token usage");
            println!("PRP written to {}", out.display());
        }
    }
    Ok(())
}
