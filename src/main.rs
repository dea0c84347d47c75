//! bee-durable 命令行
//!
//! 启动工作流、恢复执行、发送回调信号；开启 `server` feature 时可运行 HTTP 端点。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bee_durable::config::{load_config, AppConfig};
use bee_durable::durable::{
    CallbackResolution, CheckpointStore, DurableRunner, Execution, ExecutionOutcome,
    FileCheckpointStore, MemoryCheckpointStore,
};
use bee_durable::llm::{shared_transport, InferenceGateway};
use bee_durable::workflow::{register_builtin_workflows, WorkflowDeps};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bee-durable", version, about = "Durable, replayable agent workflows")]
struct Cli {
    /// 配置文件路径（默认 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new execution of a workflow.
    Run {
        workflow: String,
        /// JSON input object.
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Resume a running or suspended execution.
    Resume { execution_id: String },
    /// Deliver a callback signal and resume the owning execution.
    Callback {
        token: String,
        payload: String,
        /// Report the callback as failed; payload becomes the error text.
        #[arg(long)]
        failure: bool,
    },
    /// Resume every suspended execution whose pending callback has expired.
    ResumeExpired,
    /// List registered workflows.
    Workflows,
    /// Serve the execution/callback HTTP endpoint.
    #[cfg(feature = "server")]
    Serve {
        /// Override [server].bind.
        #[arg(long)]
        bind: Option<String>,
    },
}

async fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    match cfg.durable.store.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryCheckpointStore::new())),
        "file" => {
            let store = FileCheckpointStore::open(&cfg.durable.store_dir)
                .await
                .with_context(|| {
                    format!("Failed to open store at {}", cfg.durable.store_dir.display())
                })?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown durable store '{other}' (expected memory or file)"),
    }
}

fn print_execution(execution: &Execution) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(execution)?);
    if let ExecutionOutcome::Suspended { pending } = &execution.outcome {
        for token in pending {
            eprintln!(
                "suspended: bee-durable callback {token} '<payload>'  (execution {})",
                execution.execution_id
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        eprintln!("Config load failed ({e}), using defaults");
        AppConfig::default()
    });
    bee_durable::observability::init(&cfg.log.level);

    let store = open_store(&cfg).await?;
    let gateway = InferenceGateway::new(shared_transport(&cfg.llm));
    let deps = WorkflowDeps::from_config(gateway, &cfg);
    let mut runner = DurableRunner::new(store, cfg.durable.context_options());
    register_builtin_workflows(&mut runner, &deps);

    match cli.command {
        Commands::Run { workflow, input } => {
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input must be a JSON value")?;
            let execution = runner
                .start(&workflow, input)
                .await
                .with_context(|| format!("Failed to run workflow {workflow}"))?;
            print_execution(&execution)?;
        }
        Commands::Resume { execution_id } => {
            let execution = runner
                .resume(&execution_id)
                .await
                .with_context(|| format!("Failed to resume {execution_id}"))?;
            print_execution(&execution)?;
        }
        Commands::Callback {
            token,
            payload,
            failure,
        } => {
            let resolution = if failure {
                CallbackResolution::Failure(payload)
            } else {
                CallbackResolution::Success(payload)
            };
            let execution = runner
                .signal_and_resume(&token, resolution)
                .await
                .with_context(|| format!("Failed to deliver callback {token}"))?;
            print_execution(&execution)?;
        }
        Commands::ResumeExpired => {
            let resumed = runner
                .resume_expired()
                .await
                .context("Failed to resume expired executions")?;
            if resumed.is_empty() {
                println!("No expired callbacks.");
            }
            for execution in &resumed {
                print_execution(execution)?;
            }
        }
        Commands::Workflows => {
            for name in runner.workflow_names() {
                println!("{name}");
            }
        }
        #[cfg(feature = "server")]
        Commands::Serve { bind } => {
            use bee_durable::integrations::http::{create_router, ServerState};

            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let runner = Arc::new(runner);

            // 定时恢复回调已过期的挂起执行
            let sweeper = Arc::clone(&runner);
            let every = std::time::Duration::from_secs(cfg.durable.sweep_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                loop {
                    ticker.tick().await;
                    if let Err(e) = sweeper.resume_expired().await {
                        tracing::warn!(error = %e, "expired callback sweep failed");
                    }
                }
            });

            let app = create_router(Arc::new(ServerState { runner }));
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            tracing::info!("bee-durable listening on {}", bind);
            axum::serve(listener, app).await.context("Server error")?;
        }
    }

    Ok(())
}
