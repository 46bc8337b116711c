use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use task_autopilot::agent::AgentDriver;
use task_autopilot::command::{self, HELP, ReplCommand};
use task_autopilot::config::EngineConfig;
use task_autopilot::engine::{Engine, EngineHandle, TickAction, TickReport};
use task_autopilot::error::{AutopilotError, Result};
use task_autopilot::executor::DryRunExecutor;
use task_autopilot::memory::FileInsightStore;
use task_autopilot::planner::HeuristicPlanner;
use task_autopilot::tasks::{FilePersistence, RecoveryPolicy};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 单 agent 自主任务调度器
#[derive(Parser, Debug)]
#[command(name = "task-autopilot", version, about = "Autonomous single-agent task scheduler")]
struct Cli {
    /// YAML 配置文件
    #[arg(short, long)]
    config: Option<String>,

    /// 任务快照文件
    #[arg(long)]
    tasks: Option<String>,

    /// 长期记忆文件
    #[arg(long)]
    memory: Option<String>,

    /// 启动即开启自主模式
    #[arg(short, long)]
    autonomous: bool,

    /// tick 间隔（秒）
    #[arg(long)]
    tick_secs: Option<u64>,

    /// 重启时对 Active 任务的处理：reset_active | resume
    #[arg(long)]
    recovery: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("task_autopilot=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = apply_cli(EngineConfig::from_sources(cli.config.as_deref())?, &cli)?;
    config.validate()?;

    let persistence = Arc::new(FilePersistence::new(&config.tasks_path)?);
    let memory = Arc::new(FileInsightStore::new(&config.memory_path)?);
    let driver = AgentDriver::new(
        Arc::new(HeuristicPlanner::new()),
        Arc::new(DryRunExecutor),
        memory,
    )
    .insight_limit(config.insight_query_limit);

    let (handle, join) = Engine::new(driver)
        .with_config(&config)
        .with_persistence(persistence)
        .restore(config.recovery)
        .await?
        .spawn();

    println!("🤖 task-autopilot ready. Type 'help' for commands.");
    let runtime = Handle::current();
    let repl_handle = handle.clone();
    let repl = tokio::task::spawn_blocking(move || run_repl(&runtime, &repl_handle)).await;

    handle.shutdown().await;
    let _ = join.await;
    info!("👋 已退出");

    repl.map_err(|e| AutopilotError::Other(format!("REPL 线程异常: {e}")))?
}

fn apply_cli(mut config: EngineConfig, cli: &Cli) -> Result<EngineConfig> {
    if let Some(path) = &cli.tasks {
        config = config.tasks_path(path);
    }
    if let Some(path) = &cli.memory {
        config = config.memory_path(path);
    }
    if cli.autonomous {
        config = config.autonomous(true);
    }
    if let Some(secs) = cli.tick_secs {
        config = config.tick_interval_secs(secs);
    }
    if let Some(raw) = &cli.recovery {
        let policy = RecoveryPolicy::parse(raw).ok_or_else(|| {
            AutopilotError::Other(format!("unknown recovery policy '{}'", raw))
        })?;
        config = config.recovery(policy);
    }
    Ok(config)
}

/// 阻塞线程上的 REPL，每条命令通过 runtime 在调度循环上执行
fn run_repl(runtime: &Handle, handle: &EngineHandle) -> Result<()> {
    let mut editor = DefaultEditor::new().map_err(|e| AutopilotError::Other(e.to_string()))?;
    loop {
        match editor.readline("autopilot> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ReplCommand::Quit)) => break,
                    Ok(Some(cmd)) => {
                        if let Err(e) = runtime.block_on(execute(handle, cmd)) {
                            println!("❌ {}", e);
                        }
                    }
                    Err(message) => println!("⚠️ {}", message),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(AutopilotError::Other(e.to_string())),
        }
    }
    Ok(())
}

async fn execute(handle: &EngineHandle, cmd: ReplCommand) -> Result<()> {
    match cmd {
        ReplCommand::Add(spec) => {
            let id = handle.add_task(spec).await?;
            println!("✅ Added task {}", id);
        }
        ReplCommand::List => {
            let tasks = handle.list_tasks().await?;
            if tasks.is_empty() {
                println!("(no tasks)");
            }
            for task in &tasks {
                println!("{}", command::task_line(task));
            }
        }
        ReplCommand::Show(id) => {
            let task = handle.get_task(id).await?;
            println!("{}", command::task_detail(&task));
        }
        ReplCommand::Activate(id) => {
            handle.activate_task(id).await?;
            println!("▶️ Activated {}", id);
        }
        ReplCommand::Complete(id) => {
            handle.complete_task(id).await?;
            println!("✅ Completed {}", id);
        }
        ReplCommand::Delete(id) => {
            let deleted = handle.delete_task(id).await?;
            if deleted.was_active {
                println!("🗑️ Cancelled {} (in-flight work aborted)", id);
            } else {
                println!("🗑️ Cancelled {}", id);
            }
        }
        ReplCommand::Auto(enabled) => {
            handle.set_autonomous(enabled).await?;
            println!("Autonomous mode {}", if enabled { "on" } else { "off" });
        }
        ReplCommand::Tick => {
            let report = handle.tick_now().await?;
            print_report(&report);
        }
        ReplCommand::Status => println!("{}", handle.status().await?),
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Quit => {}
    }
    Ok(())
}

fn print_report(report: &TickReport) {
    match &report.action {
        TickAction::Idle => println!("😴 Nothing to do"),
        TickAction::Activated(id) => println!("▶️ Activated {}", id),
        TickAction::Advanced { task, from, to } => println!("⏩ {}: {} -> {}", task, from, to),
        TickAction::Abandoned(id) => println!("🛑 Abandoned in-flight work for {}", id),
    }
    for (task, dependency) in &report.blocked {
        println!("⛔ {} failed: dependency {} can never complete", task, dependency);
    }
    for (done, next) in &report.rematerialized {
        println!("🔁 {} scheduled as {}", done, next);
    }
}
