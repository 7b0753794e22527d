//! pair_scheduler - batch matchmaking demo
//!
//! Loads `config/<env>.yaml`, opens the configured intake log, starts the
//! scheduler and drives it with a seeded synthetic workload:
//!
//! ```text
//! ┌────────────┐  join/leave  ┌───────────┐  publish  ┌────────────┐
//! │ Simulation │─────────────▶│ Scheduler │──────────▶│ Intake log │
//! │  (users)   │◀─────────────│  (batch)  │◀──────────│ (mem/WAL)  │
//! └────────────┘   outcomes   └───────────┘  deliver  └────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use pair_scheduler::config::{AppConfig, IntakeBackend};
use pair_scheduler::intake::{IntakeLog, MemoryIntakeLog, ReplayFrom, WalIntakeLog};
use pair_scheduler::{logging, scheduler, simulation};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn open_intake(config: &AppConfig) -> anyhow::Result<Arc<dyn IntakeLog>> {
    let log: Arc<dyn IntakeLog> = match config.intake.backend {
        IntakeBackend::Memory => Arc::new(MemoryIntakeLog::new()),
        IntakeBackend::Wal => {
            let log = WalIntakeLog::open_in_dir(&config.intake.data_dir)?
                .with_compact_after(config.intake.compact_after_frames);
            tracing::info!(path = %log.path().display(), "Using WAL intake log");
            Arc::new(log)
        }
    };
    Ok(log)
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let log = open_intake(&config)?;
    let replay = if config.intake.replay_from_start {
        ReplayFrom::Start
    } else {
        ReplayFrom::Latest
    };

    let (handle, task) = scheduler::spawn(config.scheduler.clone(), log, replay)?;

    let users = simulation::generate_users(&config.simulation, config.scheduler.max_wait_ms);
    let report = simulation::run(&handle, users).await;

    println!("{}", report);
    println!("{}", handle.stats());

    handle.shutdown().await;
    task.await?;
    Ok(())
}

fn main() -> ExitCode {
    let env = get_env();
    let app_config = match AppConfig::load(&env) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        backend = ?app_config.intake.backend,
        "Starting pair scheduler in {} mode",
        env
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(app_config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Scheduler run failed");
            ExitCode::FAILURE
        }
    }
}
