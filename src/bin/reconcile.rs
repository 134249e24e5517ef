use std::{
    error::Error,
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tokio::signal;

use budget_ledger::{
    PassScope, ReconcileScheduler, ReconcileState, SystemClock, UserID, initialize_db, run_pass,
    setup_logging, spawn_reconcile_worker,
};

/// Recompute cached balances, budget totals and subscription entries.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: PathBuf,

    /// File path to append debug logs to.
    #[arg(long, default_value = "debug.log")]
    log_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile one account and the budgets of its owner.
    Account {
        /// The ID of the account.
        id: i64,
    },
    /// Reconcile every account and budget of one user.
    User {
        /// The ID of the user.
        id: i64,
    },
    /// Reconcile everything.
    All,
    /// Reconcile everything periodically until interrupted.
    Watch {
        /// Seconds between sweeps.
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();

    setup_logging(&args.log_path)?;

    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;

    let scope = match args.command {
        Command::Account { id } => PassScope::Account(id),
        Command::User { id } => PassScope::User(UserID::new(id)),
        Command::All => PassScope::All,
        Command::Watch { interval_secs } => {
            return watch(connection, Duration::from_secs(interval_secs)).await;
        }
    };

    let report = run_pass(scope, &connection, &SystemClock);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn watch(connection: Connection, period: Duration) -> Result<ExitCode, Box<dyn Error>> {
    let state = ReconcileState {
        db_connection: Arc::new(Mutex::new(connection)),
        clock: Arc::new(SystemClock),
    };
    let (queue, worker) = spawn_reconcile_worker(state);

    tracing::info!("sweeping every {} seconds", period.as_secs());

    let mut interval = tokio::time::interval(period);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => queue.schedule(PassScope::All),
            _ = &mut shutdown => break,
        }
    }

    // Let the worker finish the pass it is on before exiting.
    drop(queue);
    worker.await?;

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::debug!("Received ctrl+c signal."),
        _ = terminate => tracing::debug!("Received terminate signal."),
    }
}
