use std::process::ExitCode;

use anyhow::anyhow;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use transacted_dual_send::broker::AmqpBroker;
use transacted_dual_send::cli::Cli;
use transacted_dual_send::config::{self, AppConfig};
use transacted_dual_send::env::EnvOverrides;
use transacted_dual_send::{AppError, TransactedDualSend, TransactionOutcome};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version land here too
            return Ok(if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    init_tracing(&settings.log_level)?;

    let invocation = match cli.into_invocation(&settings.connection) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!("{}", e);
            eprintln!("Provide all the arguments in the required format, see --help");
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    let broker = AmqpBroker::new(settings.transaction.durable_queues);
    let sender = TransactedDualSend::new(broker, settings.transaction);

    match sender.run(&invocation).await {
        Ok(TransactionOutcome::Committed) => {
            info!(order = %invocation.input, "Both messages are delivered");
            Ok(ExitCode::SUCCESS)
        }
        Ok(TransactionOutcome::RolledBack) => {
            info!(
                order = %invocation.input,
                "Message cannot be delivered, the transaction is rolled back"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

fn load_settings(cli: &Cli) -> Result<AppConfig, AppError> {
    let overrides = EnvOverrides::load()?;
    let explicit = cli.config.as_deref().or(overrides.config_path.as_deref());

    let mut settings = config::load_config(explicit)?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", default_level, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}
