//! skyflats: null point slews and SQM brightness gates from the command line
//!
//! Exit status is 0 on success, 1 on failure and 130 when interrupted.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use skyflats_bridge::cli::{Cli, Commands};
use skyflats_bridge::{init_logging, AlpacaDeviceOps, SkyflatsSettings};
use skyflats_sequencer::{
    execute_calculate_null_point, execute_loop_while_sqm, execute_slew_to_null_point, execute_sqm_condition,
    execute_wait_until_sqm, Clock, InstructionContext, InstructionResult, NodeStatus, NullDeviceOps, SharedDeviceOps,
};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Clock pinned to one instant for `null-point --at`
struct PinnedClock(DateTime<Utc>);

#[async_trait]
impl Clock for PinnedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let mut settings = if cli.config.is_some() {
        SkyflatsSettings::load(&config_path)?
    } else {
        SkyflatsSettings::load_or_default(&config_path)?
    };
    cli.apply(&mut settings).context("invalid command line options")?;

    // Held until main returns so the file writer flushes on exit
    let _log_guard = init_logging(
        settings.logging.directory.as_deref(),
        &settings.logging.level,
        settings.logging.keep_days,
    )?;

    if let Commands::SaveConfig = cli.command {
        settings.save(&config_path)?;
        println!("Settings written to {}", config_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let (ctx, alpaca) = build_context(&cli, &settings, cancel).await?;

    let result = run_command(&cli.command, &settings, &ctx).await;

    if let Some(alpaca) = alpaca {
        alpaca.disconnect_all().await;
    }

    report(&result);
    let status = result.log_and_get_status(command_name(&cli.command));
    Ok(match status {
        NodeStatus::Success => ExitCode::SUCCESS,
        NodeStatus::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

/// Build the instruction context from simulated or Alpaca devices
async fn build_context(
    cli: &Cli,
    settings: &SkyflatsSettings,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<(InstructionContext, Option<Arc<AlpacaDeviceOps>>)> {
    let (device_ops, mount_id, weather_id, alpaca): (SharedDeviceOps, _, _, _) = if cli.simulate {
        tracing::info!("Using simulated devices");
        let ops = match settings.location {
            Some(location) => NullDeviceOps::new(location),
            None => NullDeviceOps::default(),
        };
        (Arc::new(ops) as SharedDeviceOps, "sim:mount".to_string(), Some("sim:sqm".to_string()), None)
    } else {
        let mut ops = AlpacaDeviceOps::new(settings.location);
        let mount_id = ops.add_telescope(&settings.alpaca.telescope())?;
        let weather_id = match settings.alpaca.observing_conditions() {
            Some(device) => Some(ops.add_observing_conditions(&device)?),
            None => None,
        };
        ops.connect_all()
            .await
            .with_context(|| format!("failed to connect to Alpaca server {}", settings.alpaca.base_url))?;
        ops.resolve_location(&mount_id).await?;

        let ops = Arc::new(ops);
        (ops.clone() as SharedDeviceOps, mount_id, weather_id, Some(ops))
    };

    let mut ctx = InstructionContext::new(device_ops)
        .with_mount(mount_id)
        .with_cancellation_token(cancel);
    if let Some(id) = weather_id {
        ctx = ctx.with_weather(id);
    }
    if let Some(location) = settings.location {
        ctx = ctx.with_location(location);
    }
    if let Commands::NullPoint(args) = &cli.command {
        if let Some(at) = args.at {
            ctx = ctx.with_clock(Arc::new(PinnedClock(at)));
        }
    }
    Ok((ctx, alpaca))
}

async fn run_command(command: &Commands, settings: &SkyflatsSettings, ctx: &InstructionContext) -> InstructionResult {
    let progress = |percent: f64, message: String| {
        tracing::info!("[{:>3.0}%] {}", percent, message);
    };

    match command {
        Commands::NullPoint(_) => execute_calculate_null_point(ctx),
        Commands::Sqm(_) => execute_sqm_condition(&settings.loop_while_sqm, ctx).await,
        Commands::Slew(_) => execute_slew_to_null_point(&settings.slew, ctx, Some(&progress)).await,
        Commands::WaitSqm(_) => execute_wait_until_sqm(&settings.wait_until_sqm, ctx, Some(&progress)).await,
        Commands::LoopSqm(args) => {
            let interval = Duration::from_secs(args.interval_secs);
            execute_loop_while_sqm(
                &settings.loop_while_sqm,
                ctx,
                |iteration| async move {
                    tracing::info!("Iteration {}: condition holds", iteration);
                    tokio::select! {
                        _ = ctx.clock.sleep(interval) => InstructionResult::success(),
                        _ = ctx.clock.wait_for_cancellation(&ctx.cancellation_token) => InstructionResult::cancelled("Operation cancelled"),
                    }
                },
                Some(&progress),
            )
            .await
        }
        Commands::SaveConfig => InstructionResult::success(),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::NullPoint(_) => "CalculateNullPoint",
        Commands::Sqm(_) => "SkyflatsCondition",
        Commands::Slew(_) => "SlewToNullPoint",
        Commands::WaitSqm(_) => "WaitUntilSQM",
        Commands::LoopSqm(_) => "LoopWhileSQM",
        Commands::SaveConfig => "SaveConfig",
    }
}

/// Print the result message and any data on stdout
fn report(result: &InstructionResult) {
    if let Some(message) = &result.message {
        println!("{}", message);
    }
    if let Some(data) = &result.data {
        if let Ok(json) = serde_json::to_string_pretty(data) {
            println!("{}", json);
        }
    }
}
