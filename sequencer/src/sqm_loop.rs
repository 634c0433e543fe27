//! "Loop while SQM" condition
//!
//! Repeats a sequence body while the sky quality stays on the configured side of
//! the threshold. The condition is re-read before every iteration.

use crate::brightness_gate::DeviceSkyQuality;
use crate::instructions::{ensure_mount_unparked, InstructionContext, InstructionResult};
use crate::*;
use std::future::Future;

/// Evaluate the loop condition once against a fresh SQM reading
pub async fn check_sqm_condition(config: &SqmConditionConfig, ctx: &InstructionContext) -> SkyflatsResult<bool> {
    read_sqm_condition(config, ctx).await.map(|(_, holds)| holds)
}

/// Fresh SQM reading with the condition's verdict, after the park check
async fn read_sqm_condition(config: &SqmConditionConfig, ctx: &InstructionContext) -> SkyflatsResult<(f64, bool)> {
    let threshold = config.sqm_threshold()?;
    ensure_mount_unparked(ctx).await?;

    let weather_id = ctx
        .weather_id
        .as_deref()
        .ok_or_else(|| SkyflatsError::SensorUnavailable("no SQM device connected".to_string()))?;
    let source = DeviceSkyQuality::new(ctx.device_ops.clone(), weather_id);

    let reading = source.sky_quality().await?;
    let holds = threshold.is_satisfied(reading);
    tracing::debug!("{}: SQM {:.2} {} -> {}", config, reading, threshold, holds);
    Ok((reading, holds))
}

/// Evaluate the condition once and report the reading.
///
/// Succeeds whether or not the condition holds; `condition_met` in the result
/// data carries the verdict.
pub async fn execute_sqm_condition(config: &SqmConditionConfig, ctx: &InstructionContext) -> InstructionResult {
    tracing::info!("Evaluating {}", config);
    match read_sqm_condition(config, ctx).await {
        Ok((reading, holds)) => InstructionResult::success_with_data(
            format!(
                "SQM {:.2}: {} {:.2} is {}",
                reading,
                config.comparison,
                config.threshold,
                if holds { "met" } else { "not met" }
            ),
            serde_json::json!({ "sqm": reading, "condition_met": holds }),
        ),
        Err(e) => InstructionResult::from_error(&e),
    }
}

/// Run `body` while the SQM condition holds.
///
/// `body` receives the 1-based iteration number. The loop stops with the body's
/// result when an iteration fails or is cancelled.
pub async fn execute_loop_while_sqm<F, Fut>(
    config: &SqmConditionConfig,
    ctx: &InstructionContext,
    mut body: F,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> InstructionResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = InstructionResult>,
{
    tracing::info!("Executing {}", config);
    let mut iteration = 0u32;

    loop {
        if let Some(result) = ctx.check_cancelled() {
            return result;
        }

        match check_sqm_condition(config, ctx).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("SQM condition no longer holds after {} iteration(s)", iteration);
                return InstructionResult::success_with_message(format!(
                    "Loop finished after {} iteration(s)",
                    iteration
                ));
            }
            Err(e) => return InstructionResult::from_error(&e),
        }

        iteration += 1;
        if let Some(cb) = progress_callback {
            cb(0.0, format!("SQM loop iteration {}", iteration));
        }

        let result = body(iteration).await;
        match result.status {
            NodeStatus::Failure | NodeStatus::Cancelled => return result,
            _ => {}
        }
    }
}
