//! Instruction execution implementations
//!
//! These functions implement the skyflats sequence instructions on top of the
//! null point calculator and the brightness gate. They use the DeviceOps trait
//! to communicate with real or simulated hardware.

use crate::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Result of an instruction execution
pub struct InstructionResult {
    pub status: NodeStatus,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl InstructionResult {
    pub fn success() -> Self {
        Self {
            status: NodeStatus::Success,
            message: None,
            data: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Success,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: NodeStatus::Success,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failure,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Create a failure result with a recovery code that the UI can use to offer recovery options
    pub fn failure_with_recovery(message: impl Into<String>, recovery_code: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failure,
            message: Some(message.into()),
            data: Some(serde_json::json!({"recovery_code": recovery_code.into()})),
        }
    }

    /// Failure carrying the error's recovery code
    pub fn from_error(error: &SkyflatsError) -> Self {
        Self::failure_with_recovery(error.to_string(), error.recovery_code())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Cancelled,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Recovery code attached by [`InstructionResult::failure_with_recovery`], if any
    pub fn recovery_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("recovery_code")?.as_str()
    }

    /// Get the status, logging any failure or cancellation message.
    /// This ensures error messages are not silently discarded.
    pub fn log_and_get_status(self, node_name: &str) -> NodeStatus {
        match self.status {
            NodeStatus::Failure => {
                if let Some(msg) = &self.message {
                    tracing::error!("{} failed: {}", node_name, msg);
                } else {
                    tracing::error!("{} failed (no details)", node_name);
                }
            }
            NodeStatus::Cancelled => {
                if let Some(msg) = &self.message {
                    tracing::warn!("{} cancelled: {}", node_name, msg);
                }
            }
            _ => {}
        }
        self.status
    }
}

/// Context for instruction execution
/// Contains the connected devices, observer site and cancellation flag
pub struct InstructionContext {
    /// Cancellation token
    pub cancellation_token: Arc<AtomicBool>,
    /// Connected mount device ID
    pub mount_id: Option<String>,
    /// Connected observing conditions (SQM) device ID
    pub weather_id: Option<String>,
    /// Observer site; falls back to the device ops location when unset
    pub location: Option<ObserverLocation>,
    /// Device operations handler
    pub device_ops: SharedDeviceOps,
    /// Time source for the current instant and poll sleeps
    pub clock: SharedClock,
    /// Null point calculator
    pub calculator: NullPointCalculator,
}

impl InstructionContext {
    pub fn new(device_ops: SharedDeviceOps) -> Self {
        Self {
            cancellation_token: Arc::new(AtomicBool::new(false)),
            mount_id: None,
            weather_id: None,
            location: None,
            device_ops,
            clock: Arc::new(SystemClock),
            calculator: NullPointCalculator::default(),
        }
    }

    pub fn with_mount(mut self, mount_id: impl Into<String>) -> Self {
        self.mount_id = Some(mount_id.into());
        self
    }

    pub fn with_weather(mut self, weather_id: impl Into<String>) -> Self {
        self.weather_id = Some(weather_id.into());
        self
    }

    pub fn with_location(mut self, location: ObserverLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_calculator(mut self, calculator: NullPointCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_cancellation_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn check_cancelled(&self) -> Option<InstructionResult> {
        if self.cancellation_token.load(Ordering::Relaxed) {
            Some(InstructionResult::cancelled("Operation cancelled"))
        } else {
            None
        }
    }

    /// Get mount ID or error
    pub fn mount_id(&self) -> Result<&str, InstructionResult> {
        self.mount_id
            .as_deref()
            .ok_or_else(|| InstructionResult::failure("No mount connected"))
    }

    /// Get observing conditions device ID or error
    pub fn weather_id(&self) -> Result<&str, InstructionResult> {
        self.weather_id.as_deref().ok_or_else(|| {
            InstructionResult::failure_with_recovery("No SQM / observing conditions device connected", "SQM_UNAVAILABLE")
        })
    }

    /// Observer site from the context, or from the device layer
    pub fn observer_location(&self) -> Result<ObserverLocation, InstructionResult> {
        let location = self
            .location
            .or_else(|| self.device_ops.get_observer_location())
            .ok_or_else(|| InstructionResult::failure_with_recovery("No observer location configured", "INVALID_CONFIG"))?;
        location
            .validate()
            .map_err(|e| InstructionResult::from_error(&e))?;
        Ok(location)
    }

    /// Sky quality source backed by the connected observing conditions device
    pub fn sky_quality_source(&self) -> Result<DeviceSkyQuality, InstructionResult> {
        let weather_id = self.weather_id()?;
        Ok(DeviceSkyQuality::new(self.device_ops.clone(), weather_id))
    }
}

// =============================================================================
// PRECONDITIONS
// =============================================================================

/// Fail when the connected mount is parked or cannot report its park state.
///
/// Sends a warning notification before failing. Without a mount the check passes.
pub async fn ensure_mount_unparked(ctx: &InstructionContext) -> SkyflatsResult<()> {
    let Some(mount_id) = ctx.mount_id.as_deref() else {
        tracing::debug!("No mount connected, skipping park check");
        return Ok(());
    };

    let reason = match ctx.device_ops.mount_is_parked(mount_id).await {
        Ok(false) => {
            tracing::debug!("Mount is not parked, proceeding");
            return Ok(());
        }
        Ok(true) => "Mount is parked".to_string(),
        Err(e) => format!("Cannot read park state: {}", e),
    };

    tracing::warn!("{}. Please unpark the mount first.", reason);
    let _ = ctx
        .device_ops
        .send_notification("warning", "Mount parked", "Telescope is parked or unreachable. Unpark it to take sky flats.")
        .await;
    Err(SkyflatsError::PreconditionFailed(reason))
}

// =============================================================================
// CALCULATE NULL POINT
// =============================================================================

/// Compute the null point for the context's observer at the clock's current instant
pub fn calculate_null_point(ctx: &InstructionContext) -> Result<NullPointCoordinate, InstructionResult> {
    let location = ctx.observer_location()?;
    let instant = ctx.clock.now();
    ctx.calculator
        .compute_null_point(&location, &instant)
        .map_err(|e| InstructionResult::from_error(&e))
}

/// Execute the "Calculate null point" instruction (no mount movement)
pub fn execute_calculate_null_point(ctx: &InstructionContext) -> InstructionResult {
    let target = match calculate_null_point(ctx) {
        Ok(t) => t,
        Err(e) => return e,
    };
    tracing::info!("Null point for {}: {}", target.location, target);

    let dms = target.azimuth_dms();
    let data = serde_json::json!({
        "azimuth": target.azimuth,
        "altitude": target.altitude,
        "az_degrees": dms.degrees,
        "az_minutes": dms.minutes,
        "az_seconds": dms.seconds,
        "instant": target.instant.to_rfc3339(),
    });
    InstructionResult::success_with_data(format!("Null point: {}", target), data)
}

// =============================================================================
// SLEW TO NULL POINT
// =============================================================================

/// Mount status poll interval while waiting for a slew to finish
const MOUNT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest signed difference between two azimuths, in degrees (-180, 180]
fn azimuth_diff_degrees(actual: f64, target: f64) -> f64 {
    let diff = (actual - target).rem_euclid(360.0);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Validate that mount reached the target alt/az within tolerance
fn validate_alt_az_position(
    az_target: f64,
    alt_target: f64,
    az_actual: f64,
    alt_actual: f64,
    tolerance_deg: f64,
) -> Result<(), String> {
    let az_diff = azimuth_diff_degrees(az_actual, az_target);
    let alt_diff = alt_actual - alt_target;

    if az_diff.abs() > tolerance_deg || alt_diff.abs() > tolerance_deg {
        return Err(format!(
            "Mount slew did not reach target position. Expected Az={:.4}°, Alt={:.4}°, \
             got Az={:.4}°, Alt={:.4}° (diff: Az={:.2}', Alt={:.2}')",
            az_target,
            alt_target,
            az_actual,
            alt_actual,
            az_diff * 60.0,
            alt_diff * 60.0
        ));
    }

    Ok(())
}

enum SlewWait {
    Settled,
    Cancelled,
}

/// Wait for mount to stop slewing, aborting the slew on cancellation
async fn wait_for_mount_idle_with_progress(
    mount_id: &str,
    ctx: &InstructionContext,
    timeout: Duration,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> SkyflatsResult<SlewWait> {
    let max_polls = (timeout.as_millis() / MOUNT_POLL_INTERVAL.as_millis()).max(1);
    let mut poll_count = 0u128;

    loop {
        if ctx.cancellation_token.load(Ordering::Relaxed) {
            tracing::info!("Slew cancelled, aborting...");
            let _ = ctx.device_ops.mount_abort_slew(mount_id).await;
            return Ok(SlewWait::Cancelled);
        }

        match ctx.device_ops.mount_is_slewing(mount_id).await {
            Ok(false) => {
                tracing::debug!("Mount reached target position");
                return Ok(SlewWait::Settled);
            }
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("Error checking slew status: {}", e);
                // Continue polling - transient error
            }
        }

        poll_count += 1;
        let elapsed_secs = poll_count as f64 * MOUNT_POLL_INTERVAL.as_secs_f64();
        // Emit progress every 2 seconds (4 polls at 500ms)
        if poll_count % 4 == 0 {
            let progress = (elapsed_secs / 60.0 * 100.0).min(95.0);
            if let Some(cb) = progress_callback {
                cb(progress, format!("Slewing... ({:.0}s)", elapsed_secs));
            }
        }

        if poll_count >= max_polls {
            let _ = ctx.device_ops.mount_abort_slew(mount_id).await;
            return Err(SkyflatsError::SlewFailed(format!(
                "Mount slew timed out after {} seconds",
                timeout.as_secs()
            )));
        }

        tokio::select! {
            _ = ctx.clock.sleep(MOUNT_POLL_INTERVAL) => {}
            _ = ctx.clock.wait_for_cancellation(&ctx.cancellation_token) => {}
        }
    }
}

/// Execute the "Slew to null point" instruction
pub async fn execute_slew_to_null_point(
    config: &SlewToNullPointConfig,
    ctx: &InstructionContext,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> InstructionResult {
    tracing::info!("Executing {}", config);

    let mount_id = match ctx.mount_id() {
        Ok(id) => id,
        Err(e) => return e,
    };

    if let Some(result) = ctx.check_cancelled() {
        return result;
    }

    if let Err(e) = ensure_mount_unparked(ctx).await {
        return InstructionResult::from_error(&e);
    }

    let target = match calculate_null_point(ctx) {
        Ok(t) => t,
        Err(e) => return e,
    };

    tracing::info!("Slewing to null point {}", target);
    if let Some(cb) = progress_callback {
        cb(0.0, format!("Slewing to null point Az: {}, Alt: {:.0}°", target.azimuth_dms(), target.altitude));
    }

    // Start the slew
    let slew_started = tokio::select! {
        result = ctx.device_ops.mount_slew_to_alt_az(mount_id, target.azimuth, target.altitude) => result,
        _ = ctx.clock.wait_for_cancellation(&ctx.cancellation_token) => {
            tracing::info!("Slew cancelled, aborting...");
            let _ = ctx.device_ops.mount_abort_slew(mount_id).await;
            return InstructionResult::cancelled("Slew cancelled");
        }
    };
    if let Err(e) = slew_started {
        return InstructionResult::from_error(&SkyflatsError::SlewFailed(e));
    }

    if !config.wait_for_slew {
        return InstructionResult::success_with_message(format!("Slew to null point {} started", target));
    }

    let timeout = Duration::from_secs(config.slew_timeout_secs);
    match wait_for_mount_idle_with_progress(mount_id, ctx, timeout, progress_callback).await {
        Ok(SlewWait::Settled) => {}
        Ok(SlewWait::Cancelled) => return InstructionResult::cancelled("Slew cancelled"),
        Err(e) => return InstructionResult::from_error(&e),
    }

    // Validate that mount reached the target position
    match ctx.device_ops.mount_get_alt_az(mount_id).await {
        Ok((actual_az, actual_alt)) => {
            tracing::debug!(
                "Slew completed. Target: Az={:.4}°, Alt={:.4}°, Actual: Az={:.4}°, Alt={:.4}°",
                target.azimuth,
                target.altitude,
                actual_az,
                actual_alt
            );

            if let Err(e) = validate_alt_az_position(
                target.azimuth,
                target.altitude,
                actual_az,
                actual_alt,
                config.position_tolerance_deg,
            ) {
                tracing::warn!("Slew position validation failed: {}", e);
                return InstructionResult::failure_with_recovery(e, "SLEW_POSITION_MISMATCH");
            }

            if let Some(cb) = progress_callback {
                cb(100.0, format!("Arrived at Az: {:.2}°, Alt: {:.1}°", actual_az, actual_alt));
            }
            InstructionResult::success_with_message(format!(
                "Slewed to null point Az: {:.4}°, Alt: {:.4}° (verified)",
                actual_az, actual_alt
            ))
        }
        Err(e) => {
            tracing::warn!(
                "Slew completed but could not verify position: {}. Assuming success based on slew completion.",
                e
            );
            if let Some(cb) = progress_callback {
                cb(100.0, format!("Arrived at null point {} (unverified)", target));
            }
            InstructionResult::success_with_message(format!(
                "Slewed to null point {} (position unverified: {})",
                target, e
            ))
        }
    }
}

// =============================================================================
// WAIT UNTIL SQM
// =============================================================================

/// Execute the "Wait until SQM" instruction
///
/// Blocks until the sky quality passes the configured threshold or the
/// instruction is cancelled. A failed sensor read ends the wait as a failure.
pub async fn execute_wait_until_sqm(
    config: &WaitUntilSqmConfig,
    ctx: &InstructionContext,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> InstructionResult {
    tracing::info!("Executing {}", config);

    if let Some(result) = ctx.check_cancelled() {
        return result;
    }

    if let Err(e) = ensure_mount_unparked(ctx).await {
        return InstructionResult::from_error(&e);
    }

    let gate = match config.gate() {
        Ok(g) => g,
        Err(e) => return InstructionResult::from_error(&e),
    };

    let source = match ctx.sky_quality_source() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let threshold = *gate.threshold();
    let on_reading = move |poll: u32, reading: f64| {
        if let Some(cb) = progress_callback {
            cb(0.0, format!("SQM {:.2}, waiting for {} (poll {})", reading, threshold, poll));
        }
    };

    match gate
        .wait_until(&source, &ctx.cancellation_token, ctx.clock.as_ref(), Some(&on_reading))
        .await
    {
        Ok(GateState::Satisfied) => {
            if let Some(cb) = progress_callback {
                cb(100.0, format!("SQM {}", threshold));
            }
            InstructionResult::success_with_message(format!("Sky quality is {}", threshold))
        }
        Ok(GateState::Cancelled) => InstructionResult::cancelled("Wait for SQM cancelled"),
        Ok(GateState::Waiting) => InstructionResult::failure("SQM wait ended without a result"),
        Err(e) => InstructionResult::from_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::device_ops::testing::MockDeviceOps;
    use crate::null_point::EquatorialPosition;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct CountingEphemeris {
        calls: AtomicUsize,
    }

    impl SolarEphemeris for CountingEphemeris {
        fn solar_equatorial_position(
            &self,
            instant: &DateTime<Utc>,
            location: &ObserverLocation,
        ) -> SkyflatsResult<EquatorialPosition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            LowPrecisionSolarEphemeris.solar_equatorial_position(instant, location)
        }
    }

    struct Harness {
        ops: Arc<MockDeviceOps>,
        ephemeris: Arc<CountingEphemeris>,
        clock: Arc<FixedClock>,
        ctx: InstructionContext,
    }

    fn harness(ops: MockDeviceOps) -> Harness {
        let ops = Arc::new(ops);
        let ephemeris = Arc::new(CountingEphemeris {
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 20, 18, 0, 0).unwrap()));
        let ctx = InstructionContext::new(ops.clone())
            .with_mount("mount")
            .with_weather("sqm")
            .with_clock(clock.clone())
            .with_calculator(NullPointCalculator::new(ephemeris.clone()));
        Harness {
            ops,
            ephemeris,
            clock,
            ctx,
        }
    }

    #[test]
    fn test_azimuth_diff_wraps() {
        assert!((azimuth_diff_degrees(1.0, 359.0) - 2.0).abs() < 1e-9);
        assert!((azimuth_diff_degrees(359.0, 1.0) + 2.0).abs() < 1e-9);
        assert!((azimuth_diff_degrees(90.0, 80.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_alt_az_position() {
        assert!(validate_alt_az_position(270.0, 75.0, 270.1, 75.05, 0.5).is_ok());
        assert!(validate_alt_az_position(359.9, 75.0, 0.2, 75.0, 0.5).is_ok());

        let result = validate_alt_az_position(270.0, 75.0, 272.0, 75.0, 0.5);
        assert!(result.unwrap_err().contains("did not reach target"));
        assert!(validate_alt_az_position(270.0, 75.0, 270.0, 74.0, 0.5).is_err());
    }

    #[test]
    fn test_recovery_code_accessor() {
        let result = InstructionResult::failure_with_recovery("parked", "MOUNT_PARKED");
        assert_eq!(result.recovery_code(), Some("MOUNT_PARKED"));
        assert_eq!(InstructionResult::failure("x").recovery_code(), None);
    }

    #[tokio::test]
    async fn test_wait_until_sqm_parked_fails_without_reading_sensor() {
        let h = harness(MockDeviceOps::parked());

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("MOUNT_PARKED"));
        assert_eq!(h.ops.sky_read_count(), 0);
        assert_eq!(h.ops.notification_count(), 1);
    }

    #[tokio::test]
    async fn test_slew_parked_fails_without_ephemeris() {
        let h = harness(MockDeviceOps::parked());

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("MOUNT_PARKED"));
        assert_eq!(h.ephemeris.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.ops.slew_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_park_state_blocks_instructions() {
        let mut ops = MockDeviceOps::new().with_sky_readings(vec![12.0]);
        ops.park_query_fails = true;
        let h = harness(ops);

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, None).await;
        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("MOUNT_PARKED"));
        assert_eq!(h.ops.sky_read_count(), 0);

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;
        assert_eq!(result.recovery_code(), Some("MOUNT_PARKED"));
        assert_eq!(h.ops.slew_count(), 0);
        assert_eq!(h.ephemeris.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.ops.notification_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_until_sqm_satisfied_on_third_read() {
        let h = harness(MockDeviceOps::new().with_sky_readings(vec![5.0, 7.0, 9.0]));
        let updates = Mutex::new(Vec::new());
        let progress = |_: f64, msg: String| updates.lock().unwrap().push(msg);

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, Some(&progress)).await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(h.ops.sky_read_count(), 3);
        assert_eq!(h.clock.sleep_count(), 2);
        assert_eq!(updates.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_wait_until_sqm_sensor_failure() {
        let mut ops = MockDeviceOps::new();
        ops.sky_fails = true;
        let h = harness(ops);

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("SQM_UNAVAILABLE"));
        assert_eq!(h.ops.sky_read_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_until_sqm_without_weather_device() {
        let mut h = harness(MockDeviceOps::new());
        h.ctx.weather_id = None;

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, None).await;
        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(h.ops.sky_read_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_until_sqm_cancelled() {
        let h = harness(MockDeviceOps::new().with_sky_readings(vec![1.0]));
        h.ctx.cancellation_token.store(true, Ordering::SeqCst);

        let result = execute_wait_until_sqm(&WaitUntilSqmConfig::default(), &h.ctx, None).await;
        assert_eq!(result.status, NodeStatus::Cancelled);
        assert_eq!(h.ops.sky_read_count(), 0);
    }

    #[tokio::test]
    async fn test_calculate_null_point_reports_dms() {
        let h = harness(MockDeviceOps::new());

        let result = execute_calculate_null_point(&h.ctx);

        assert_eq!(result.status, NodeStatus::Success);
        let data = result.data.unwrap();
        assert_eq!(data["altitude"].as_f64(), Some(NULL_POINT_ALTITUDE_DEG));
        let azimuth = data["azimuth"].as_f64().unwrap();
        assert!((0.0..360.0).contains(&azimuth));
        assert_eq!(data["az_degrees"].as_i64(), Some(azimuth.trunc() as i64));
        assert_eq!(h.ephemeris.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_context_location_overrides_device_location() {
        let h = harness(MockDeviceOps::new());
        let site = ObserverLocation::new(-33.9, 18.4, 10.0).unwrap();
        let ctx = h.ctx.with_location(site);
        assert_eq!(ctx.observer_location().ok(), Some(site));
    }

    #[tokio::test]
    async fn test_missing_location_fails() {
        let mut ops = MockDeviceOps::new();
        ops.location = None;
        let h = harness(ops);

        let result = execute_calculate_null_point(&h.ctx);
        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("INVALID_CONFIG"));
    }

    #[tokio::test]
    async fn test_slew_to_null_point_waits_and_verifies() {
        let h = harness(MockDeviceOps::new().with_slewing_polls(3));

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(h.ops.slew_count(), 1);
        assert_eq!(h.clock.sleep_count(), 3);
        let (az, alt) = h.ops.slews.lock().unwrap()[0];
        assert_eq!(alt, NULL_POINT_ALTITUDE_DEG);
        assert!((0.0..360.0).contains(&az));
    }

    #[tokio::test]
    async fn test_slew_target_matches_calculated_null_point() {
        let h = harness(MockDeviceOps::new());
        let expected = calculate_null_point(&h.ctx).ok().unwrap();

        execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;

        let (az, _) = h.ops.slews.lock().unwrap()[0];
        assert_eq!(az.to_bits(), expected.azimuth.to_bits());
    }

    #[tokio::test]
    async fn test_slew_position_mismatch() {
        let mut ops = MockDeviceOps::new();
        ops.azimuth_error = 3.0;
        let h = harness(ops);

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("SLEW_POSITION_MISMATCH"));
    }

    #[tokio::test]
    async fn test_slew_timeout_aborts() {
        let h = harness(MockDeviceOps::new().with_slewing_polls(usize::MAX));
        let config = SlewToNullPointConfig {
            slew_timeout_secs: 2,
            ..Default::default()
        };

        let result = execute_slew_to_null_point(&config, &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("SLEW_FAILED"));
        assert_eq!(h.ops.abort_count(), 1);
        assert_eq!(h.clock.sleep_count(), 3);
    }

    #[tokio::test]
    async fn test_slew_rejected_by_mount() {
        let mut ops = MockDeviceOps::new();
        ops.slew_fails = true;
        let h = harness(ops);

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;
        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(result.recovery_code(), Some("SLEW_FAILED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slew_cancelled_while_waiting_aborts_mount() {
        let ops = Arc::new(MockDeviceOps::new().with_slewing_polls(usize::MAX));
        let token = Arc::new(AtomicBool::new(false));
        let ctx = InstructionContext::new(ops.clone())
            .with_mount("mount")
            .with_cancellation_token(token.clone());

        let setter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            setter.store(true, Ordering::Relaxed);
        });

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &ctx, None).await;

        assert_eq!(result.status, NodeStatus::Cancelled);
        assert_eq!(ops.abort_count(), 1);
    }

    #[tokio::test]
    async fn test_slew_without_waiting() {
        let h = harness(MockDeviceOps::new().with_slewing_polls(10));
        let config = SlewToNullPointConfig {
            wait_for_slew: false,
            ..Default::default()
        };

        let result = execute_slew_to_null_point(&config, &h.ctx, None).await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(h.clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_slew_requires_mount() {
        let mut h = harness(MockDeviceOps::new());
        h.ctx.mount_id = None;

        let result = execute_slew_to_null_point(&SlewToNullPointConfig::default(), &h.ctx, None).await;
        assert_eq!(result.status, NodeStatus::Failure);
        assert_eq!(h.ephemeris.calls.load(Ordering::SeqCst), 0);
    }
}
