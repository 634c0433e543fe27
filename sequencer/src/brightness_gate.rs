//! Sky quality (SQM) threshold gate
//!
//! The gate has no memory: it is a pure function of the current reading, the
//! threshold and the comparison direction. "Wait until" is the same check
//! evaluated repeatedly until it passes or the host cancels.

use crate::clock::Clock;
use crate::device_ops::SharedDeviceOps;
use crate::error::{SkyflatsError, SkyflatsResult};
use crate::SqmComparison;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;


/// Evaluate a single SQM reading against a threshold.
///
/// Larger SQM values are darker skies: `DarkerThan` passes when
/// `reading > threshold`, `BrighterThan` when `reading < threshold`.
pub fn evaluate(reading: f64, threshold: f64, comparison: SqmComparison) -> bool {
    match comparison {
        SqmComparison::DarkerThan => reading > threshold,
        SqmComparison::BrighterThan => reading < threshold,
    }
}

/// Validated threshold and comparison direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqmThreshold {
    threshold: f64,
    comparison: SqmComparison,
}

impl SqmThreshold {
    pub fn new(threshold: f64, comparison: SqmComparison) -> SkyflatsResult<Self> {
        if !threshold.is_finite() {
            return Err(SkyflatsError::InvalidConfig(format!(
                "SQM threshold must be finite, got {}",
                threshold
            )));
        }
        Ok(Self { threshold, comparison })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn comparison(&self) -> SqmComparison {
        self.comparison
    }

    pub fn is_satisfied(&self, reading: f64) -> bool {
        evaluate(reading, self.threshold, self.comparison)
    }
}

impl fmt::Display for SqmThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.comparison, self.threshold)
    }
}

/// Run-time state of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    Waiting,
    Satisfied,
    Cancelled,
}

/// Source of live sky quality readings
#[async_trait]
pub trait BrightnessSource: Send + Sync {
    async fn sky_quality(&self) -> SkyflatsResult<f64>;
}

/// Reads sky quality from a weather / observing conditions device
pub struct DeviceSkyQuality {
    device_ops: SharedDeviceOps,
    weather_id: String,
}

impl DeviceSkyQuality {
    pub fn new(device_ops: SharedDeviceOps, weather_id: impl Into<String>) -> Self {
        Self {
            device_ops,
            weather_id: weather_id.into(),
        }
    }
}

#[async_trait]
impl BrightnessSource for DeviceSkyQuality {
    async fn sky_quality(&self) -> SkyflatsResult<f64> {
        let reading = self
            .device_ops
            .weather_get_sky_quality(&self.weather_id)
            .await
            .map_err(|e| SkyflatsError::SensorUnavailable(format!("{}: {}", self.weather_id, e)))?;

        if !reading.is_finite() {
            return Err(SkyflatsError::SensorUnavailable(format!(
                "{} reported a non-finite sky quality ({})",
                self.weather_id, reading
            )));
        }
        Ok(reading)
    }
}

/// Threshold gate with a poll interval for blocking waits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessGate {
    threshold: SqmThreshold,
    poll_interval: Duration,
}

impl BrightnessGate {
    pub fn new(threshold: SqmThreshold) -> Self {
        Self {
            threshold,
            poll_interval: Duration::from_millis(crate::DEFAULT_SQM_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> SkyflatsResult<Self> {
        if poll_interval.is_zero() {
            return Err(SkyflatsError::InvalidConfig("SQM poll interval must be positive".to_string()));
        }
        self.poll_interval = poll_interval;
        Ok(self)
    }

    pub fn threshold(&self) -> &SqmThreshold {
        &self.threshold
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Read the source once and evaluate. Returns the reading with the verdict.
    pub async fn check(&self, source: &dyn BrightnessSource) -> SkyflatsResult<(f64, bool)> {
        let reading = source.sky_quality().await?;
        Ok((reading, self.threshold.is_satisfied(reading)))
    }

    /// Poll until the gate passes or `cancellation_token` is set.
    ///
    /// There is no iteration limit. A failed read ends the wait with an error.
    /// `on_reading` receives the poll number (starting at 1) and the reading.
    pub async fn wait_until(
        &self,
        source: &dyn BrightnessSource,
        cancellation_token: &AtomicBool,
        clock: &dyn Clock,
        on_reading: Option<&(dyn Fn(u32, f64) + Send + Sync)>,
    ) -> SkyflatsResult<GateState> {
        let mut poll = 0u32;
        let mut state = GateState::Waiting;

        while state == GateState::Waiting {
            if cancellation_token.load(Ordering::Relaxed) {
                state = GateState::Cancelled;
                break;
            }

            poll = poll.saturating_add(1);
            let (reading, satisfied) = self.check(source).await?;
            tracing::debug!("SQM poll {}: {:.2} (waiting for {})", poll, reading, self.threshold);

            if let Some(cb) = on_reading {
                cb(poll, reading);
            }

            if satisfied {
                state = GateState::Satisfied;
                break;
            }

            tokio::select! {
                _ = clock.sleep(self.poll_interval) => {}
                _ = clock.wait_for_cancellation(cancellation_token) => {
                    state = GateState::Cancelled;
                }
            }
        }

        tracing::debug!("SQM wait finished after {} poll(s): {:?}", poll, state);
        Ok(state)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Sensor that replays a fixed list of readings, repeating the last one
    pub struct ScriptedSensor {
        readings: Vec<SkyflatsResult<f64>>,
        pub reads: AtomicUsize,
    }

    impl ScriptedSensor {
        pub fn new(readings: Vec<f64>) -> Self {
            Self::with_results(readings.into_iter().map(Ok).collect())
        }

        pub fn with_results(readings: Vec<SkyflatsResult<f64>>) -> Self {
            assert!(!readings.is_empty());
            Self {
                readings,
                reads: AtomicUsize::new(0),
            }
        }

        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrightnessSource for ScriptedSensor {
        async fn sky_quality(&self) -> SkyflatsResult<f64> {
            let i = self.reads.fetch_add(1, Ordering::SeqCst);
            self.readings[i.min(self.readings.len() - 1)].clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSensor;
    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::clock::SystemClock;
    use crate::device_ops::NullDeviceOps;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn gate(threshold: f64, comparison: SqmComparison) -> BrightnessGate {
        BrightnessGate::new(SqmThreshold::new(threshold, comparison).unwrap())
    }

    #[test]
    fn test_evaluate_darker_than() {
        assert!(evaluate(10.0, 8.0, SqmComparison::DarkerThan));
        assert!(!evaluate(6.0, 8.0, SqmComparison::DarkerThan));
    }

    #[test]
    fn test_evaluate_brighter_than() {
        assert!(evaluate(6.0, 8.0, SqmComparison::BrighterThan));
        assert!(!evaluate(10.0, 8.0, SqmComparison::BrighterThan));
    }

    #[test]
    fn test_evaluate_equal_reading_never_passes() {
        assert!(!evaluate(8.0, 8.0, SqmComparison::DarkerThan));
        assert!(!evaluate(8.0, 8.0, SqmComparison::BrighterThan));
    }

    #[test]
    fn test_threshold_rejects_non_finite() {
        assert!(SqmThreshold::new(f64::INFINITY, SqmComparison::DarkerThan).is_err());
        assert!(SqmThreshold::new(f64::NAN, SqmComparison::BrighterThan).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = gate(8.0, SqmComparison::DarkerThan).with_poll_interval(Duration::ZERO);
        assert!(matches!(result, Err(SkyflatsError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_satisfied_on_third_poll() {
        let sensor = ScriptedSensor::new(vec![6.0, 7.5, 9.0, 12.0]);
        let clock = FixedClock::new(Utc::now());
        let cancel = AtomicBool::new(false);

        let state = gate(8.0, SqmComparison::DarkerThan)
            .wait_until(&sensor, &cancel, &clock, None)
            .await
            .unwrap();

        assert_eq!(state, GateState::Satisfied);
        assert_eq!(sensor.read_count(), 3);
        assert_eq!(clock.sleep_count(), 2);
    }

    #[tokio::test]
    async fn test_satisfied_immediately_does_not_sleep() {
        let sensor = ScriptedSensor::new(vec![5.0]);
        let clock = FixedClock::new(Utc::now());
        let cancel = AtomicBool::new(false);

        let state = gate(8.0, SqmComparison::BrighterThan)
            .wait_until(&sensor, &cancel, &clock, None)
            .await
            .unwrap();

        assert_eq!(state, GateState::Satisfied);
        assert_eq!(sensor.read_count(), 1);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let sensor = ScriptedSensor::new(vec![1.0]);
        let clock = FixedClock::new(Utc::now());
        let cancel = AtomicBool::new(true);

        let state = gate(8.0, SqmComparison::DarkerThan)
            .wait_until(&sensor, &cancel, &clock, None)
            .await
            .unwrap();

        assert_eq!(state, GateState::Cancelled);
        assert_eq!(sensor.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_poll_sleep() {
        let sensor = Arc::new(ScriptedSensor::new(vec![1.0]));
        let cancel = Arc::new(AtomicBool::new(false));
        let poll_interval = Duration::from_secs(1);

        let cancel_setter = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancel_setter.store(true, Ordering::Relaxed);
        });

        let start = tokio::time::Instant::now();
        let state = gate(8.0, SqmComparison::DarkerThan)
            .with_poll_interval(poll_interval)
            .unwrap()
            .wait_until(sensor.as_ref(), &cancel, &SystemClock, None)
            .await
            .unwrap();

        assert_eq!(state, GateState::Cancelled);
        assert!(start.elapsed() < poll_interval);
        assert_eq!(sensor.read_count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_poll_sleep_with_fixed_clock() {
        let sensor = ScriptedSensor::new(vec![1.0, 1.0]);
        let clock = FixedClock::new(Utc::now()).holding_sleeps();
        let cancel = AtomicBool::new(false);
        let cancel_on_first_reading = |_: u32, _: f64| cancel.store(true, Ordering::Relaxed);

        let state = gate(8.0, SqmComparison::DarkerThan)
            .wait_until(&sensor, &cancel, &clock, Some(&cancel_on_first_reading))
            .await
            .unwrap();

        assert_eq!(state, GateState::Cancelled);
        assert_eq!(sensor.read_count(), 1);
        assert_eq!(clock.sleep_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_is_respected() {
        let sensor = ScriptedSensor::new(vec![6.0, 6.0, 6.0, 9.0]);
        let cancel = AtomicBool::new(false);

        let start = tokio::time::Instant::now();
        let state = gate(8.0, SqmComparison::DarkerThan)
            .with_poll_interval(Duration::from_secs(2))
            .unwrap()
            .wait_until(&sensor, &cancel, &SystemClock, None)
            .await
            .unwrap();

        assert_eq!(state, GateState::Satisfied);
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(sensor.read_count(), 4);
    }

    #[tokio::test]
    async fn test_sensor_error_propagates() {
        let sensor = ScriptedSensor::with_results(vec![
            Ok(6.0),
            Err(SkyflatsError::SensorUnavailable("disconnected".to_string())),
        ]);
        let clock = FixedClock::new(Utc::now());
        let cancel = AtomicBool::new(false);

        let result = gate(8.0, SqmComparison::DarkerThan)
            .wait_until(&sensor, &cancel, &clock, None)
            .await;

        assert!(matches!(result, Err(SkyflatsError::SensorUnavailable(_))));
        assert_eq!(sensor.read_count(), 2);
    }

    #[tokio::test]
    async fn test_on_reading_callback() {
        let sensor = ScriptedSensor::new(vec![9.0, 8.5, 7.0]);
        let clock = FixedClock::new(Utc::now());
        let cancel = AtomicBool::new(false);
        let seen = Mutex::new(Vec::new());
        let record = |poll: u32, reading: f64| seen.lock().unwrap().push((poll, reading));

        gate(8.0, SqmComparison::BrighterThan)
            .wait_until(&sensor, &cancel, &clock, Some(&record))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1, 9.0), (2, 8.5), (3, 7.0)]);
    }

    #[tokio::test]
    async fn test_device_sky_quality_reads_device() {
        let source = DeviceSkyQuality::new(Arc::new(NullDeviceOps::with_sky_quality(18.5)), "sqm");
        assert_eq!(source.sky_quality().await.unwrap(), 18.5);
    }

    #[tokio::test]
    async fn test_device_sky_quality_rejects_nan() {
        let source = DeviceSkyQuality::new(Arc::new(NullDeviceOps::with_sky_quality(f64::NAN)), "sqm");
        assert!(matches!(source.sky_quality().await, Err(SkyflatsError::SensorUnavailable(_))));
    }
}
