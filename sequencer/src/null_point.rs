//! Anti-solar null point calculation
//!
//! The null point is the horizontal position opposite the Sun in azimuth,
//! 15° down from zenith. Twilight sky brightness has its smallest gradient
//! there, which makes it the preferred target for sky flats.
//!
//! Known limitation: at the geographic poles azimuth is degenerate and the
//! computed null point azimuth carries no meaning.

use crate::astro;
use crate::error::{SkyflatsError, SkyflatsResult};
use crate::ObserverLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Null point altitude: 15° below zenith
pub const NULL_POINT_ALTITUDE_DEG: f64 = 75.0;

/// Equatorial coordinates of date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialPosition {
    pub ra_hours: f64,
    pub dec_degrees: f64,
}

/// Source of the Sun's equatorial position
pub trait SolarEphemeris: Send + Sync {
    fn solar_equatorial_position(
        &self,
        instant: &DateTime<Utc>,
        location: &ObserverLocation,
    ) -> SkyflatsResult<EquatorialPosition>;
}

/// Shared ephemeris handle
pub type SharedEphemeris = Arc<dyn SolarEphemeris>;

/// Analytic solar ephemeris, accurate to about 0.01°.
///
/// Elevation is not used: solar parallax is below 9 arcseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LowPrecisionSolarEphemeris;

impl SolarEphemeris for LowPrecisionSolarEphemeris {
    fn solar_equatorial_position(
        &self,
        instant: &DateTime<Utc>,
        _location: &ObserverLocation,
    ) -> SkyflatsResult<EquatorialPosition> {
        let (ra_hours, dec_degrees) = astro::solar_equatorial_position(astro::julian_day(instant));
        Ok(EquatorialPosition { ra_hours, dec_degrees })
    }
}

/// Sun position at an observer and instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarPosition {
    pub julian_day: f64,
    pub local_sidereal_hours: f64,
    pub ra_hours: f64,
    pub dec_degrees: f64,
    pub hour_angle_degrees: f64,
    pub altitude: f64,
    pub azimuth: f64,
}

/// Azimuth split into degrees, minutes and seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AzimuthDms {
    pub degrees: i32,
    pub minutes: i32,
    pub seconds: f64,
}

impl fmt::Display for AzimuthDms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}° {:02}' {:05.2}\"", self.degrees, self.minutes, self.seconds)
    }
}

/// Topocentric slew target opposite the Sun
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NullPointCoordinate {
    /// Azimuth in degrees, [0, 360)
    pub azimuth: f64,
    /// Altitude in degrees, always [`NULL_POINT_ALTITUDE_DEG`]
    pub altitude: f64,
    /// Observer the coordinate is bound to
    pub location: ObserverLocation,
    /// Instant the coordinate was computed for
    pub instant: DateTime<Utc>,
}

impl NullPointCoordinate {
    pub fn azimuth_dms(&self) -> AzimuthDms {
        let (degrees, minutes, seconds) = astro::degrees_to_dms(self.azimuth);
        AzimuthDms { degrees, minutes, seconds }
    }
}

impl fmt::Display for NullPointCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alt {:.1}°, Az {} ({:.4}°)", self.altitude, self.azimuth_dms(), self.azimuth)
    }
}

/// Azimuth opposite the given solar azimuth, normalized to [0, 360)
pub fn null_point_azimuth(sun_azimuth: f64) -> f64 {
    astro::normalize_degrees(sun_azimuth + 180.0)
}

/// Computes solar position and the null point from location and instant.
///
/// Holds no state besides the ephemeris; every call recomputes from scratch.
#[derive(Clone)]
pub struct NullPointCalculator {
    ephemeris: SharedEphemeris,
}

impl Default for NullPointCalculator {
    fn default() -> Self {
        Self::new(Arc::new(LowPrecisionSolarEphemeris))
    }
}

impl NullPointCalculator {
    pub fn new(ephemeris: SharedEphemeris) -> Self {
        Self { ephemeris }
    }

    /// Sun position for the observer at `instant`
    pub fn solar_position(
        &self,
        location: &ObserverLocation,
        instant: &DateTime<Utc>,
    ) -> SkyflatsResult<SolarPosition> {
        location
            .validate()
            .map_err(|e| SkyflatsError::ComputationUnavailable(e.to_string()))?;

        let jd = astro::julian_day(instant);
        let sun = self.ephemeris.solar_equatorial_position(instant, location)?;
        if !sun.ra_hours.is_finite() || !sun.dec_degrees.is_finite() {
            return Err(SkyflatsError::ComputationUnavailable(format!(
                "ephemeris returned non-finite position (RA={}, Dec={})",
                sun.ra_hours, sun.dec_degrees
            )));
        }

        let lst = astro::local_sidereal_time(jd, location.longitude);
        let hour_angle = astro::hour_angle_degrees(lst, sun.ra_hours);
        let (altitude, azimuth) = astro::hadec_to_altaz(hour_angle, sun.dec_degrees, location.latitude);

        if !altitude.is_finite() || !azimuth.is_finite() {
            return Err(SkyflatsError::ComputationUnavailable(
                "horizontal transform produced a non-finite result".to_string(),
            ));
        }

        Ok(SolarPosition {
            julian_day: jd,
            local_sidereal_hours: lst,
            ra_hours: sun.ra_hours,
            dec_degrees: sun.dec_degrees,
            hour_angle_degrees: hour_angle,
            altitude,
            azimuth,
        })
    }

    /// Null point for the observer at `instant`
    pub fn compute_null_point(
        &self,
        location: &ObserverLocation,
        instant: &DateTime<Utc>,
    ) -> SkyflatsResult<NullPointCoordinate> {
        let sun = self.solar_position(location, instant)?;
        Ok(Self::null_point_from_sun(&sun, location, instant))
    }

    /// Null point for an already computed solar position
    pub fn null_point_from_sun(
        sun: &SolarPosition,
        location: &ObserverLocation,
        instant: &DateTime<Utc>,
    ) -> NullPointCoordinate {
        NullPointCoordinate {
            azimuth: null_point_azimuth(sun.azimuth),
            altitude: NULL_POINT_ALTITUDE_DEG,
            location: *location,
            instant: *instant,
        }
    }
}
