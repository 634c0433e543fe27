//! Astronomical helper functions
//!
//! Julian day, sidereal time, a low-precision solar ephemeris and the
//! equatorial-to-horizontal transform. All angles are in degrees unless the
//! name says otherwise; right ascension and sidereal time are in hours.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Julian day of the J2000.0 epoch (2000-01-01 12:00 TT)
pub const J2000_JD: f64 = 2451545.0;

/// Normalize an angle to the range [0, 360)
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Normalize an hour value to the range [0, 24)
pub fn normalize_hours(hours: f64) -> f64 {
    let wrapped = hours.rem_euclid(24.0);
    if wrapped >= 24.0 {
        0.0
    } else {
        wrapped
    }
}

/// Calculate Julian Day from a UTC instant (sub-second precision)
pub fn julian_day(dt: &DateTime<Utc>) -> f64 {
    let year = dt.year();
    let month = dt.month() as i32;
    let day = dt.day() as f64;

    let (y, m) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };

    let a = (y as f64 / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();

    let jd = (365.25 * (y as f64 + 4716.0)).floor()
        + (30.6001 * (m as f64 + 1.0)).floor()
        + day
        + b
        - 1524.5;

    let seconds = dt.hour() as f64 * 3600.0
        + dt.minute() as f64 * 60.0
        + dt.second() as f64
        + dt.nanosecond() as f64 / 1e9;

    jd + seconds / 86400.0
}

/// Julian centuries since J2000.0
pub fn julian_centuries(jd: f64) -> f64 {
    (jd - J2000_JD) / 36525.0
}

/// Greenwich mean sidereal time in degrees, [0, 360)
pub fn greenwich_mean_sidereal_degrees(jd: f64) -> f64 {
    let t = julian_centuries(jd);
    let gmst = 280.46061837 + 360.98564736629 * (jd - J2000_JD) + 0.000387933 * t * t
        - t * t * t / 38710000.0;
    normalize_degrees(gmst)
}

/// Local mean sidereal time in hours, [0, 24)
pub fn local_sidereal_time(jd: f64, longitude: f64) -> f64 {
    normalize_degrees(greenwich_mean_sidereal_degrees(jd) + longitude) / 15.0
}

/// Hour angle in degrees, (-180, 180], from LST and RA (both hours)
pub fn hour_angle_degrees(lst_hours: f64, ra_hours: f64) -> f64 {
    let ha = normalize_degrees((lst_hours - ra_hours) * 15.0);
    if ha > 180.0 {
        ha - 360.0
    } else {
        ha
    }
}

/// Apparent geocentric solar right ascension (hours) and declination (degrees).
///
/// Low-precision analytic theory, accurate to about 0.01 degrees between 1950 and 2050.
pub fn solar_equatorial_position(jd: f64) -> (f64, f64) {
    let t = julian_centuries(jd);

    // Geometric mean longitude and mean anomaly
    let l0 = normalize_degrees(280.46646 + 36000.76983 * t + 0.0003032 * t * t);
    let m = normalize_degrees(357.52911 + 35999.05029 * t - 0.0001537 * t * t);
    let m_rad = m.to_radians();

    // Equation of center
    let c = (1.914602 - 0.004817 * t - 0.000014 * t * t) * m_rad.sin()
        + (0.019993 - 0.000101 * t) * (2.0 * m_rad).sin()
        + 0.000289 * (3.0 * m_rad).sin();

    let true_longitude = l0 + c;

    // Nutation and aberration
    let omega = (125.04 - 1934.136 * t).to_radians();
    let lambda = (true_longitude - 0.00569 - 0.00478 * omega.sin()).to_radians();

    let epsilon0 = 23.0 + (26.0 + (21.448 - t * (46.8150 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
    let epsilon = (epsilon0 + 0.00256 * omega.cos()).to_radians();

    let ra = (epsilon.cos() * lambda.sin()).atan2(lambda.cos());
    let dec = (epsilon.sin() * lambda.sin()).asin();

    (normalize_hours(ra.to_degrees() / 15.0), dec.to_degrees())
}

/// Convert hour angle and declination to horizontal altitude and azimuth.
///
/// Azimuth is measured from north through east and normalized to [0, 360).
pub fn hadec_to_altaz(hour_angle_deg: f64, dec_deg: f64, latitude_deg: f64) -> (f64, f64) {
    let ha = hour_angle_deg.to_radians();
    let dec = dec_deg.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_alt = (lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos()).clamp(-1.0, 1.0);
    let alt = sin_alt.asin();

    let y = -ha.sin() * dec.cos();
    let x = lat.cos() * dec.sin() - lat.sin() * dec.cos() * ha.cos();
    let az = y.atan2(x);

    (alt.to_degrees(), normalize_degrees(az.to_degrees()))
}

/// Split a degree value into whole degrees, whole minutes and seconds
pub fn degrees_to_dms(value: f64) -> (i32, i32, f64) {
    let degrees = value.trunc();
    let minutes_frac = (value - degrees).abs() * 60.0;
    let minutes = minutes_frac.trunc();
    let seconds = (minutes_frac - minutes) * 60.0;
    (degrees as i32, minutes as i32, seconds)
}
