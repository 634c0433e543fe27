//! CLI argument definitions for skyflats

use crate::SkyflatsSettings;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use skyflats_sequencer::{ObserverLocation, SkyflatsError, SqmComparison};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "skyflats")]
#[command(about = "Sky flat helpers: null point slews and SQM brightness gates")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Observer latitude in degrees, north positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Observer longitude in degrees, east positive
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Observer elevation in meters
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub elevation: Option<f64>,

    /// Alpaca server base URL
    #[arg(long, global = true)]
    pub alpaca_url: Option<String>,

    /// Alpaca telescope device number
    #[arg(long, global = true)]
    pub telescope: Option<u32>,

    /// Alpaca observing conditions device number carrying the SQM
    #[arg(long, global = true)]
    pub sqm_device: Option<u32>,

    /// Use simulated devices instead of Alpaca
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Directory for daily rolling log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the null point azimuth and altitude without moving the mount
    NullPoint(NullPointArgs),

    /// Read the SQM once and evaluate a brightness condition
    Sqm(SqmArgs),

    /// Slew the mount to the current null point
    Slew(SlewArgs),

    /// Wait until the SQM reading satisfies a brightness condition
    WaitSqm(WaitSqmArgs),

    /// Keep monitoring while the SQM reading satisfies a brightness condition
    LoopSqm(LoopSqmArgs),

    /// Write the effective settings to the settings file
    SaveConfig,
}

#[derive(Parser, Debug)]
pub struct NullPointArgs {
    /// Compute for this instant (RFC 3339) instead of now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Parser, Debug)]
pub struct SqmArgs {
    /// Threshold in mag/arcsec²
    #[arg(long)]
    pub threshold: Option<f64>,

    /// "darker" or "brighter"
    #[arg(long)]
    pub comparison: Option<SqmComparison>,
}

#[derive(Parser, Debug)]
pub struct SlewArgs {
    /// Return as soon as the slew starts
    #[arg(long)]
    pub no_wait: bool,

    /// Maximum seconds to wait for the slew to finish
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Accepted position error in degrees
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct WaitSqmArgs {
    /// Threshold in mag/arcsec²
    #[arg(long)]
    pub threshold: Option<f64>,

    /// "darker" or "brighter"
    #[arg(long)]
    pub comparison: Option<SqmComparison>,

    /// Milliseconds between SQM readings
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct LoopSqmArgs {
    /// Threshold in mag/arcsec²
    #[arg(long)]
    pub threshold: Option<f64>,

    /// "darker" or "brighter"
    #[arg(long)]
    pub comparison: Option<SqmComparison>,

    /// Seconds between iterations
    #[arg(long, default_value = "10")]
    pub interval_secs: u64,
}

impl Cli {
    /// Settings file location: `--config`, or `skyflats.json` in the working directory
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from("skyflats.json"))
    }

    /// Apply command line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut SkyflatsSettings) -> Result<(), SkyflatsError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                let elevation = self
                    .elevation
                    .or(settings.location.map(|l| l.elevation))
                    .unwrap_or(0.0);
                settings.location = Some(ObserverLocation::new(latitude, longitude, elevation)?);
            }
            (None, None) => {
                if let (Some(elevation), Some(location)) = (self.elevation, settings.location.as_mut()) {
                    location.elevation = elevation;
                }
            }
            _ => {
                return Err(SkyflatsError::InvalidConfig(
                    "--latitude and --longitude must be given together".to_string(),
                ))
            }
        }

        if let Some(url) = &self.alpaca_url {
            settings.alpaca.base_url = url.clone();
        }
        if let Some(n) = self.telescope {
            settings.alpaca.telescope_number = n;
        }
        if let Some(n) = self.sqm_device {
            settings.alpaca.observing_conditions_number = Some(n);
        }
        if let Some(dir) = &self.log_dir {
            settings.logging.directory = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        } else if self.verbose {
            settings.logging.level = "debug".to_string();
        }

        match &self.command {
            Commands::Sqm(args) => {
                apply_threshold(&mut settings.loop_while_sqm.threshold, args.threshold);
                apply_comparison(&mut settings.loop_while_sqm.comparison, args.comparison);
            }
            Commands::Slew(args) => {
                if args.no_wait {
                    settings.slew.wait_for_slew = false;
                }
                if let Some(timeout) = args.timeout {
                    settings.slew.slew_timeout_secs = timeout;
                }
                if let Some(tolerance) = args.tolerance {
                    settings.slew.position_tolerance_deg = tolerance;
                }
            }
            Commands::WaitSqm(args) => {
                apply_threshold(&mut settings.wait_until_sqm.threshold, args.threshold);
                apply_comparison(&mut settings.wait_until_sqm.comparison, args.comparison);
                if let Some(ms) = args.poll_interval_ms {
                    settings.wait_until_sqm.poll_interval_ms = ms;
                }
            }
            Commands::LoopSqm(args) => {
                apply_threshold(&mut settings.loop_while_sqm.threshold, args.threshold);
                apply_comparison(&mut settings.loop_while_sqm.comparison, args.comparison);
            }
            Commands::NullPoint(_) | Commands::SaveConfig => {}
        }

        settings.validate()
    }
}

fn apply_threshold(target: &mut f64, value: Option<f64>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn apply_comparison(target: &mut SqmComparison, value: Option<SqmComparison>) {
    if let Some(v) = value {
        *target = v;
    }
}
