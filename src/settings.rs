use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::speedtest::discovery::MAX_URLS;
use crate::speedtest::sampler::SamplerConfig;
use crate::speedtest::MeasureOptions;

const APP_NAME: &str = "fastspeed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyPreference {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl FamilyPreference {
    pub fn next(self) -> Self {
        match self {
            FamilyPreference::Any => FamilyPreference::Ipv4,
            FamilyPreference::Ipv4 => FamilyPreference::Ipv6,
            FamilyPreference::Ipv6 => FamilyPreference::Any,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            FamilyPreference::Any => FamilyPreference::Ipv6,
            FamilyPreference::Ipv4 => FamilyPreference::Any,
            FamilyPreference::Ipv6 => FamilyPreference::Ipv4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FamilyPreference::Any => "any",
            FamilyPreference::Ipv4 => "IPv4",
            FamilyPreference::Ipv6 => "IPv6",
        }
    }
}

/// Loaded from `~/.config/fastspeed/config.toml`; CLI flags override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Length of the measurement window in seconds.
    pub max_time_secs: u64,
    /// Seconds between throughput samples.
    pub sample_interval_secs: u64,
    /// Ramp-up pause before the first sample, in milliseconds.
    pub warmup_ms: u64,
    /// Parallel download streams to request from the provider (1-3).
    pub url_count: usize,
    pub address_family: FamilyPreference,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_time_secs: 15,
            sample_interval_secs: 3,
            warmup_ms: 1000,
            url_count: MAX_URLS,
            address_family: FamilyPreference::Any,
            verbose: false,
        }
    }
}

impl Settings {
    pub fn measure_options(&self) -> MeasureOptions {
        MeasureOptions {
            verbose: self.verbose,
            max_time_secs: self.max_time_secs,
            force_ipv4: self.address_family == FamilyPreference::Ipv4,
            force_ipv6: self.address_family == FamilyPreference::Ipv6,
            url_count: self.url_count,
        }
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            warmup: Duration::from_millis(self.warmup_ms),
            interval: Duration::from_secs(self.sample_interval_secs.max(1)),
            max_time: Duration::from_secs(self.max_time_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    MaxTime,
    AddressFamily,
    StreamCount,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::MaxTime => SettingsField::AddressFamily,
            SettingsField::AddressFamily => SettingsField::StreamCount,
            SettingsField::StreamCount => SettingsField::MaxTime,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::MaxTime => SettingsField::StreamCount,
            SettingsField::AddressFamily => SettingsField::MaxTime,
            SettingsField::StreamCount => SettingsField::AddressFamily,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME)?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load settings from disk, writing a default file if none exists.
pub fn load_or_init() -> Result<Settings> {
    let path = config_path()?;
    if !path.exists() {
        let defaults = Settings::default();
        let toml = toml::to_string_pretty(&defaults)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(defaults);
    }

    let data = fs::read_to_string(&path)?;
    Ok(toml::from_str(&data)?)
}

/// [`load_or_init`], falling back to defaults if the file can't be used.
pub fn load_or_default() -> Settings {
    load_or_init().unwrap_or_else(|e| {
        tracing::warn!("using default settings: {:#}", e);
        Settings::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_measure_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.measure_options(), MeasureOptions::default());
        assert_eq!(settings.sampler_config(), SamplerConfig::default());
    }

    #[test]
    fn toml_roundtrip() {
        let settings = Settings {
            max_time_secs: 30,
            address_family: FamilyPreference::Ipv6,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&settings).unwrap();
        assert!(text.contains("address_family = \"ipv6\""));
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let settings: Settings = toml::from_str("max_time_secs = 9\n").unwrap();
        assert_eq!(settings.max_time_secs, 9);
        assert_eq!(settings.sample_interval_secs, 3);
        assert_eq!(settings.sampler_config().iterations(), 3);
    }

    #[test]
    fn family_maps_to_force_flags() {
        let mut settings = Settings::default();
        settings.address_family = FamilyPreference::Ipv4;
        let opts = settings.measure_options();
        assert!(opts.force_ipv4 && !opts.force_ipv6);
        settings.address_family = settings.address_family.next();
        let opts = settings.measure_options();
        assert!(!opts.force_ipv4 && opts.force_ipv6);
    }

    #[test]
    fn zero_interval_is_bumped_to_one_second() {
        let settings = Settings {
            sample_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.sampler_config().interval, Duration::from_secs(1));
    }
}
