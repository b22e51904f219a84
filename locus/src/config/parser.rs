//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.
//! Parsing starts from the defaults and overlays whatever the file sets.

use std::path::PathBuf;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::{ConfigFile, ConfigFileError};
use super::settings::{DefaultBackendConfig, VendorBackendConfig};
use crate::config::DEFAULT_RATIONALE_TITLE;
use crate::platform::{DialogContent, UpdatePriority};

/// Parse an `Ini` object into a validated `ConfigFile`.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [location] section
    if let Some(section) = ini.section(Some("location")) {
        let location = &mut config.location;
        if let Some(v) = section.get("keep_tracking") {
            location.keep_tracking = parse_bool("location", "keep_tracking", v)?;
        }
        if let Some(v) = section.get("update_interval_ms") {
            location.required_update_interval = parse_ms("location", "update_interval_ms", v)?;
        }
        if let Some(v) = section.get("update_distance_m") {
            location.required_update_distance = parse_meters("location", "update_distance_m", v)?;
        }
        if let Some(v) = section.get("acceptable_accuracy_m") {
            location.acceptance.max_accuracy =
                parse_meters("location", "acceptable_accuracy_m", v)?;
        }
        if let Some(v) = section.get("acceptable_age_ms") {
            location.acceptance.max_age = parse_ms("location", "acceptable_age_ms", v)?;
        }
    }

    // [permissions] section
    if let Some(section) = ini.section(Some("permissions")) {
        if let Some(v) = section.get("required") {
            config.location.permissions.required = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = section.get("rationale") {
            let v = v.trim();
            config.location.permissions.rationale = if v.is_empty() {
                None
            } else {
                Some(DialogContent::new(DEFAULT_RATIONALE_TITLE, v))
            };
        }
    }

    // [default] section
    if let Some(section) = ini.section(Some("default")) {
        let enabled = match section.get("enabled") {
            Some(v) => parse_bool("default", "enabled", v)?,
            None => true,
        };
        config.location.default_backend = if enabled {
            Some(parse_default_backend(section)?)
        } else {
            None
        };
    }

    // [vendor] section
    if let Some(section) = ini.section(Some("vendor")) {
        let enabled = match section.get("enabled") {
            Some(v) => parse_bool("vendor", "enabled", v)?,
            None => true,
        };
        config.location.vendor_backend = if enabled {
            Some(parse_vendor_backend(section)?)
        } else {
            None
        };
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("enabled") {
            config.logging.enabled = parse_bool("logging", "enabled", v)?;
        }
        if let Some(v) = section.get("level") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.level = v.to_string();
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            config.logging.file = if v.is_empty() {
                None
            } else {
                Some(expand_tilde(v))
            };
        }
    }

    config.location.validate()?;
    Ok(config)
}

fn parse_default_backend(section: &Properties) -> Result<DefaultBackendConfig, ConfigFileError> {
    let mut backend = DefaultBackendConfig::default();
    if let Some(v) = section.get("gnss_wait_ms") {
        backend.gnss_wait = parse_ms("default", "gnss_wait_ms", v)?;
    }
    if let Some(v) = section.get("network_wait_ms") {
        backend.network_wait = parse_ms("default", "network_wait_ms", v)?;
    }
    if let Some(v) = section.get("ask_to_enable_gnss") {
        backend.ask_to_enable_gnss = parse_bool("default", "ask_to_enable_gnss", v)?;
    }
    if let Some(v) = section.get("enable_gnss_message") {
        let v = v.trim();
        if !v.is_empty() {
            backend.enable_gnss_dialog.message = v.to_string();
        }
    }
    Ok(backend)
}

fn parse_vendor_backend(section: &Properties) -> Result<VendorBackendConfig, ConfigFileError> {
    let mut backend = VendorBackendConfig::default();
    if let Some(v) = section.get("wait_ms") {
        backend.vendor_wait = parse_ms("vendor", "wait_ms", v)?;
    }
    if let Some(v) = section.get("ask_to_resolve_service") {
        backend.ask_to_resolve_vendor_service =
            parse_bool("vendor", "ask_to_resolve_service", v)?;
    }
    if let Some(v) = section.get("ask_to_change_settings") {
        backend.ask_to_change_settings = parse_bool("vendor", "ask_to_change_settings", v)?;
    }
    if let Some(v) = section.get("fail_on_connection_suspended") {
        backend.fail_on_connection_suspended =
            parse_bool("vendor", "fail_on_connection_suspended", v)?;
    }
    if let Some(v) = section.get("suspended_connection_retry_limit") {
        backend.suspended_connection_retry_limit =
            v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "vendor".to_string(),
                key: "suspended_connection_retry_limit".to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
    }
    if let Some(v) = section.get("fail_on_settings_resolution_failure") {
        backend.fail_on_settings_resolution_failure =
            parse_bool("vendor", "fail_on_settings_resolution_failure", v)?;
    }
    if let Some(v) = section.get("fallback_to_default") {
        backend.fallback_to_default_on_vendor_failure =
            parse_bool("vendor", "fallback_to_default", v)?;
    }
    if let Some(v) = section.get("ignore_last_known_fix") {
        backend.ignore_last_known_fix = parse_bool("vendor", "ignore_last_known_fix", v)?;
    }
    if let Some(v) = section.get("priority") {
        backend.priority =
            v.parse::<UpdatePriority>()
                .map_err(|_| ConfigFileError::InvalidValue {
                    section: "vendor".to_string(),
                    key: "priority".to_string(),
                    value: v.to_string(),
                    reason: "must be one of: high_accuracy, balanced_power, low_power, passive"
                        .to_string(),
                })?;
    }
    Ok(backend)
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be true or false".to_string(),
        }),
    }
}

fn parse_ms(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative integer (milliseconds)".to_string(),
        })
}

fn parse_meters(section: &str, key: &str, value: &str) -> Result<f32, ConfigFileError> {
    match value.trim().parse::<f32>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative number (meters)".to_string(),
        }),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
