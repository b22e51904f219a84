//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`. Every key
//! read by [`super::parser`] is written, so a saved file loads back unchanged.

use std::time::Duration;

use super::file::ConfigFile;
use super::settings::{DefaultBackendConfig, VendorBackendConfig};

/// Convert a `ConfigFile` to a commented INI string for saving.
pub fn to_config_string(config: &ConfigFile) -> String {
    let location = &config.location;
    let rationale = location
        .permissions
        .rationale
        .as_ref()
        .map(|r| r.message.as_str())
        .unwrap_or("");
    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let default_section = match &location.default_backend {
        Some(backend) => default_backend_section(backend),
        None => "[default]\n; GNSS/network backend disabled\nenabled = false\n".to_string(),
    };
    let vendor_section = match &location.vendor_backend {
        Some(backend) => vendor_backend_section(backend),
        None => "[vendor]\n; Vendor fused-location backend disabled\nenabled = false\n".to_string(),
    };

    format!(
        r#"[location]
; Keep delivering fixes after the first one (default: false)
keep_tracking = {}
; Interval between continuous updates in milliseconds (default: 5000)
update_interval_ms = {}
; Minimum displacement between continuous updates in meters (default: 0)
update_distance_m = {}
; A cached fix is only used if its accuracy radius is at most this many meters (default: 5)
acceptable_accuracy_m = {}
; ...and if it is at most this old, in milliseconds (default: 300000)
acceptable_age_ms = {}

[permissions]
; Comma-separated permissions that must all be granted before acquisition starts
required = {}
; Explanation shown before the permission request when the platform recommends one
; Leave empty to request directly
rationale = {}

{}
{}
[logging]
; Master switch for diagnostics (default: true)
enabled = {}
; Filter directive used when RUST_LOG is unset, e.g. info or locus=debug
level = {}
; Optional log file; leave empty to log to stderr only
file = {}
"#,
        location.keep_tracking,
        millis(location.required_update_interval),
        location.required_update_distance,
        location.acceptance.max_accuracy,
        millis(location.acceptance.max_age),
        location.permissions.required.join(", "),
        rationale,
        default_section,
        vendor_section,
        config.logging.enabled,
        config.logging.level,
        log_file,
    )
}

fn default_backend_section(backend: &DefaultBackendConfig) -> String {
    format!(
        r#"[default]
; GNSS first, network second
enabled = true
; How long GNSS gets before falling back to network, in milliseconds (default: 20000)
gnss_wait_ms = {}
; How long network gets before the request times out, in milliseconds (default: 20000)
network_wait_ms = {}
; Offer to open GNSS settings when GNSS is switched off (default: true)
ask_to_enable_gnss = {}
enable_gnss_message = {}
"#,
        millis(backend.gnss_wait),
        millis(backend.network_wait),
        backend.ask_to_enable_gnss,
        backend.enable_gnss_dialog.message,
    )
}

fn vendor_backend_section(backend: &VendorBackendConfig) -> String {
    format!(
        r#"[vendor]
; Vendor fused-location service, tried before the default backend
enabled = true
; Give up on the vendor service after this many milliseconds (default: 20000)
wait_ms = {}
; Offer a device-level fix when the service is unavailable (default: false)
ask_to_resolve_service = {}
; Check device settings before requesting updates (default: true)
ask_to_change_settings = {}
; Treat a suspended connection as a failure (default: true)
fail_on_connection_suspended = {}
; Reconnect attempts after suspension when the above is false (default: 2)
suspended_connection_retry_limit = {}
; Fail instead of requesting anyway when settings cannot be changed (default: false)
fail_on_settings_resolution_failure = {}
; Fall back to the default backend on vendor failure (default: true)
fallback_to_default = {}
; Skip the cached last-known fix (default: false)
ignore_last_known_fix = {}
; Update priority: high_accuracy, balanced_power, low_power, passive
priority = {}
"#,
        millis(backend.vendor_wait),
        backend.ask_to_resolve_vendor_service,
        backend.ask_to_change_settings,
        backend.fail_on_connection_suspended,
        backend.suspended_connection_retry_limit,
        backend.fail_on_settings_resolution_failure,
        backend.fallback_to_default_on_vendor_failure,
        backend.ignore_last_known_fix,
        backend.priority.as_str(),
    )
}

fn millis(duration: Duration) -> u128 {
    duration.as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_string_sections() {
        let text = to_config_string(&ConfigFile::default());
        for section in ["[location]", "[permissions]", "[default]", "[vendor]", "[logging]"] {
            assert!(text.contains(section), "missing {section}");
        }
        assert!(text.contains("gnss_wait_ms = 20000"));
        assert!(text.contains("required = coarse_location, fine_location"));
    }

    #[test]
    fn test_disabled_vendor_written_explicitly() {
        let text = to_config_string(&ConfigFile::default());
        let vendor = text.split("[vendor]").nth(1).unwrap();
        assert!(vendor.contains("enabled = false"));
    }
}
