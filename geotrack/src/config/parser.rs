//! INI parsing logic for converting `Ini` → `TrackerConfig`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::TrackerConfig;

/// Parse an `Ini` object into a `TrackerConfig`.
///
/// Starts from `TrackerConfig::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<TrackerConfig, ConfigFileError> {
    let mut config = TrackerConfig::default();

    // [tracking] section
    if let Some(section) = ini.section(Some("tracking")) {
        if let Some(v) = section.get("min_time_ms") {
            let millis: u64 = v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "tracking".to_string(),
                key: "min_time_ms".to_string(),
                value: v.to_string(),
                reason: "expected a whole number of milliseconds".to_string(),
            })?;
            config.tracking.min_time = Duration::from_millis(millis);
        }
        if let Some(v) = section.get("min_distance_m") {
            let meters: f32 = v
                .trim()
                .parse()
                .ok()
                .filter(|m: &f32| m.is_finite() && *m >= 0.0)
                .ok_or_else(|| ConfigFileError::InvalidValue {
                    section: "tracking".to_string(),
                    key: "min_distance_m".to_string(),
                    value: v.to_string(),
                    reason: "expected a non-negative number of meters".to_string(),
                })?;
            config.tracking.min_distance_m = meters;
        }
        if let Some(v) = section.get("accuracy") {
            config.tracking.accuracy =
                v.parse().map_err(|reason| ConfigFileError::InvalidValue {
                    section: "tracking".to_string(),
                    key: "accuracy".to_string(),
                    value: v.to_string(),
                    reason,
                })?;
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.storage.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("registry_key") {
            config.storage.registry_key = parse_key("registry_key", v)?;
        }
        if let Some(v) = section.get("position_key") {
            config.storage.position_key = parse_key("position_key", v)?;
        }
    }

    if config.storage.registry_key == config.storage.position_key {
        return Err(ConfigFileError::InvalidValue {
            section: "storage".to_string(),
            key: "position_key".to_string(),
            value: config.storage.position_key,
            reason: "must differ from registry_key".to_string(),
        });
    }

    Ok(config)
}

fn parse_key(key: &str, value: &str) -> Result<String, ConfigFileError> {
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(ConfigFileError::InvalidValue {
            section: "storage".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected letters, digits, '_' or '-'".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
