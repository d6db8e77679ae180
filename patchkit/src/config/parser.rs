//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [patch] section
    if let Some(section) = ini.section(Some("patch")) {
        if let Some(v) = section.get("save_path") {
            let v = v.trim();
            if !v.is_empty() {
                config.patch.save_path = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("manifest_name") {
            let v = v.trim();
            if v.is_empty() || v.contains(['/', '\\']) {
                return Err(invalid(
                    "patch",
                    "manifest_name",
                    v,
                    "must be a plain, non-empty file name",
                ));
            }
            config.patch.manifest_name = v.to_string();
        }
        if let Some(v) = section.get("continue_if_update_fail") {
            config.patch.continue_if_update_fail =
                parse_bool(v).ok_or_else(|| invalid_bool("patch", "continue_if_update_fail", v))?;
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("url_prefix") {
            config.download.url_prefix = v.trim().to_string();
        }
        if let Some(v) = section.get("manifest_url") {
            let v = v.trim();
            config.download.manifest_url = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = section.get("max_concurrent") {
            config.download.max_concurrent = parse_count(v)
                .ok_or_else(|| invalid("download", "max_concurrent", v, "must be an integer >= 1"))?;
        }
        if let Some(v) = section.get("timeout") {
            config.download.timeout = v.trim().parse().map_err(|_| {
                invalid(
                    "download",
                    "timeout",
                    v,
                    "must be a non-negative integer (seconds, 0 = none)",
                )
            })?;
        }
        if let Some(v) = section.get("auto_retry") {
            config.download.auto_retry =
                parse_bool(v).ok_or_else(|| invalid_bool("download", "auto_retry", v))?;
        }
        if let Some(v) = section.get("accept_invalid_certs") {
            config.download.accept_invalid_certs =
                parse_bool(v).ok_or_else(|| invalid_bool("download", "accept_invalid_certs", v))?;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("max_concurrent_loads") {
            config.cache.max_concurrent_loads = parse_count(v).ok_or_else(|| {
                invalid("cache", "max_concurrent_loads", v, "must be an integer >= 1")
            })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid_bool(section: &str, key: &str, value: &str) -> ConfigFileError {
    invalid(section, key, value, "must be true or false")
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_count(v: &str) -> Option<usize> {
    v.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_values_overlay_defaults() {
        let config = parse(
            "[patch]\nsave_path = /data/patches\ncontinue_if_update_fail = yes\n\
             [download]\nurl_prefix = https://cdn/p/\nmax_concurrent = 8\ntimeout = 15\nauto_retry = true\n\
             [cache]\nmax_concurrent_loads = 2\n",
        )
        .unwrap();

        assert_eq!(config.patch.save_path, PathBuf::from("/data/patches"));
        assert!(config.patch.continue_if_update_fail);
        assert_eq!(config.patch.manifest_name, "StreamingAssets");
        assert_eq!(config.download.url_prefix, "https://cdn/p/");
        assert_eq!(config.download.max_concurrent, 8);
        assert_eq!(config.download.timeout, 15);
        assert!(config.download.auto_retry);
        assert!(!config.download.accept_invalid_certs);
        assert_eq!(config.cache.max_concurrent_loads, 2);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = parse("[download]\nmax_concurrent = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "max_concurrent"
        ));
    }

    #[test]
    fn test_rejects_bad_bool() {
        assert!(parse("[download]\nauto_retry = maybe\n").is_err());
    }

    #[test]
    fn test_rejects_manifest_name_with_separator() {
        assert!(parse("[patch]\nmanifest_name = a/b\n").is_err());
    }

    #[test]
    fn test_blank_manifest_url_is_none() {
        let config = parse("[download]\nmanifest_url =\n").unwrap();
        assert_eq!(config.download.manifest_url, None);
    }
}
