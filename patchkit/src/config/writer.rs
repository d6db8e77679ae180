//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let manifest_url = config.download.manifest_url.as_deref().unwrap_or("");

    format!(
        r#"[patch]
; Directory holding downloaded patch files and their manifest
save_path = {}
; File name of the primary manifest (default: StreamingAssets)
manifest_name = {}
; Keep running on the current version when the update server is unreachable
continue_if_update_fail = {}

[download]
; Prefix joined with each file name to form its download URL
; Example: url_prefix = https://cdn.example.com/patch/
url_prefix = {}
; Remote manifest URL; empty means <url_prefix><manifest_name>
manifest_url = {}
; Files downloaded at once (default: 5)
max_concurrent = {}
; Request timeout in seconds, 0 for no timeout (default: 0)
timeout = {}
; Re-queue failed files immediately instead of failing the session
auto_retry = {}
; Accept self-signed certificates (only for trusted private servers)
accept_invalid_certs = {}

[cache]
; Bundle files read at once during async loads (default: 5)
max_concurrent_loads = {}

[logging]
directory = {}
file = {}
"#,
        path_to_string(&config.patch.save_path),
        config.patch.manifest_name,
        config.patch.continue_if_update_fail,
        config.download.url_prefix,
        manifest_url,
        config.download.max_concurrent,
        config.download.timeout,
        config.download.auto_retry,
        config.download.accept_invalid_certs,
        config.cache.max_concurrent_loads,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ini::Ini;

    #[test]
    fn test_written_config_parses_back() {
        let mut config = ConfigFile::default();
        config.download.url_prefix = "https://cdn/p/".to_string();
        config.download.manifest_url = Some("https://cdn/meta".to_string());
        config.download.timeout = 9;
        config.patch.continue_if_update_fail = true;

        let text = to_config_string(&config);
        let ini = Ini::load_from_str(&text).unwrap();
        assert_eq!(super::super::parser::parse_ini(&ini).unwrap(), config);
    }
}
