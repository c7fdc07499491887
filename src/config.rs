//! 동기화 설정 파일 관리
//!
//! `config/darkpanel.toml`에서 설정을 로드합니다.

use anyhow::Result;
use darkpanel_sync::SyncConfig;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "darkpanel.toml";

/// 설정 파일 경로 결정
pub fn config_file_path() -> PathBuf {
    // 1. 실행 파일 옆 config/darkpanel.toml
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join("config").join(CONFIG_FILE);
            if cfg.exists() {
                return cfg;
            }
        }
    }

    // 2. CWD의 config/darkpanel.toml (없으면 생성용 기본 경로)
    PathBuf::from("config").join(CONFIG_FILE)
}

/// TOML 파일에서 설정 로드 (없으면 기본값)
pub fn load_sync_config() -> Result<SyncConfig> {
    load_config_from(&config_file_path())
}

pub fn load_config_from(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        tracing::debug!("[Config] {} not found, using defaults", path.display());
        return Ok(SyncConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed: toml::Value = content.parse()?;
    Ok(parse_config(&parsed))
}

pub fn parse_config(val: &toml::Value) -> SyncConfig {
    let mut cfg = SyncConfig::default();
    if let Some(v) = val.get("enabled").and_then(|v| v.as_bool()) {
        cfg.enabled = v;
    }
    if let Some(v) = val.get("manifest_url").and_then(|v| v.as_str()) {
        cfg.manifest_url = v.to_string();
    }
    if let Some(v) = val.get("bundle_version").and_then(|v| v.as_str()) {
        cfg.bundle_version = v.to_string();
    }
    if let Some(v) = val.get("install_root").and_then(|v| v.as_str()) {
        cfg.install_root = v.to_string();
    }
    if let Some(v) = val.get("page_path").and_then(|v| v.as_str()) {
        cfg.page_path = Some(v.to_string());
    }
    if let Some(v) = val.get("overlay_dir").and_then(|v| v.as_str()) {
        cfg.overlay_dir = Some(v.to_string());
    }
    if let Some(v) = val.get("content_root").and_then(|v| v.as_str()) {
        cfg.content_root = v.to_string();
    }
    if let Some(v) = positive_int::<usize>(val, "text_chunk_size") {
        cfg.text_chunk_size = v;
    }
    if let Some(v) = positive_int::<usize>(val, "binary_chunk_size") {
        cfg.binary_chunk_size = v;
    }
    if let Some(v) = positive_int::<u64>(val, "network_timeout_secs") {
        cfg.network_timeout_secs = v;
    }
    if let Some(v) = positive_int::<u64>(val, "bridge_timeout_secs") {
        cfg.bridge_timeout_secs = v;
    }
    if let Some(v) = val.get("reload_after_overlay").and_then(|v| v.as_bool()) {
        cfg.reload_after_overlay = v;
    }
    if let Some(v) = val.get("check_interval_minutes").and_then(|v| v.as_integer()) {
        match u32::try_from(v) {
            Ok(minutes) => cfg.check_interval_minutes = minutes,
            Err(_) => tracing::warn!("[Config] check_interval_minutes out of range: {}", v),
        }
    }
    // 배열 또는 공백으로 구분된 문자열
    match val.get("bridge_command") {
        Some(toml::Value::Array(items)) => {
            cfg.bridge_command = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        Some(toml::Value::String(s)) => {
            cfg.bridge_command = s.split_whitespace().map(str::to_string).collect();
        }
        _ => {}
    }
    if let Some(v) = val.get("preset_base_url").and_then(|v| v.as_str()) {
        cfg.preset_base_url = Some(v.to_string());
    }
    if let Some(v) = val.get("state_file").and_then(|v| v.as_str()) {
        cfg.state_file = Some(v.to_string());
    }
    cfg
}

/// 양의 정수 필드 (0 이하이거나 대상 타입 범위를 넘으면 무시)
fn positive_int<T: TryFrom<i64>>(val: &toml::Value, key: &str) -> Option<T> {
    let v = val.get(key)?.as_integer()?;
    if v <= 0 {
        return None;
    }
    match T::try_from(v) {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("[Config] {} out of range: {}", key, v);
            None
        }
    }
}

/// config set <key> <value>
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    set_config_value_at(&config_file_path(), key, value)
}

pub fn set_config_value_at(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table: toml::value::Table = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        content.parse::<toml::Value>()?
            .as_table()
            .cloned()
            .unwrap_or_default()
    } else {
        toml::value::Table::new()
    };

    let toml_val: toml::Value = match key {
        "enabled" | "reload_after_overlay" => {
            toml::Value::Boolean(value.parse::<bool>().map_err(|_| {
                anyhow::anyhow!("Invalid boolean value: '{}' (use true/false)", value)
            })?)
        }
        "text_chunk_size" | "binary_chunk_size" | "network_timeout_secs"
        | "bridge_timeout_secs" | "check_interval_minutes" => {
            let n = value.parse::<i64>().map_err(|_| {
                anyhow::anyhow!("Invalid integer value: '{}'", value)
            })?;
            if n < 0 {
                anyhow::bail!("'{}' must not be negative", key);
            }
            if key == "check_interval_minutes" && u32::try_from(n).is_err() {
                anyhow::bail!("'{}' is too large: {}", key, n);
            }
            toml::Value::Integer(n)
        }
        "bridge_command" => toml::Value::Array(
            value
                .split_whitespace()
                .map(|s| toml::Value::String(s.to_string()))
                .collect(),
        ),
        "manifest_url" | "bundle_version" | "install_root" | "page_path" | "overlay_dir"
        | "content_root" | "preset_base_url" | "state_file" => {
            toml::Value::String(value.to_string())
        }
        _ => {
            anyhow::bail!(
                "Unknown config key: '{}'\nAvailable: enabled, manifest_url, bundle_version, \
                install_root, page_path, overlay_dir, content_root, text_chunk_size, binary_chunk_size, \
                network_timeout_secs, bridge_timeout_secs, reload_after_overlay, check_interval_minutes, \
                bridge_command, preset_base_url, state_file",
                key
            );
        }
    };

    table.insert(key.to_string(), toml_val);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(&toml::Value::Table(table))?;
    std::fs::write(path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_known_fields() {
        let parsed: toml::Value = r#"
            manifest_url = "https://cdn.example.com/darkpanel/update.json"
            install_root = "C:/CEP/extensions/darkpanel"
            text_chunk_size = 1000
            reload_after_overlay = false
            bridge_command = ["estk-runner", "--stdin"]
            unknown_key = 1
        "#
        .parse()
        .unwrap();

        let cfg = parse_config(&parsed);
        assert_eq!(cfg.manifest_url, "https://cdn.example.com/darkpanel/update.json");
        assert_eq!(cfg.install_root, "C:/CEP/extensions/darkpanel");
        assert_eq!(cfg.text_chunk_size, 1000);
        assert_eq!(cfg.binary_chunk_size, 20_000);
        assert!(!cfg.reload_after_overlay);
        assert_eq!(cfg.bridge_command, vec!["estk-runner", "--stdin"]);
    }

    #[test]
    fn bridge_command_accepts_plain_string() {
        let parsed: toml::Value = r#"bridge_command = "estk-runner --stdin""#.parse().unwrap();
        assert_eq!(parse_config(&parsed).bridge_command, vec!["estk-runner", "--stdin"]);
    }

    #[test]
    fn non_positive_chunk_size_is_ignored() {
        let parsed: toml::Value = "text_chunk_size = 0".parse().unwrap();
        assert_eq!(parse_config(&parsed).text_chunk_size, 30_000);
    }

    #[test]
    fn out_of_range_interval_is_ignored() {
        let parsed: toml::Value = "check_interval_minutes = 5000000000".parse().unwrap();
        assert_eq!(parse_config(&parsed).check_interval_minutes, 60);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(set_config_value_at(&path, "check_interval_minutes", "5000000000").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn set_value_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join(CONFIG_FILE);

        set_config_value_at(&path, "manifest_url", "https://cdn/update.json").unwrap();
        set_config_value_at(&path, "check_interval_minutes", "30").unwrap();
        set_config_value_at(&path, "enabled", "false").unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.manifest_url, "https://cdn/update.json");
        assert_eq!(cfg.check_interval_minutes, 30);
        assert!(!cfg.enabled);
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        assert!(set_config_value_at(&path, "enabled", "yes").is_err());
        assert!(set_config_value_at(&path, "text_chunk_size", "-1").is_err());
        assert!(set_config_value_at(&path, "github_owner", "x").is_err());
        assert!(!path.exists());
    }
}
