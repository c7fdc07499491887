//! 프리셋 스테이징 및 적용
//!
//! 1. `<preset_base_url>/presets/<name>`에서 바이너리 다운로드
//! 2. 호스트 임시 폴더에 빈 파일 생성 (스크립트가 전체 경로 반환)
//! 3. base64 청크를 순서대로 이어 쓰기
//! 4. 선택된 레이어에 적용 (`Success:<개수>`)
//!
//! 적용 자체의 의미는 호스트 스크립트 쪽 소관이며 여기서는 결과 개수만 해석합니다.

use crate::bridge::{Bridge, ScriptHost};
use crate::error::SyncError;
use crate::fetch::{cache_bust_millis, with_query, AssetFetcher};
use crate::script;
use crate::transfer::write_base64_in_chunks;

pub struct PresetStager<F: AssetFetcher, H: ScriptHost> {
    fetcher: F,
    bridge: Bridge<H>,
    base_url: String,
    chunk_size: usize,
}

/// 경로 구분자나 상위 경로가 섞인 이름은 거부
fn validate_name(name: &str) -> Result<&str, SyncError> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(SyncError::Config {
            message: format!("invalid preset name: {:?}", name),
        });
    }
    Ok(name)
}

/// `"Success:3"` → 3
fn parse_applied_count(reply: &str) -> Option<usize> {
    reply.trim().strip_prefix("Success:")?.trim().parse().ok()
}

impl<F: AssetFetcher, H: ScriptHost> PresetStager<F, H> {
    pub fn new(fetcher: F, bridge: Bridge<H>, base_url: &str, chunk_size: usize) -> Self {
        Self {
            fetcher,
            bridge,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            chunk_size,
        }
    }

    fn preset_url(&self, name: &str) -> String {
        let bust = cache_bust_millis();
        with_query(
            &format!("{}/presets/{}", self.base_url, name),
            &[("v", bust.as_str())],
        )
    }

    /// 프리셋을 호스트로 옮긴 뒤 적용하고, 적용된 레이어 수를 반환
    pub async fn stage_and_apply(&self, name: &str) -> Result<usize, SyncError> {
        let name = validate_name(name)?;
        if self.base_url.is_empty() {
            return Err(SyncError::Config {
                message: "preset_base_url is not configured".to_string(),
            });
        }
        if !self.bridge.host().is_available() {
            return Err(SyncError::BridgeUnavailable);
        }

        let data = self.fetcher.fetch_bytes(&self.preset_url(name)).await?;
        tracing::info!("[Preset] Downloaded {} ({} bytes)", name, data.len());

        let staged = self
            .bridge
            .eval_value("create preset file", script::create_temp_binary(name))
            .await?;

        if !write_base64_in_chunks(&self.bridge, &staged, &data, self.chunk_size).await {
            return Err(SyncError::Bridge {
                operation: "append chunk".to_string(),
                message: format!("transfer of {} aborted", name),
            });
        }

        let reply = self
            .bridge
            .eval_value("apply preset", script::apply_preset(&staged))
            .await?;

        let applied = parse_applied_count(&reply).ok_or_else(|| SyncError::Bridge {
            operation: "apply preset".to_string(),
            message: format!("unrecognized reply: {:?}", reply),
        })?;

        tracing::info!("[Preset] Applied {} to {} layer(s)", name, applied);
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::UnavailableHost;
    use crate::testing::{FakeFetcher, ScriptedHost};
    use std::time::Duration;

    const BASE: &str = "https://cdn.example.com/darkpanel";

    #[test]
    fn names_with_paths_are_rejected() {
        for bad in ["", "  ", "../x.ffx", "a/b.ffx", "a\\b.ffx"] {
            assert!(validate_name(bad).is_err(), "{:?}", bad);
        }
        assert_eq!(validate_name(" Glow.ffx ").unwrap(), "Glow.ffx");
    }

    #[test]
    fn applied_count_parsing() {
        assert_eq!(parse_applied_count("Success:3"), Some(3));
        assert_eq!(parse_applied_count("Success: 1\n"), Some(1));
        assert_eq!(parse_applied_count("OK"), None);
        assert_eq!(parse_applied_count("Success:many"), None);
    }

    #[tokio::test]
    async fn stages_in_order_then_applies() {
        let fetcher = FakeFetcher::new();
        fetcher.serve(&format!("{}/presets/Glow.ffx", BASE), "preset-bytes");
        let host = ScriptedHost::replying(["/tmp/Glow.ffx", "OK", "OK", "Success:2"]);
        let stager = PresetStager::new(
            fetcher,
            Bridge::new(host.clone(), Duration::from_secs(1)),
            &format!("{}/", BASE),
            8,
        );

        assert_eq!(stager.stage_and_apply("Glow.ffx").await.unwrap(), 2);

        let scripts = host.scripts();
        assert_eq!(scripts.len(), 4);
        assert!(scripts[0].contains("Folder.temp"));
        assert!(scripts[1].contains("b64decode") && scripts[1].contains("\"cHJlc2V0\""));
        assert!(scripts[2].contains("\"LWJ5dGVz\""));
        assert!(scripts[3].contains("applyPreset"));
    }

    #[tokio::test]
    async fn create_failure_stops_before_transfer() {
        let fetcher = FakeFetcher::new();
        fetcher.serve(&format!("{}/presets/Glow.ffx", BASE), "bytes");
        let host = ScriptedHost::replying(["Error: temp folder locked"]);
        let stager = PresetStager::new(fetcher, Bridge::new(host.clone(), Duration::from_secs(1)), BASE, 8);

        let err = stager.stage_and_apply("Glow.ffx").await.unwrap_err();
        assert!(matches!(err, SyncError::Bridge { ref message, .. } if message == "temp folder locked"));
        assert_eq!(host.scripts().len(), 1);
    }

    #[tokio::test]
    async fn unexpected_apply_reply_is_an_error() {
        let fetcher = FakeFetcher::new();
        fetcher.serve(&format!("{}/presets/Glow.ffx", BASE), "ab");
        let host = ScriptedHost::replying(["/tmp/Glow.ffx", "OK", "done"]);
        let stager = PresetStager::new(fetcher, Bridge::new(host, Duration::from_secs(1)), BASE, 20_000);

        let err = stager.stage_and_apply("Glow.ffx").await.unwrap_err();
        assert!(matches!(err, SyncError::Bridge { ref operation, .. } if operation == "apply preset"));
    }

    #[tokio::test]
    async fn unavailable_bridge_downloads_nothing() {
        let fetcher = FakeFetcher::new();
        let stager = PresetStager::new(
            fetcher.clone(),
            Bridge::new(UnavailableHost, Duration::from_secs(1)),
            BASE,
            20_000,
        );
        assert_eq!(stager.stage_and_apply("Glow.ffx").await.unwrap_err(), SyncError::BridgeUnavailable);
        assert!(fetcher.requested().is_empty());
    }
}
