//! # darkpanel 번들 동기화 라이브러리
//!
//! 설치된 패널 번들과 원격에 게시된 매니페스트를 맞춰 줍니다.
//!
//! ## 동작 원리
//! 1. **버전 확인(oracle.rs)**: `update.json`을 받아 설치 버전과 문자열로 비교 (다르면 업데이트)
//! 2. **설치(prober.rs)**: 호스트 스크립트 브리지로 설치 디렉터리에 파일을 청크 단위로 기록
//! 3. **오버레이(overlay.rs)**: 설치할 수 없으면 실행 중인 페이지의 스타일시트/본문만 교체
//! 4. **조정(reconciler.rs)**: 확인 → 사용자 확인 → 설치 또는 오버레이 → 버전 기록
//!
//! ## 보조 모듈
//! - **브리지(bridge.rs, script.rs)**: 콜백 기반 `evalScript`를 future로 감싸고 `"OK"`/`"ERR:"` 해석
//! - **전송(transfer.rs)**: 첫 청크 truncate, 이후 append, 순서대로 하나씩
//! - **저장소(store.rs)**: 설치 버전 마커, 캐시 무효화 토큰
//! - **프리셋(preset.rs)**: 바이너리 프리셋을 base64 청크로 호스트에 옮긴 뒤 적용
//!
//! ## update.json
//! ```json
//! {
//!   "version": "2.0",
//!   "files": {
//!     "index.html":    { "url": "https://cdn.example.com/darkpanel/index.html" },
//!     "css/style.css": { "url": "https://cdn.example.com/darkpanel/css/style.css" },
//!     "js/main.js":    { "url": "https://cdn.example.com/darkpanel/js/main.js" }
//!   }
//! }
//! ```

// ═══════════════════════════════════════════════════════
// 모듈
// ═══════════════════════════════════════════════════════

pub mod bridge;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod oracle;
pub mod overlay;
pub mod preset;
pub mod prober;
pub mod reconciler;
pub mod scheduler;
pub mod script;
pub mod store;
pub mod transfer;
pub mod version;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use bridge::{Bridge, BridgeReply, CommandHost, PanelHost, ScriptHost, UnavailableHost};
pub use error::SyncError;
pub use fetch::{AssetFetcher, HttpFetcher};
pub use manifest::{FileDescriptor, FileRole, RemoteManifest};
pub use oracle::{CheckOutcome, VersionOracle};
pub use overlay::{HtmlPage, LivePage, OverlayApplier, OverlayReport};
pub use preset::PresetStager;
pub use prober::WriteProber;
pub use reconciler::{Reconciler, ReloadKind, SyncState, UpdateEvent, UpdateMode, UpdateOutcome};
pub use store::{InstalledState, JsonFileStore, KeyValueStore, MemoryStore};
pub use version::VersionToken;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 내장 번들 버전 (저장된 설치 버전이 없을 때 사용)
pub const BUNDLE_VERSION: &str = "1.1";

// ═══════════════════════════════════════════════════════
// 설정
// ═══════════════════════════════════════════════════════

/// 동기화 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    /// 원격 `update.json` URL
    pub manifest_url: String,
    /// 내장 번들 버전
    pub bundle_version: String,
    /// 호스트 기준 패널 설치 경로
    pub install_root: String,
    /// 실행 중인 패널 문서 (기본: `<install_root>/index.html`)
    #[serde(default)]
    pub page_path: Option<String>,
    /// 오버레이 결과 문서를 쓸 디렉터리 (기본: 상태 파일 옆 `overlay/`)
    #[serde(default)]
    pub overlay_dir: Option<String>,
    /// 교체 대상 content root 태그
    pub content_root: String,
    pub text_chunk_size: usize,
    pub binary_chunk_size: usize,
    pub network_timeout_secs: u64,
    pub bridge_timeout_secs: u64,
    /// 오버레이 적용 후 UI 재초기화 여부
    pub reload_after_overlay: bool,
    /// `watch` 체크 간격 (분)
    pub check_interval_minutes: u32,
    /// 스크립트 실행기 argv (비어 있으면 브리지 없음)
    #[serde(default)]
    pub bridge_command: Vec<String>,
    #[serde(default)]
    pub preset_base_url: Option<String>,
    #[serde(default)]
    pub state_file: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest_url: String::new(),
            bundle_version: BUNDLE_VERSION.to_string(),
            install_root: String::new(),
            page_path: None,
            overlay_dir: None,
            content_root: "main".to_string(),
            text_chunk_size: transfer::TEXT_CHUNK_SIZE,
            binary_chunk_size: transfer::BINARY_CHUNK_SIZE,
            network_timeout_secs: 15,
            bridge_timeout_secs: 15,
            reload_after_overlay: true,
            check_interval_minutes: 60,
            bridge_command: Vec::new(),
            preset_base_url: None,
            state_file: None,
        }
    }
}

impl SyncConfig {
    pub fn bundle_token(&self) -> Result<VersionToken, SyncError> {
        VersionToken::parse(&self.bundle_version).ok_or_else(|| SyncError::Config {
            message: "bundle_version must not be empty".to_string(),
        })
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs.max(1))
    }

    pub fn state_path(&self) -> PathBuf {
        match self.state_file.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => JsonFileStore::default_path(),
        }
    }

    pub fn page_path(&self) -> PathBuf {
        match self.page_path.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.install_root).join(FileRole::Markup.rel_path()),
        }
    }

    pub fn overlay_dir(&self) -> PathBuf {
        match self.overlay_dir.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => self
                .state_path()
                .parent()
                .map(|p| p.join("overlay"))
                .unwrap_or_else(|| PathBuf::from("overlay")),
        }
    }

    pub fn scheduler(&self) -> scheduler::SchedulerConfig {
        scheduler::SchedulerConfig {
            interval_minutes: self.check_interval_minutes,
            enabled: self.enabled,
        }
    }
}
