//! 패널 로컬 상태 저장소
//!
//! 패널 인스턴스 범위의 작은 문자열 키/값 저장소입니다.
//! 동기화 코어가 사용하는 키는 설치 버전 마커, 마지막 적용 버전, 캐시 무효화 토큰뿐이고
//! 나머지 키(즐겨찾기, 그리드 열 수, 라이선스 등)는 UI 쪽 소유입니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::version::VersionToken;

pub const KEY_INSTALLED: &str = "darkpanel_installed_version";
pub const KEY_LAST_APPLIED: &str = "darkpanel_last_applied_version";
pub const KEY_CACHE_BUST: &str = "darkpanel_cache_bust";

/// 캐시 초기화 시에도 유지되는 키
pub const PRESERVED_KEYS: [&str; 6] = [
    "favorites",
    "currentPack",
    "gridCols",
    "darkpanel_license_key",
    KEY_INSTALLED,
    KEY_LAST_APPLIED,
];

/// 동기식 문자열 키/값 저장소
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SyncError>;
    fn remove(&mut self, key: &str) -> Result<(), SyncError>;
    /// `keep`에 없는 모든 키 삭제
    fn clear_preserving(&mut self, keep: &[&str]) -> Result<(), SyncError>;
}

/// 메모리 저장소 (브라우저 미리보기, 테스트)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SyncError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SyncError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear_preserving(&mut self, keep: &[&str]) -> Result<(), SyncError> {
        self.entries.retain(|k, _| keep.contains(&k.as_str()));
        Ok(())
    }
}

/// JSON 파일 기반 저장소: 변경될 때마다 전체를 다시 씁니다
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// 파일이 없으면 빈 저장소로 시작합니다.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::from_io(&e, "read", &path.display().to_string()))?;
            match serde_json::from_str::<StoreFile>(&content) {
                Ok(file) => file.entries,
                Err(e) => {
                    tracing::warn!("[Store] Corrupt state file {}, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// 기본 경로: `%APPDATA%/darkpanel/panel-state.json` 또는 `~/.darkpanel/panel-state.json`
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .map(|appdata| PathBuf::from(appdata).join("darkpanel").join("panel-state.json"))
                .unwrap_or_else(|_| PathBuf::from("panel-state.json"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".darkpanel").join("panel-state.json"))
                .unwrap_or_else(|_| PathBuf::from("panel-state.json"))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), SyncError> {
        let path_str = self.path.display().to_string();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SyncError::from_io(&e, "create directory", &path_str))?;
            }
        }
        let json = serde_json::to_string_pretty(&StoreFile { entries: self.entries.clone() })
            .map_err(|e| SyncError::Store {
                operation: "serialize".to_string(),
                path: path_str.clone(),
                message: e.to_string(),
            })?;
        std::fs::write(&self.path, json).map_err(|e| SyncError::from_io(&e, "write", &path_str))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SyncError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), SyncError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn clear_preserving(&mut self, keep: &[&str]) -> Result<(), SyncError> {
        self.entries.retain(|k, _| keep.contains(&k.as_str()));
        self.save()
    }
}

/// 설치 버전 상태
///
/// 시작 시 한 번 읽고, 업데이트가 최종 성공했을 때 [`InstalledState::commit`]으로만 갱신합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    pub version: VersionToken,
}

impl InstalledState {
    /// 유효 설치 버전: last_applied → installed → 내장 번들 버전
    pub fn load<K: KeyValueStore + ?Sized>(store: &K, bundle_version: &VersionToken) -> Self {
        let version = store
            .get(KEY_LAST_APPLIED)
            .as_deref()
            .and_then(VersionToken::parse)
            .or_else(|| store.get(KEY_INSTALLED).as_deref().and_then(VersionToken::parse))
            .unwrap_or_else(|| bundle_version.clone());
        Self { version }
    }

    /// 최종 성공 시 두 마커를 모두 기록
    pub fn commit<K: KeyValueStore + ?Sized>(
        store: &mut K,
        version: &VersionToken,
    ) -> Result<Self, SyncError> {
        store.set(KEY_INSTALLED, version.as_str())?;
        store.set(KEY_LAST_APPLIED, version.as_str())?;
        Ok(Self { version: version.clone() })
    }
}

/// 버전 마커까지 포함한 전체 초기화
pub fn reset_version_markers<K: KeyValueStore + ?Sized>(store: &mut K) -> Result<(), SyncError> {
    store.remove(KEY_INSTALLED)?;
    store.remove(KEY_LAST_APPLIED)?;
    store.remove(KEY_CACHE_BUST)
}
