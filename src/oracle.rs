//! 원격 버전 확인 (Version Oracle)
//!
//! 매니페스트를 캐시 무효화 쿼리와 함께 받아 설치 버전과 비교합니다.
//! 어떤 실패도 에러로 올리지 않고 [`CheckOutcome::CheckFailed`]로 접습니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::fetch::{cache_bust_millis, with_query, AssetFetcher};
use crate::manifest::{FileDescriptor, RemoteManifest};
use crate::version::VersionToken;

/// 한 번의 원격 확인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    UpdateAvailable {
        version: VersionToken,
        files: BTreeMap<String, FileDescriptor>,
    },
    UpToDate {
        version: VersionToken,
    },
    CheckFailed {
        reason: String,
    },
}

impl CheckOutcome {
    pub fn is_update_available(&self) -> bool {
        matches!(self, CheckOutcome::UpdateAvailable { .. })
    }
}

pub struct VersionOracle<F: AssetFetcher> {
    fetcher: F,
    manifest_url: String,
}

impl<F: AssetFetcher> VersionOracle<F> {
    pub fn new(fetcher: F, manifest_url: &str) -> Self {
        Self {
            fetcher,
            manifest_url: manifest_url.trim().to_string(),
        }
    }

    /// 원격 매니페스트만 가져오기
    pub async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError> {
        if self.manifest_url.is_empty() {
            return Err(SyncError::Config {
                message: "manifest_url is not configured".to_string(),
            });
        }
        let bust = cache_bust_millis();
        let url = with_query(&self.manifest_url, &[("t", bust.as_str())]);
        let body = self.fetcher.fetch_text(&url).await?;
        RemoteManifest::parse(&body)
    }

    /// 원격 버전과 설치 버전 비교: 다르기만 하면 업데이트
    pub async fn check_remote(&self, installed: &VersionToken) -> CheckOutcome {
        let manifest = match self.fetch_manifest().await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("[Oracle] Check skipped: {}", e);
                return CheckOutcome::CheckFailed { reason: e.to_string() };
            }
        };

        if manifest.version.differs_from(installed) {
            tracing::info!(
                "[Oracle] Update available: {} -> {}",
                installed,
                manifest.version
            );
            CheckOutcome::UpdateAvailable {
                version: manifest.version,
                files: manifest.files,
            }
        } else {
            tracing::debug!("[Oracle] Up to date ({})", installed);
            CheckOutcome::UpToDate { version: manifest.version }
        }
    }
}
