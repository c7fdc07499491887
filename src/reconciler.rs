//! 업데이트 조정자 (Reconciler)
//!
//! ## 상태 전이
//! ```text
//! Idle → Checking → UpToDate
//!                 → PromptPending → (decline) Idle
//!                                 → (confirm) Updating → Installed
//!                                                      → OverlayApplied
//!                                                      → Failed
//! ```
//!
//! 설치 버전은 `Installed` 또는 `OverlayApplied`에 도달했을 때만
//! [`InstalledState::commit`]으로 기록됩니다. 그 밖의 어떤 경로도 버전을 바꾸지 않습니다.
//! 상태는 프로세스(패널 로드) 범위이며 재시작하면 다시 `Idle`에서 시작합니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::error::SyncError;
use crate::fetch::{cache_bust_millis, AssetFetcher};
use crate::manifest::FileDescriptor;
use crate::oracle::{CheckOutcome, VersionOracle};
use crate::overlay::{LivePage, OverlayApplier};
use crate::prober::WriteProber;
use crate::store::{InstalledState, KeyValueStore, KEY_CACHE_BUST, KEY_LAST_APPLIED, PRESERVED_KEYS};
use crate::transfer::ChunkSink;
use crate::version::VersionToken;

/// 조정자 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Checking,
    UpToDate,
    PromptPending {
        version: VersionToken,
        files: BTreeMap<String, FileDescriptor>,
    },
    Updating {
        version: VersionToken,
    },
    Installed {
        version: VersionToken,
    },
    OverlayApplied {
        version: VersionToken,
    },
    Failed {
        reason: String,
    },
}

impl SyncState {
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Checking => "checking",
            SyncState::UpToDate => "up_to_date",
            SyncState::PromptPending { .. } => "prompt_pending",
            SyncState::Updating { .. } => "updating",
            SyncState::Installed { .. } => "installed",
            SyncState::OverlayApplied { .. } => "overlay_applied",
            SyncState::Failed { .. } => "failed",
        }
    }
}

/// 업데이트 적용 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Installed,
    Overlay,
}

/// 적용 후 필요한 재시작 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadKind {
    /// 패널 전체 재시작 (디스크에 새 파일이 기록됨)
    Full,
    /// 교체된 content root에 묶인 UI만 다시 초기화
    Ui,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub version: VersionToken,
    pub mode: UpdateMode,
    pub reload: ReloadKind,
}

/// UI 쪽으로 내보내는 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UpdateEvent {
    UpdateAvailable { version: VersionToken },
    UpdateApplied { version: VersionToken, mode: UpdateMode },
    UpdateFailed { reason: String },
    /// 팝업 상태 줄 텍스트
    Status { message: String },
}

pub struct Reconciler<F, S, P, K>
where
    F: AssetFetcher,
    S: ChunkSink,
    P: LivePage,
    K: KeyValueStore,
{
    oracle: VersionOracle<F>,
    prober: WriteProber<F, S>,
    overlay: OverlayApplier<F, P>,
    store: K,
    installed: InstalledState,
    state: SyncState,
    reload_after_overlay: bool,
    events: broadcast::Sender<UpdateEvent>,
}

impl<F, S, P, K> Reconciler<F, S, P, K>
where
    F: AssetFetcher,
    S: ChunkSink,
    P: LivePage,
    K: KeyValueStore,
{
    pub fn new(
        oracle: VersionOracle<F>,
        prober: WriteProber<F, S>,
        overlay: OverlayApplier<F, P>,
        store: K,
        bundle_version: &VersionToken,
        reload_after_overlay: bool,
    ) -> Self {
        let installed = InstalledState::load(&store, bundle_version);
        let (events, _) = broadcast::channel(64);
        tracing::debug!("[Reconciler] Installed version: {}", installed.version);

        Self {
            oracle,
            prober,
            overlay,
            store,
            installed,
            state: SyncState::Idle,
            reload_after_overlay,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn installed(&self) -> &VersionToken {
        &self.installed.version
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn prober(&self) -> &WriteProber<F, S> {
        &self.prober
    }

    pub fn overlay(&self) -> &OverlayApplier<F, P> {
        &self.overlay
    }

    fn emit(&self, event: UpdateEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        self.emit(UpdateEvent::Status { message: message.into() });
    }

    /// 원격 확인: 실패는 `UpToDate`로 접힘
    pub async fn check(&mut self) -> CheckOutcome {
        if let SyncState::Updating { version } = &self.state {
            tracing::warn!("[Reconciler] Check ignored while updating to {}", version);
            return CheckOutcome::CheckFailed {
                reason: "update in progress".to_string(),
            };
        }

        self.state = SyncState::Checking;
        let outcome = self.oracle.check_remote(&self.installed.version).await;

        match &outcome {
            CheckOutcome::UpdateAvailable { version, files } => {
                self.state = SyncState::PromptPending {
                    version: version.clone(),
                    files: files.clone(),
                };
                self.emit(UpdateEvent::UpdateAvailable { version: version.clone() });
            }
            CheckOutcome::UpToDate { version } => {
                self.refresh_cache_bust(version);
                self.state = SyncState::UpToDate;
            }
            CheckOutcome::CheckFailed { .. } => {
                self.state = SyncState::UpToDate;
            }
        }
        outcome
    }

    // 버전 변화가 없어도 마지막 적용 버전과 다르면 자산 URL 토큰을 갱신
    fn refresh_cache_bust(&mut self, remote: &VersionToken) {
        let last_applied = self.store.get(KEY_LAST_APPLIED);
        if last_applied.as_deref() == Some(remote.as_str()) {
            return;
        }
        let token = cache_bust_millis();
        match self.store.set(KEY_CACHE_BUST, &token) {
            Ok(()) => tracing::debug!("[Reconciler] Cache-bust token refreshed: {}", token),
            Err(e) => tracing::warn!("[Reconciler] Could not refresh cache-bust token: {}", e),
        }
    }

    /// "나중에": 상태만 되돌리고 아무것도 기록하지 않음
    pub fn decline(&mut self) -> Result<(), SyncError> {
        match &self.state {
            SyncState::PromptPending { version, .. } => {
                tracing::info!("[Reconciler] Update to {} postponed", version);
                self.state = SyncState::Idle;
                Ok(())
            }
            other => Err(SyncError::InvalidState {
                expected: "prompt_pending".to_string(),
                actual: other.name().to_string(),
            }),
        }
    }

    /// "지금 업데이트": 설치를 시도하고 실패하면 오버레이로 대체
    pub async fn confirm(&mut self) -> Result<UpdateOutcome, SyncError> {
        let (version, files) = match &self.state {
            SyncState::PromptPending { version, files } => (version.clone(), files.clone()),
            other => {
                return Err(SyncError::InvalidState {
                    expected: "prompt_pending".to_string(),
                    actual: other.name().to_string(),
                })
            }
        };

        self.state = SyncState::Updating { version: version.clone() };
        self.status(format!("Updating to {}...", version));

        match self.run_update(&version, &files).await {
            Ok(outcome) => {
                self.state = match outcome.mode {
                    UpdateMode::Installed => SyncState::Installed { version: version.clone() },
                    UpdateMode::Overlay => SyncState::OverlayApplied { version: version.clone() },
                };
                self.emit(UpdateEvent::UpdateApplied {
                    version: version.clone(),
                    mode: outcome.mode,
                });
                self.status(format!("Updated to {}", version));
                Ok(outcome)
            }
            Err(e) => {
                let reason = e.user_message();
                tracing::error!("[Reconciler] Update to {} failed: {}", version, e);
                self.state = SyncState::Failed { reason: reason.clone() };
                self.emit(UpdateEvent::UpdateFailed { reason: reason.clone() });
                self.status(format!("Update failed: {}", reason));
                Err(e)
            }
        }
    }

    async fn run_update(
        &mut self,
        version: &VersionToken,
        files: &BTreeMap<String, FileDescriptor>,
    ) -> Result<UpdateOutcome, SyncError> {
        if self.prober.try_install(files).await {
            self.installed = InstalledState::commit(&mut self.store, version)?;
            if let Err(e) = self.store.clear_preserving(&PRESERVED_KEYS) {
                tracing::warn!("[Reconciler] Cache clear before reload failed: {}", e);
            }
            tracing::info!("[Reconciler] Installed {} to disk", version);
            return Ok(UpdateOutcome {
                version: version.clone(),
                mode: UpdateMode::Installed,
                reload: ReloadKind::Full,
            });
        }

        tracing::info!("[Reconciler] Install unavailable, applying overlay");
        let cache_bust = self.store.get(KEY_CACHE_BUST);
        let report = self
            .overlay
            .apply_overlay(files, version, cache_bust.as_deref())
            .await?;
        tracing::debug!("[Reconciler] Overlay report: {:?}", report);
        self.overlay.persist()?;

        self.installed = InstalledState::commit(&mut self.store, version)?;
        Ok(UpdateOutcome {
            version: version.clone(),
            mode: UpdateMode::Overlay,
            reload: if self.reload_after_overlay {
                ReloadKind::Ui
            } else {
                ReloadKind::None
            },
        })
    }
}
