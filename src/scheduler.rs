//! 업데이트 체크 스케줄: 원샷 체크 유틸리티
//!
//! ## 아키텍처
//! 패널은 로드될 때 한 번 체크합니다. CLI `watch`는 같은 체크를
//! `check_interval_minutes` 간격으로 반복합니다.
//!
//! 이 모듈은 그때 사용되는 간격 계산, 결과 보고서, 종료 코드를 제공합니다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::oracle::CheckOutcome;
use crate::version::VersionToken;

/// 스케줄 설정
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 체크 간격 (분 단위, 기본 60분)
    pub interval_minutes: u32,
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// 체크 간격 (0이면 1분으로 올림)
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) as u64 * 60)
    }
}

/// 원샷 체크 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub installed_version: VersionToken,
    /// 원격 버전 (확인 실패 시 None)
    pub remote_version: Option<VersionToken>,
    pub update_available: bool,
    /// 업데이트 대상 파일 (허용 목록 밖 경로 포함, 원격 매니페스트 그대로)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// 오류 메시지 (있으면)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckReport {
    pub fn from_outcome(installed: &VersionToken, outcome: &CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::UpdateAvailable { version, files } => Self {
                installed_version: installed.clone(),
                remote_version: Some(version.clone()),
                update_available: true,
                files: files.keys().cloned().collect(),
                error: None,
            },
            CheckOutcome::UpToDate { version } => Self {
                installed_version: installed.clone(),
                remote_version: Some(version.clone()),
                update_available: false,
                files: Vec::new(),
                error: None,
            },
            CheckOutcome::CheckFailed { reason } => Self {
                installed_version: installed.clone(),
                remote_version: None,
                update_available: false,
                files: Vec::new(),
                error: Some(reason.clone()),
            },
        }
    }

    /// 비활성화 상태 보고서
    pub fn disabled(installed: &VersionToken) -> Self {
        Self {
            installed_version: installed.clone(),
            remote_version: None,
            update_available: false,
            files: Vec::new(),
            error: Some("Updater is disabled".into()),
        }
    }
}

/// 체크 결과를 JSON 문자열로 직렬화 (`check --json` 출력)
pub fn report_to_json(report: &CheckReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
}

/// 프로세스 종료 코드 결정
///
/// - `0`: 업데이트 있음 (호출측에서 알림 표시)
/// - `1`: 체크 실패 (에러)
/// - `2`: 업데이트 없음 (조용히 종료)
pub fn exit_code(report: &CheckReport) -> i32 {
    if report.error.is_some() {
        1
    } else if report.update_available {
        0
    } else {
        2
    }
}
