//! 동기화 에러 타입
//!
//! ## 지원하는 에러 상황
//! - 매니페스트/파일 다운로드 실패, 타임아웃
//! - 매니페스트 형식 오류
//! - 호스트 스크립트 브리지 실패 (폴더 생성, 청크 쓰기)
//! - 로컬 상태 저장소 I/O 오류

use std::fmt;
use serde::{Deserialize, Serialize};

/// 동기화 에러 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum SyncError {
    /// 네트워크 연결 실패
    Network {
        url: String,
        message: String,
    },
    /// 요청 또는 브리지 왕복 타임아웃
    Timeout {
        operation: String,
        duration_ms: u64,
    },
    /// 2xx가 아닌 HTTP 응답
    Http {
        status_code: u16,
        url: String,
    },
    /// 매니페스트 JSON 형식 오류 / version 필드 누락
    Manifest {
        message: String,
    },
    /// 브리지 스크립트가 실패 응답을 반환
    Bridge {
        operation: String,
        message: String,
    },
    /// 호스트 브리지를 사용할 수 없음 (브라우저 미리보기 등)
    BridgeUnavailable,
    /// 무결성 검증 실패 (해시 불일치)
    Validation {
        path: String,
        expected: String,
        actual: String,
    },
    /// 로컬 상태 저장소 오류
    Store {
        operation: String,
        path: String,
        message: String,
    },
    /// 설정 오류
    Config {
        message: String,
    },
    /// 현재 상태에서 허용되지 않는 전이
    InvalidState {
        expected: String,
        actual: String,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Network { url, message } => {
                write!(f, "Network error for {}: {}", url, message)
            }
            SyncError::Timeout { operation, duration_ms } if duration_ms % 1000 == 0 => {
                write!(f, "Timeout after {}s: {}", duration_ms / 1000, operation)
            }
            SyncError::Timeout { operation, duration_ms } => {
                write!(f, "Timeout after {}ms: {}", duration_ms, operation)
            }
            SyncError::Http { status_code, url } => {
                write!(f, "HTTP {} from {}", status_code, url)
            }
            SyncError::Manifest { message } => {
                write!(f, "Invalid manifest: {}", message)
            }
            SyncError::Bridge { operation, message } => {
                write!(f, "Bridge error during {}: {}", operation, message)
            }
            SyncError::BridgeUnavailable => {
                write!(f, "Host script bridge is not available")
            }
            SyncError::Validation { path, expected, actual } => {
                write!(f, "Hash mismatch for {}: expected {}, got {}", path, expected, actual)
            }
            SyncError::Store { operation, path, message } => {
                write!(f, "Store error during {} on '{}': {}", operation, path, message)
            }
            SyncError::Config { message } => {
                write!(f, "Configuration error: {}", message)
            }
            SyncError::InvalidState { expected, actual } => {
                write!(f, "Invalid state: expected {}, was {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// 업데이트 팝업 상태줄에 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network { .. } => "Check your internet connection.".to_string(),
            SyncError::Timeout { .. } => "The server is not responding. Try again later.".to_string(),
            SyncError::Http { status_code, .. } => {
                if *status_code == 404 {
                    "The update files were not found.".to_string()
                } else if *status_code >= 500 {
                    "The update server has a temporary problem.".to_string()
                } else {
                    format!("Server error ({})", status_code)
                }
            }
            SyncError::Manifest { .. } => "The update description is invalid.".to_string(),
            SyncError::Bridge { message, .. } => format!("Host rejected the update: {}", message),
            SyncError::BridgeUnavailable => {
                "Host application is not available (browser preview).".to_string()
            }
            SyncError::Validation { path, .. } => format!("Downloaded file is corrupted: {}", path),
            SyncError::Store { .. } => "Could not save panel settings.".to_string(),
            SyncError::Config { message } => format!("Configuration error: {}", message),
            SyncError::InvalidState { .. } => "No update is waiting for confirmation.".to_string(),
        }
    }

    /// reqwest 에러를 SyncError로 변환
    pub fn from_reqwest(err: &reqwest::Error, url: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            SyncError::Timeout {
                operation: format!("GET {}", url),
                duration_ms: timeout_secs.saturating_mul(1000),
            }
        } else if let Some(status) = err.status() {
            SyncError::Http {
                status_code: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            SyncError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// IO 에러를 SyncError로 변환
    pub fn from_io(err: &std::io::Error, operation: &str, path: &str) -> Self {
        SyncError::Store {
            operation: operation.to_string(),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
