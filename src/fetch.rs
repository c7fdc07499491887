//! HTTP 다운로드 클라이언트
//!
//! 매니페스트와 개별 파일은 항상 캐시 무효화 쿼리를 붙여 `no-cache`로 요청합니다.
//! 모든 요청은 클라이언트 타임아웃으로 제한됩니다.

use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use url::{form_urlencoded, Url};

use crate::error::SyncError;

/// 원격 파일을 가져오는 능력
///
/// 실제 구현은 [`HttpFetcher`]이며, 테스트에서는 메모리 기반 구현으로 대체합니다.
pub trait AssetFetcher: Clone + Send + Sync {
    /// UTF-8 텍스트로 가져오기
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String, SyncError>> + Send;

    /// 바이너리로 가져오기
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, SyncError>> + Send;
}

/// reqwest 기반 다운로드 클라이언트
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("darkpanel-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { http, timeout_secs })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SyncError> {
        let response = self
            .http
            .get(url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .await
            .map_err(|e| SyncError::from_reqwest(&e, url, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(SyncError::Http {
                status_code: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl AssetFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SyncError> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| SyncError::from_reqwest(&e, url, self.timeout_secs))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::from_reqwest(&e, url, self.timeout_secs))?;
        Ok(bytes.to_vec())
    }
}

/// 쿼리 파라미터 추가
///
/// 절대 URL은 [`Url`]로 다시 조립하므로 기존 쿼리 뒤, `#fragment` 앞에 붙습니다.
/// 상대 경로(페이지 안의 `src` 값 등)는 fragment를 떼어 낸 뒤 같은 인코더로 붙입니다.
pub fn with_query(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    if let Ok(mut parsed) = Url::parse(url) {
        parsed.query_pairs_mut().extend_pairs(params.iter().copied());
        return parsed.to_string();
    }

    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().copied())
        .finish();
    let sep = if base.contains('?') { '&' } else { '?' };
    match fragment {
        Some(fragment) => format!("{}{}{}#{}", base, sep, query, fragment),
        None => format!("{}{}{}", base, sep, query),
    }
}

/// 캐시 무효화용 현재 시각 (밀리초)
pub fn cache_bust_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// 파일 내용의 SHA-256 (소문자 hex)
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 매니페스트에 해시가 있으면 검증
pub fn verify_hash(path: &str, data: &[u8], expected: Option<&str>) -> Result<(), SyncError> {
    let Some(expected) = expected.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(());
    };
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(SyncError::Validation {
            path: path.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
