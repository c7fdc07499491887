//! 원격 업데이트 매니페스트 (update.json)
//!
//! ```json
//! {
//!   "version": "2.0",
//!   "files": {
//!     "index.html":    { "url": "https://example.com/index.html" },
//!     "css/style.css": { "url": "https://example.com/css/style.css", "hash": "9f86d0..." }
//!   }
//! }
//! ```
//!
//! 이 버전이 배치할 줄 아는 파일은 [`FileRole`] 허용 목록으로 고정되어 있고,
//! 그 밖의 경로는 조용히 무시됩니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::version::VersionToken;

/// 매니페스트 내 개별 파일 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub url: String,
    /// 선택: 파일 내용의 SHA-256 (hex)
    #[serde(default)]
    pub hash: Option<String>,
}

/// 패널이 알고 있는 논리적 파일 역할 (닫힌 허용 목록)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// index.html
    Markup,
    /// css/style.css
    Stylesheet,
    /// js/main.js
    Script,
    /// CSXS/manifest.xml
    HostManifest,
}

impl FileRole {
    pub const ALL: [FileRole; 4] = [
        FileRole::Markup,
        FileRole::Stylesheet,
        FileRole::Script,
        FileRole::HostManifest,
    ];

    /// 설치 루트 기준 상대 경로 (매니페스트 키)
    pub fn rel_path(&self) -> &'static str {
        match self {
            FileRole::Markup => "index.html",
            FileRole::Stylesheet => "css/style.css",
            FileRole::Script => "js/main.js",
            FileRole::HostManifest => "CSXS/manifest.xml",
        }
    }

    /// 매니페스트 키로부터 역할 판정 (허용 목록 밖이면 None)
    pub fn from_rel_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.rel_path() == path)
    }

    /// 상위 디렉터리 ("css/style.css" → Some("css"))
    pub fn subdirectory(&self) -> Option<&'static str> {
        let path = self.rel_path();
        path.rfind('/').map(|idx| &path[..idx])
    }
}

/// update.json 원본 형태
///
/// `files` 항목은 경로별로 따로 해석합니다. 모르는 경로는 형태가 달라도 무시해야 하므로
/// 여기서는 원시 JSON 값으로만 받습니다.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    files: Option<BTreeMap<String, serde_json::Value>>,
}

/// 파싱이 끝난 원격 매니페스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    pub version: VersionToken,
    pub files: BTreeMap<String, FileDescriptor>,
}

impl RemoteManifest {
    /// 응답 본문을 파싱합니다.
    ///
    /// 잘못된 JSON, `version` 누락/빈 값, 허용 목록 파일의 형식 오류는 모두
    /// [`SyncError::Manifest`]가 되며, 호출자는 이를 "이번 체크 건너뜀"으로 처리합니다.
    /// `files`가 없거나 `null`이면 빈 목록이고, 모르는 경로의 잘못된 항목은 버립니다.
    pub fn parse(body: &str) -> Result<Self, SyncError> {
        let raw: RawManifest = serde_json::from_str(body).map_err(|e| SyncError::Manifest {
            message: e.to_string(),
        })?;

        let version = raw
            .version
            .as_deref()
            .and_then(VersionToken::parse)
            .ok_or_else(|| SyncError::Manifest {
                message: "missing 'version' field".to_string(),
            })?;

        let mut files = BTreeMap::new();
        for (path, value) in raw.files.unwrap_or_default() {
            match serde_json::from_value::<FileDescriptor>(value) {
                Ok(descriptor) => {
                    files.insert(path, descriptor);
                }
                Err(e) if FileRole::from_rel_path(&path).is_some() => {
                    return Err(SyncError::Manifest {
                        message: format!("invalid entry for '{}': {}", path, e),
                    });
                }
                Err(e) => {
                    tracing::debug!("[Manifest] Ignoring unknown entry '{}': {}", path, e);
                }
            }
        }

        Ok(Self { version, files })
    }
}

/// 허용 목록에 있는 파일만 (역할, 정보)로 반환
pub fn known_files(
    files: &BTreeMap<String, FileDescriptor>,
) -> impl Iterator<Item = (FileRole, &FileDescriptor)> {
    files
        .iter()
        .filter_map(|(path, desc)| FileRole::from_rel_path(path).map(|role| (role, desc)))
}
