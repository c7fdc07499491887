//! 번들 버전 토큰
//!
//! 버전은 불투명한 문자열로 취급합니다. 설치된 버전과 원격 버전은
//! **같은지/다른지만** 비교하며, 순서(더 새로운지)는 판단하지 않습니다.
//! 원격 토큰이 "더 오래된" 값이어도 다르면 업데이트로 제시됩니다.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 불투명 버전 토큰 (semver로 가정하지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// 앞뒤 공백을 제거하고, 비어 있으면 None
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 업데이트 판정: 문자열이 다르면 true
    pub fn differs_from(&self, other: &VersionToken) -> bool {
        self.0 != other.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 릴리스 도구용: "X.Y" → "X.(Y+1)"
///
/// 퍼블리시 측에서만 쓰이며 업데이트 판정에는 관여하지 않습니다.
/// minor가 없으면 0으로 간주합니다 ("2" → "2.1").
pub fn bump_minor(current: &str) -> Option<String> {
    let mut parts = current.trim().split('.');
    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    Some(format!("{}.{}", major, minor + 1))
}

/// 호스트 매니페스트(`CSXS/manifest.xml`)의 `ExtensionBundleVersion` 올리기
///
/// (새 XML, 새 버전)을 반환합니다. 속성이 없거나 값이 숫자가 아니면 None.
pub fn bump_bundle_attribute(xml: &str) -> Option<(String, String)> {
    let re = Regex::new(r#"ExtensionBundleVersion\s*=\s*"([^"]*)""#).ok()?;
    let caps = re.captures(xml)?;
    let current = caps.get(1)?;
    let next = bump_minor(current.as_str())?;

    let mut updated = String::with_capacity(xml.len() + 2);
    updated.push_str(&xml[..current.start()]);
    updated.push_str(&next);
    updated.push_str(&xml[current.end()..]);
    Some((updated, next))
}
