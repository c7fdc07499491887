//! 오버레이 적용 (Overlay Applier)
//!
//! 설치 디렉터리에 쓸 수 없을 때 실행 중인 페이지만 갱신합니다.
//! - 스타일시트: 기존 `css/style.css` 링크의 href를 원격 URL로 교체 (없으면 새 링크 추가)
//! - 마크업: 받아온 HTML의 content root(`<main>`) 내용을 현재 페이지의 content root에 복사
//!
//! 문서 전체를 바꾸지 않고 content root 하위 트리만 교체합니다.
//! 디스크의 설치 파일은 건드리지 않습니다.

use scraper::node::{Comment, Element};
use scraper::{Html, Node, Selector};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::SyncError;
use crate::fetch::{cache_bust_millis, verify_hash, with_query, AssetFetcher};
use crate::manifest::{FileDescriptor, FileRole};
use crate::version::VersionToken;

/// 캐시 버스팅 대상 미디어 요소
const MEDIA_WITH_SRC: &str = "img[src], video[src], source[src]";
const STYLESHEET_LINK: &str = r#"link[rel~="stylesheet"][href]"#;

/// 실행 중인 패널 문서
pub trait LivePage: Send {
    /// href에 `needle`이 포함된 스타일시트 링크를 모두 교체하고 교체 개수 반환
    fn replace_stylesheet_href(&mut self, needle: &str, href: &str) -> usize;

    fn append_stylesheet(&mut self, href: &str);

    /// `root` 선택자에 처음 걸리는 요소의 내부 HTML 교체: 루트가 없으면 false
    fn replace_content(&mut self, root: &str, inner_html: &str) -> bool;

    /// 변경된 문서를 보관 (버전 기록 전에 호출됨)
    fn persist(&self) -> Result<(), SyncError>;
}

/// HTML 문서 문자열 위에서 동작하는 [`LivePage`]
///
/// 변경할 때마다 문서를 DOM으로 파싱하고 다시 직렬화합니다.
/// 출력 경로가 있으면 [`LivePage::persist`]가 문서를 그 파일에 씁니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPage {
    source: String,
    output: Option<PathBuf>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn set_attr(element: &mut Element, name: &str, value: String) {
    for (key, current) in element.attrs.iter_mut() {
        if &*key.local == name {
            *current = value.into();
            return;
        }
    }
}

/// 문서에 없는 자리표시 주석 이름
fn splice_marker(source: &str) -> String {
    let mut n = 0u32;
    loop {
        let marker = format!("darkpanel-splice-{}", n);
        if !source.contains(&marker) {
            return marker;
        }
        n += 1;
    }
}

fn marker_node(marker: &str) -> Node {
    Node::Comment(Comment { comment: marker.into() })
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// 받아온 HTML을 분리된 조각으로 파싱해 content root 내부 HTML을 추출
pub fn extract_content(html: &str, root: &str) -> Option<String> {
    let root = selector(root)?;
    let fragment = Html::parse_fragment(html);
    let found = fragment.select(&root).next().map(|el| el.inner_html());
    found
}

/// `img`/`video`/`source`의 `src`에 `v=<version>&cb=<token>` 추가 (`data:` URL 제외)
pub fn bust_asset_sources(inner_html: &str, version: &str, token: &str) -> String {
    let Some(media) = selector(MEDIA_WITH_SRC) else {
        return inner_html.to_string();
    };
    let mut fragment = Html::parse_fragment(inner_html);

    let targets: Vec<_> = fragment
        .select(&media)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            Some((el.id(), with_query(src, &[("v", version), ("cb", token)])))
        })
        .collect();

    for (id, busted) in targets {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            if let Node::Element(element) = node.value() {
                set_attr(element, "src", busted);
            }
        }
    }

    fragment.root_element().inner_html()
}

impl HtmlPage {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }

    pub fn html(&self) -> &str {
        &self.source
    }
}

impl LivePage for HtmlPage {
    fn replace_stylesheet_href(&mut self, needle: &str, href: &str) -> usize {
        let Some(links) = selector(STYLESHEET_LINK) else {
            return 0;
        };
        let mut document = Html::parse_document(&self.source);
        let targets: Vec<_> = document
            .select(&links)
            .filter(|el| el.value().attr("href").is_some_and(|h| h.contains(needle)))
            .map(|el| el.id())
            .collect();
        if targets.is_empty() {
            return 0;
        }

        for id in &targets {
            if let Some(mut node) = document.tree.get_mut(*id) {
                if let Node::Element(element) = node.value() {
                    set_attr(element, "href", href.to_string());
                }
            }
        }
        self.source = document.html();
        targets.len()
    }

    fn append_stylesheet(&mut self, href: &str) {
        let Some(head) = selector("head") else {
            return;
        };
        let mut document = Html::parse_document(&self.source);
        let Some(id) = document.select(&head).next().map(|el| el.id()) else {
            return;
        };
        let marker = splice_marker(&self.source);
        if let Some(mut node) = document.tree.get_mut(id) {
            node.append(marker_node(&marker));
        }

        let link = format!("<link rel=\"stylesheet\" href=\"{}\">", escape_attr(href));
        self.source = document.html().replacen(&format!("<!--{}-->", marker), &link, 1);
    }

    fn replace_content(&mut self, root: &str, inner_html: &str) -> bool {
        let Some(root) = selector(root) else {
            return false;
        };
        let mut document = Html::parse_document(&self.source);
        let Some(id) = document.select(&root).next().map(|el| el.id()) else {
            return false;
        };
        let marker = splice_marker(&self.source);
        let Some(mut node) = document.tree.get_mut(id) else {
            return false;
        };
        while let Some(mut child) = node.first_child() {
            child.detach();
        }
        node.append(marker_node(&marker));

        self.source = document.html().replacen(&format!("<!--{}-->", marker), inner_html, 1);
        true
    }

    fn persist(&self) -> Result<(), SyncError> {
        let Some(path) = &self.output else {
            return Ok(());
        };
        let shown = path.display().to_string();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| SyncError::from_io(&e, "create overlay folder", &shown))?;
        }
        std::fs::write(path, &self.source)
            .map_err(|e| SyncError::from_io(&e, "write overlay page", &shown))?;
        tracing::info!("[Overlay] Patched page saved to {}", shown);
        Ok(())
    }
}

/// 스타일시트 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylesheetChange {
    Replaced(usize),
    Appended,
}

/// 오버레이 적용 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub stylesheet: Option<StylesheetChange>,
    pub content_replaced: bool,
}

pub struct OverlayApplier<F: AssetFetcher, P: LivePage> {
    fetcher: F,
    page: P,
    content_root: String,
}

impl<F: AssetFetcher, P: LivePage> OverlayApplier<F, P> {
    pub fn new(fetcher: F, page: P, content_root: &str) -> Self {
        Self {
            fetcher,
            page,
            content_root: content_root.to_string(),
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// 적용된 문서 보관
    pub fn persist(&self) -> Result<(), SyncError> {
        self.page.persist()
    }

    /// 스타일시트와 마크업을 현재 페이지에 적용
    ///
    /// content root가 어느 한쪽에 없으면 조용히 건너뜁니다.
    /// 마크업을 받지 못하거나 해시가 맞지 않으면 에러를 반환합니다.
    pub async fn apply_overlay(
        &mut self,
        files: &BTreeMap<String, FileDescriptor>,
        version: &VersionToken,
        cache_bust: Option<&str>,
    ) -> Result<OverlayReport, SyncError> {
        let mut report = OverlayReport::default();
        let millis = cache_bust_millis();

        if let Some(css) = files.get(FileRole::Stylesheet.rel_path()) {
            let href = with_query(&css.url, &[("v", version.as_str()), ("t", millis.as_str())]);
            let replaced = self
                .page
                .replace_stylesheet_href(FileRole::Stylesheet.rel_path(), &href);
            report.stylesheet = Some(if replaced > 0 {
                StylesheetChange::Replaced(replaced)
            } else {
                self.page.append_stylesheet(&href);
                StylesheetChange::Appended
            });
            tracing::info!("[Overlay] Stylesheet -> {}", href);
        }

        if let Some(markup) = files.get(FileRole::Markup.rel_path()) {
            let url = with_query(&markup.url, &[("v", version.as_str()), ("t", millis.as_str())]);
            let html = self.fetcher.fetch_text(&url).await?;
            verify_hash(FileRole::Markup.rel_path(), html.as_bytes(), markup.hash.as_deref())?;

            match extract_content(&html, &self.content_root) {
                Some(fresh) => {
                    let token = cache_bust.unwrap_or(millis.as_str());
                    let fresh = bust_asset_sources(&fresh, version.as_str(), token);
                    report.content_replaced = self.page.replace_content(&self.content_root, &fresh);
                    if !report.content_replaced {
                        tracing::warn!(
                            "[Overlay] Live page has no '{}', markup skipped",
                            self.content_root
                        );
                    }
                }
                None => {
                    tracing::warn!(
                        "[Overlay] Fetched markup has no '{}', markup skipped",
                        self.content_root
                    );
                }
            }
        }

        Ok(report)
    }
}
