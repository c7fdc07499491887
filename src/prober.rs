//! 설치 디렉터리 쓰기 시도 (Write-Capability Prober)
//!
//! 매니페스트의 허용 목록 파일을 내려받아 브리지를 통해 실제 설치 경로에 씁니다.
//! 결과는 `true`(전부 기록) / `false`(능력 없음 또는 실패) 두 가지뿐이며, 이 경계 밖으로
//! 에러를 던지지 않습니다. 이미 기록된 파일은 되돌리지 않습니다.

use std::collections::BTreeMap;

use crate::fetch::{cache_bust_millis, verify_hash, with_query, AssetFetcher};
use crate::manifest::{known_files, FileDescriptor, FileRole};
use crate::transfer::{write_text_in_chunks, ChunkSink};

pub struct WriteProber<F: AssetFetcher, S: ChunkSink> {
    fetcher: F,
    sink: S,
    /// 호스트 기준 설치 루트 (예: `C:/Users/.../CEP/extensions/darkpanel`)
    install_root: String,
    chunk_size: usize,
}

impl<F: AssetFetcher, S: ChunkSink> WriteProber<F, S> {
    pub fn new(fetcher: F, sink: S, install_root: &str, chunk_size: usize) -> Self {
        Self {
            fetcher,
            sink,
            install_root: install_root.trim_end_matches(['/', '\\']).to_string(),
            chunk_size,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn host_path(&self, rel: &str) -> String {
        format!("{}/{}", self.install_root, rel)
    }

    /// 모든 허용 파일을 설치 경로에 기록: 하나라도 실패하면 즉시 `false`
    pub async fn try_install(&self, files: &BTreeMap<String, FileDescriptor>) -> bool {
        if !self.sink.is_available() {
            tracing::info!("[Prober] Host bridge unavailable, install skipped");
            return false;
        }
        if self.install_root.is_empty() {
            tracing::warn!("[Prober] Install root is not configured");
            return false;
        }

        for (role, descriptor) in known_files(files) {
            if !self.install_one(role, descriptor).await {
                return false;
            }
        }

        tracing::info!("[Prober] All files written to {}", self.install_root);
        true
    }

    async fn install_one(&self, role: FileRole, descriptor: &FileDescriptor) -> bool {
        let rel = role.rel_path();
        let bust = cache_bust_millis();
        let url = with_query(&descriptor.url, &[("v", bust.as_str())]);

        let text = match self.fetcher.fetch_text(&url).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[Prober] Fetch failed for {}: {}", rel, e);
                return false;
            }
        };

        if let Err(e) = verify_hash(rel, text.as_bytes(), descriptor.hash.as_deref()) {
            tracing::warn!("[Prober] {}", e);
            return false;
        }

        if let Some(dir) = role.subdirectory() {
            if !self.sink.ensure_dir(&self.host_path(dir)).await {
                tracing::warn!("[Prober] Could not create folder {}", dir);
                return false;
            }
        }

        let target = self.host_path(rel);
        if !write_text_in_chunks(&self.sink, &target, &text, self.chunk_size).await {
            return false;
        }

        tracing::info!("[Prober] Installed {} ({} chars)", rel, text.chars().count());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::sha256_hex;
    use crate::testing::{FakeFetcher, MemorySink, SinkCall};

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, FileDescriptor> {
        entries
            .iter()
            .map(|(path, url)| {
                (path.to_string(), FileDescriptor { url: url.to_string(), hash: None })
            })
            .collect()
    }

    #[tokio::test]
    async fn writes_every_known_file() {
        let fetcher = FakeFetcher::new();
        fetcher.serve("https://cdn/index.html", "<main>v2</main>");
        fetcher.serve("https://cdn/style.css", "body{}");
        let sink = MemorySink::new();
        let prober = WriteProber::new(fetcher.clone(), sink.clone(), "/ext/", 30_000);

        let ok = prober
            .try_install(&files(&[
                ("index.html", "https://cdn/index.html"),
                ("css/style.css", "https://cdn/style.css"),
            ]))
            .await;

        assert!(ok);
        assert_eq!(sink.file("/ext/index.html").as_deref(), Some("<main>v2</main>"));
        assert_eq!(sink.file("/ext/css/style.css").as_deref(), Some("body{}"));
        assert!(sink.calls().contains(&SinkCall::EnsureDir("/ext/css".into())));
        assert!(fetcher.requested().iter().all(|u| u.contains("?v=")));
    }

    #[tokio::test]
    async fn unknown_paths_are_skipped() {
        let fetcher = FakeFetcher::new();
        fetcher.serve("https://cdn/main.js", "init();");
        let sink = MemorySink::new();
        let prober = WriteProber::new(fetcher.clone(), sink.clone(), "/ext", 30_000);

        let ok = prober
            .try_install(&files(&[
                ("js/main.js", "https://cdn/main.js"),
                ("img/logo.png", "https://cdn/logo.png"),
            ]))
            .await;

        assert!(ok);
        assert_eq!(fetcher.requested().len(), 1);
        assert!(sink.file("/ext/img/logo.png").is_none());
    }

    #[tokio::test]
    async fn folder_failure_aborts_before_write() {
        let fetcher = FakeFetcher::new();
        fetcher.serve("https://cdn/manifest.xml", "<ExtensionManifest/>");
        let sink = MemorySink::new();
        sink.fail_dir("/ext/CSXS");
        let prober = WriteProber::new(fetcher, sink.clone(), "/ext", 30_000);

        let ok = prober
            .try_install(&files(&[("CSXS/manifest.xml", "https://cdn/manifest.xml")]))
            .await;

        assert!(!ok);
        assert!(!sink.calls().iter().any(|c| matches!(c, SinkCall::Write { .. })));
    }

    #[tokio::test]
    async fn unavailable_bridge_fetches_nothing() {
        let fetcher = FakeFetcher::new();
        let prober = WriteProber::new(fetcher.clone(), MemorySink::unavailable(), "/ext", 30_000);

        assert!(!prober.try_install(&files(&[("index.html", "https://cdn/index.html")])).await);
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_returns_false() {
        let fetcher = FakeFetcher::new();
        fetcher.fail("https://cdn/index.html", 500);
        let sink = MemorySink::new();
        let prober = WriteProber::new(fetcher, sink.clone(), "/ext", 30_000);

        assert!(!prober.try_install(&files(&[("index.html", "https://cdn/index.html")])).await);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn hash_mismatch_returns_false() {
        let fetcher = FakeFetcher::new();
        fetcher.serve("https://cdn/index.html", "tampered");
        let sink = MemorySink::new();
        let prober = WriteProber::new(fetcher, sink.clone(), "/ext", 30_000);

        let mut manifest_files = files(&[("index.html", "https://cdn/index.html")]);
        manifest_files.get_mut("index.html").unwrap().hash = Some(sha256_hex(b"original"));

        assert!(!prober.try_install(&manifest_files).await);
        assert!(sink.file("/ext/index.html").is_none());
    }

    #[tokio::test]
    async fn partial_install_is_not_rolled_back() {
        let fetcher = FakeFetcher::new();
        fetcher.serve("https://cdn/index.html", "new markup");
        fetcher.serve("https://cdn/main.js", "new script");
        let sink = MemorySink::new();
        sink.seed_file("/ext/js/main.js", "old script");
        // 1번째 쓰기(index.html)는 성공, 2번째(js/main.js)는 실패
        sink.fail_write_number(2);
        let prober = WriteProber::new(fetcher, sink.clone(), "/ext", 30_000);

        let ok = prober
            .try_install(&files(&[
                ("index.html", "https://cdn/index.html"),
                ("js/main.js", "https://cdn/main.js"),
            ]))
            .await;

        assert!(!ok);
        assert_eq!(sink.file("/ext/index.html").as_deref(), Some("new markup"));
        assert_eq!(sink.file("/ext/js/main.js").as_deref(), Some("old script"));
    }
}
