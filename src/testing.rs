//! 테스트 공용 가짜 구현 (fetcher, sink, host)

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::bridge::{ScriptCallback, ScriptHost};
use crate::error::SyncError;
use crate::fetch::AssetFetcher;
use crate::transfer::{ChunkSink, WriteMode};

// ═══════════════════════════════════════════════════════
// FakeFetcher
// ═══════════════════════════════════════════════════════

/// URL(쿼리 제외) → 응답 맵. 요청된 전체 URL을 기록합니다.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    responses: Arc<Mutex<BTreeMap<String, Result<String, SyncError>>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn fail(&self, url: &str, status_code: u16) -> &Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            Err(SyncError::Http { status_code, url: url.to_string() }),
        );
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Result<String, SyncError> {
        self.requested.lock().unwrap().push(url.to_string());
        let base = url.split('?').next().unwrap_or(url);
        self.responses
            .lock()
            .unwrap()
            .get(base)
            .cloned()
            .unwrap_or_else(|| Err(SyncError::Http { status_code: 404, url: url.to_string() }))
    }
}

impl AssetFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SyncError> {
        self.lookup(url)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        self.lookup(url).map(String::into_bytes)
    }
}

// ═══════════════════════════════════════════════════════
// MemorySink
// ═══════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    EnsureDir(String),
    Write { path: String, mode: WriteMode, len: usize },
    Append { path: String, len: usize },
}

#[derive(Default)]
struct SinkState {
    files: BTreeMap<String, String>,
    calls: Vec<SinkCall>,
    writes: usize,
    fail_write_number: Option<usize>,
    fail_dirs: Vec<String>,
}

/// 메모리 파일시스템으로 동작하는 청크 싱크
#[derive(Clone)]
pub struct MemorySink {
    available: bool,
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn seed_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    /// n번째(1부터) write_chunk 호출을 실패시킴
    pub fn fail_write_number(&self, n: usize) {
        self.state.lock().unwrap().fail_write_number = Some(n);
    }

    pub fn fail_dir(&self, dir: &str) {
        self.state.lock().unwrap().fail_dirs.push(dir.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl ChunkSink for MemorySink {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn ensure_dir(&self, dir: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SinkCall::EnsureDir(dir.to_string()));
        !state.fail_dirs.iter().any(|d| d == dir)
    }

    async fn write_chunk(&self, path: &str, mode: WriteMode, chunk: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        state.calls.push(SinkCall::Write {
            path: path.to_string(),
            mode,
            len: chunk.chars().count(),
        });
        if state.fail_write_number == Some(state.writes) {
            return false;
        }
        let entry = state.files.entry(path.to_string()).or_default();
        if mode == WriteMode::Truncate {
            entry.clear();
        }
        entry.push_str(chunk);
        true
    }

    async fn append_base64(&self, path: &str, chunk: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SinkCall::Append {
            path: path.to_string(),
            len: chunk.len(),
        });
        state.files.entry(path.to_string()).or_default().push_str(chunk);
        true
    }
}

// ═══════════════════════════════════════════════════════
// ScriptedHost
// ═══════════════════════════════════════════════════════

/// 미리 정한 응답을 순서대로 콜백하는 호스트 (`silent`은 콜백을 보관만 함)
#[derive(Clone)]
pub struct ScriptedHost {
    replies: Arc<Mutex<VecDeque<String>>>,
    scripts: Arc<Mutex<Vec<String>>>,
    parked: Arc<Mutex<Vec<ScriptCallback>>>,
    silent: bool,
}

impl ScriptedHost {
    pub fn replying<const N: usize>(replies: [&str; N]) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.iter().map(|s| s.to_string()).collect())),
            scripts: Arc::new(Mutex::new(Vec::new())),
            parked: Arc::new(Mutex::new(Vec::new())),
            silent: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::replying([])
        }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

impl ScriptHost for ScriptedHost {
    fn is_available(&self) -> bool {
        true
    }

    fn eval_script(&self, source: String, callback: ScriptCallback) {
        self.scripts.lock().unwrap().push(source);
        if self.silent {
            self.parked.lock().unwrap().push(callback);
            return;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "OK".to_string());
        callback(reply);
    }
}
