//! 청크 전송
//!
//! 브리지 한 번의 호출로 파일 전체를 보낼 수 없으므로 내용을 고정 크기 청크로 나눕니다.
//! 첫 청크는 truncate, 이후 청크는 append 모드로 **순서대로 하나씩** 기다리며 씁니다.
//! 실패한 첫 청크에서 전체 전송을 중단합니다.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::future::Future;

/// 텍스트 청크 기본 크기 (문자 수)
pub const TEXT_CHUNK_SIZE: usize = 30_000;
/// base64 청크 기본 크기 (문자 수)
pub const BINARY_CHUNK_SIZE: usize = 20_000;

/// 파일 열기 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

impl WriteMode {
    /// ExtendScript `File.open` 플래그
    pub fn open_flag(&self) -> &'static str {
        match self {
            WriteMode::Truncate => "w",
            WriteMode::Append => "a",
        }
    }
}

/// 청크 단위 파일 쓰기 능력 (호스트 브리지가 구현)
pub trait ChunkSink: Send + Sync {
    /// 브리지 자체를 사용할 수 있는지 (브라우저 미리보기에서는 false)
    fn is_available(&self) -> bool;

    /// 중간 세그먼트를 포함해 폴더 보장
    fn ensure_dir(&self, dir: &str) -> impl Future<Output = bool> + Send;

    /// 청크 하나 쓰기
    fn write_chunk(&self, path: &str, mode: WriteMode, chunk: &str) -> impl Future<Output = bool> + Send;

    /// base64 청크 하나를 바이너리로 이어 쓰기
    fn append_base64(&self, path: &str, chunk: &str) -> impl Future<Output = bool> + Send;
}

/// 문자 경계를 지키며 최대 `size`자씩 나누기
///
/// 빈 텍스트도 빈 청크 하나를 돌려주므로 대상 파일은 비워진 상태로 남습니다.
pub fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() || chunks.is_empty() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// 텍스트를 청크로 나누어 순서대로 기록
pub async fn write_text_in_chunks<S: ChunkSink>(
    sink: &S,
    target: &str,
    text: &str,
    chunk_size: usize,
) -> bool {
    let chunks = split_chunks(text, chunk_size);
    let total = chunks.len();
    let mut mode = WriteMode::Truncate;

    for (i, chunk) in chunks.into_iter().enumerate() {
        if !sink.write_chunk(target, mode, chunk).await {
            tracing::warn!("[Transfer] Chunk {}/{} failed for {}", i + 1, total, target);
            return false;
        }
        mode = WriteMode::Append;
    }

    tracing::debug!("[Transfer] Wrote {} ({} chunk(s))", target, total);
    true
}

/// 바이트를 base64로 인코딩해 청크 단위로 이어 쓰기 (대상 파일은 미리 생성되어 있어야 함)
pub async fn write_base64_in_chunks<S: ChunkSink>(
    sink: &S,
    target: &str,
    data: &[u8],
    chunk_size: usize,
) -> bool {
    let encoded = BASE64.encode(data);
    let chunks = split_chunks(&encoded, chunk_size);
    let total = chunks.len();

    for (i, chunk) in chunks.into_iter().enumerate() {
        if !sink.append_base64(target, chunk).await {
            tracing::warn!("[Transfer] Binary chunk {}/{} failed for {}", i + 1, total, target);
            return false;
        }
    }
    true
}
