//! 호스트 스크립트 브리지
//!
//! ## 통신 방식
//! 호스트는 `evalScript(source, callback(result))` 형태의 콜백 API만 제공합니다.
//! [`Bridge`]는 이를 타임아웃이 있는 future로 감싸고, 경계에서 곧바로
//! `"OK"` / `"ERR:..."` 문자열 규약을 [`BridgeReply`]로 해석합니다.
//!
//! ## 호스트 구현
//! - [`CommandHost`]: 외부 스크립트 실행기 프로세스에 stdin으로 스크립트 전달, stdout을 결과로 사용
//! - [`UnavailableHost`]: 브리지가 없는 환경 (브라우저 미리보기)
//! - [`PanelHost`]: 설정(`bridge_command`)에 따라 위 둘 중 하나

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::script;
use crate::transfer::{ChunkSink, WriteMode};

/// 스크립트 결과 콜백
pub type ScriptCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// 콜백 기반 호스트 스크립트 실행기
pub trait ScriptHost: Send + Sync {
    /// 호스트가 존재하는지
    fn is_available(&self) -> bool;

    /// 스크립트를 실행하고 결과 문자열로 콜백을 정확히 한 번 호출
    fn eval_script(&self, source: String, callback: ScriptCallback);
}

/// 해석된 브리지 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeReply {
    Ok,
    Failed(String),
}

impl BridgeReply {
    /// `"OK"`만 성공, `ERR:`/`Error:`는 실패 메시지, 그 밖의 값도 실패
    pub fn decode(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "OK" {
            return BridgeReply::Ok;
        }
        match strip_error_marker(raw) {
            Some(message) => BridgeReply::Failed(message.to_string()),
            None => BridgeReply::Failed(format!("unrecognized reply: {:?}", raw)),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BridgeReply::Ok)
    }
}

fn strip_error_marker(raw: &str) -> Option<&str> {
    raw.strip_prefix("ERR:")
        .or_else(|| raw.strip_prefix("Error:"))
        .map(str::trim)
}

/// 값 반환형 스크립트 결과 해석 (예: 생성된 파일 경로, `Success:3`)
pub fn decode_value(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty reply".to_string());
    }
    match strip_error_marker(raw) {
        Some(message) => Err(message.to_string()),
        None => Ok(raw.to_string()),
    }
}

/// 콜백 API를 async로 감싼 브리지
pub struct Bridge<H: ScriptHost> {
    host: H,
    timeout: Duration,
}

impl<H: ScriptHost> Bridge<H> {
    pub fn new(host: H, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// 스크립트를 실행하고 원본 결과 문자열을 반환
    pub async fn eval_raw(&self, operation: &str, source: String) -> Result<String, SyncError> {
        if !self.host.is_available() {
            return Err(SyncError::BridgeUnavailable);
        }

        let (tx, rx) = oneshot::channel::<String>();
        self.host.eval_script(
            source,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(SyncError::Bridge {
                operation: operation.to_string(),
                message: "host dropped the callback".to_string(),
            }),
            Err(_) => Err(SyncError::Timeout {
                operation: format!("bridge {}", operation),
                duration_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// `"OK"`/`"ERR:"` 규약 스크립트 실행: 에러는 모두 `Failed`로 접힘
    pub async fn eval(&self, operation: &str, source: String) -> BridgeReply {
        match self.eval_raw(operation, source).await {
            Ok(raw) => BridgeReply::decode(&raw),
            Err(e) => BridgeReply::Failed(e.to_string()),
        }
    }

    /// 값 반환형 스크립트 실행
    pub async fn eval_value(&self, operation: &str, source: String) -> Result<String, SyncError> {
        let raw = self.eval_raw(operation, source).await?;
        decode_value(&raw).map_err(|message| SyncError::Bridge {
            operation: operation.to_string(),
            message,
        })
    }

    /// 패널 재시작 요청 (결과는 로그만)
    pub async fn request_panel_restart(&self) {
        match self.eval("restart panel", script::restart_panel()).await {
            BridgeReply::Ok => tracing::info!("[Bridge] Panel restart scheduled"),
            BridgeReply::Failed(msg) => tracing::warn!("[Bridge] Panel restart failed: {}", msg),
        }
    }
}

impl<H: ScriptHost> ChunkSink for Bridge<H> {
    fn is_available(&self) -> bool {
        self.host.is_available()
    }

    async fn ensure_dir(&self, dir: &str) -> bool {
        match self.eval("ensure folder", script::ensure_folder(dir)).await {
            BridgeReply::Ok => true,
            BridgeReply::Failed(msg) => {
                tracing::warn!("[Bridge] ensure folder {} failed: {}", dir, msg);
                false
            }
        }
    }

    async fn write_chunk(&self, path: &str, mode: WriteMode, chunk: &str) -> bool {
        match self.eval("write chunk", script::write_text_chunk(path, mode, chunk)).await {
            BridgeReply::Ok => true,
            BridgeReply::Failed(msg) => {
                tracing::warn!("[Bridge] write {} ({:?}) failed: {}", path, mode, msg);
                false
            }
        }
    }

    async fn append_base64(&self, path: &str, chunk: &str) -> bool {
        match self.eval("append chunk", script::append_base64_chunk(path, chunk)).await {
            BridgeReply::Ok => true,
            BridgeReply::Failed(msg) => {
                tracing::warn!("[Bridge] append {} failed: {}", path, msg);
                false
            }
        }
    }
}

/// 브리지가 없는 환경
#[derive(Debug, Clone, Default)]
pub struct UnavailableHost;

impl ScriptHost for UnavailableHost {
    fn is_available(&self) -> bool {
        false
    }

    fn eval_script(&self, _source: String, callback: ScriptCallback) {
        callback("ERR:host bridge not available".to_string());
    }
}

/// 외부 스크립트 실행기 프로세스
///
/// `program args...`를 실행하고 스크립트를 stdin으로 전달합니다.
/// stdout(공백 제거)이 결과 문자열이 됩니다. 호출마다 새 프로세스를 띄우므로
/// 이전 호출 상태에 의존하지 않습니다.
///
/// 실행기가 `deadline` 안에 끝나지 않으면 프로세스를 종료하고 회수한 뒤에야
/// `ERR:` 응답을 돌려줍니다. 포기한 쓰기가 나중에 디스크에 반영되는 일은 없습니다.
#[derive(Debug, Clone)]
pub struct CommandHost {
    program: String,
    args: Vec<String>,
    deadline: Duration,
}

impl CommandHost {
    /// argv가 비어 있으면 None
    pub fn from_argv(argv: &[String], deadline: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            deadline,
        })
    }

    async fn run(self, source: String) -> Result<String, String> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.program, e))?;

        let exchanged = tokio::time::timeout(self.deadline, Self::exchange(&mut child, source)).await;
        match exchanged {
            Ok(result) => result,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("[Bridge] Failed to stop {}: {}", self.program, e);
                }
                Err(format!(
                    "script runner timed out after {}ms",
                    self.deadline.as_millis()
                ))
            }
        }
    }

    async fn exchange(child: &mut tokio::process::Child, source: String) -> Result<String, String> {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| format!("failed to send script: {}", e))?;
        }

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|e| format!("failed to read reply: {}", e))?;
        }

        let status = child.wait().await.map_err(|e| e.to_string())?;
        if !status.success() {
            return Err(format!("script runner exited with {}", status));
        }
        Ok(output.trim().to_string())
    }
}

impl ScriptHost for CommandHost {
    fn is_available(&self) -> bool {
        true
    }

    fn eval_script(&self, source: String, callback: ScriptCallback) {
        let host = self.clone();
        tokio::spawn(async move {
            let reply = match host.run(source).await {
                Ok(out) => out,
                Err(e) => format!("ERR:{}", e),
            };
            callback(reply);
        });
    }
}

/// 설정으로 결정되는 호스트 (`bridge_command`가 비어 있으면 브리지 없음)
#[derive(Debug, Clone)]
pub enum PanelHost {
    Command(CommandHost),
    Unavailable(UnavailableHost),
}

impl PanelHost {
    pub fn from_config(bridge_command: &[String], deadline: Duration) -> Self {
        match CommandHost::from_argv(bridge_command, deadline) {
            Some(host) => PanelHost::Command(host),
            None => PanelHost::Unavailable(UnavailableHost),
        }
    }
}

impl ScriptHost for PanelHost {
    fn is_available(&self) -> bool {
        match self {
            PanelHost::Command(host) => host.is_available(),
            PanelHost::Unavailable(host) => host.is_available(),
        }
    }

    fn eval_script(&self, source: String, callback: ScriptCallback) {
        match self {
            PanelHost::Command(host) => host.eval_script(source, callback),
            PanelHost::Unavailable(host) => host.eval_script(source, callback),
        }
    }
}

/// 실행기 종료 후 응답이 도착할 때까지 브리지가 더 기다리는 시간
const HOST_KILL_GRACE: Duration = Duration::from_secs(1);

impl Bridge<PanelHost> {
    /// 설정의 `bridge_command`로 브리지 구성
    ///
    /// 실행기는 `timeout`에 종료되고, 브리지는 그 응답을 받을 수 있도록 조금 더 기다립니다.
    pub fn for_panel(bridge_command: &[String], timeout: Duration) -> Self {
        Self::new(
            PanelHost::from_config(bridge_command, timeout),
            timeout + HOST_KILL_GRACE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHost;

    const DEADLINE: Duration = Duration::from_secs(5);

    #[test]
    fn panel_host_follows_bridge_command() {
        assert!(!PanelHost::from_config(&[], DEADLINE).is_available());
        assert!(PanelHost::from_config(&["estk-runner".to_string()], DEADLINE).is_available());
    }

    #[test]
    fn decode_recognizes_both_shapes() {
        assert_eq!(BridgeReply::decode("OK"), BridgeReply::Ok);
        assert_eq!(BridgeReply::decode(" OK\n"), BridgeReply::Ok);
        assert_eq!(BridgeReply::decode("ERR:disk full"), BridgeReply::Failed("disk full".into()));
        assert_eq!(BridgeReply::decode("Error: nope"), BridgeReply::Failed("nope".into()));
    }

    #[test]
    fn decode_treats_anything_else_as_failure() {
        for raw in ["", "ok", "true", "undefined", "Success:1"] {
            assert!(!BridgeReply::decode(raw).is_ok(), "{:?}", raw);
        }
    }

    #[test]
    fn decode_value_shapes() {
        assert_eq!(decode_value("/tmp/p.ffx").unwrap(), "/tmp/p.ffx");
        assert_eq!(decode_value("ERR:locked").unwrap_err(), "locked");
        assert!(decode_value("  ").is_err());
    }

    #[tokio::test]
    async fn unavailable_host_short_circuits() {
        let bridge = Bridge::new(UnavailableHost, Duration::from_secs(1));
        let err = bridge.eval_raw("ping", "1".into()).await.unwrap_err();
        assert_eq!(err, SyncError::BridgeUnavailable);
        assert!(!ChunkSink::is_available(&bridge));
    }

    #[tokio::test]
    async fn callback_result_resolves_future() {
        let host = ScriptedHost::replying(["OK", "ERR:denied"]);
        let bridge = Bridge::new(host.clone(), Duration::from_secs(1));

        assert!(bridge.ensure_dir("/ext/css").await);
        assert!(!bridge.write_chunk("/ext/css/style.css", WriteMode::Truncate, "a{}").await);

        let sent = host.scripts();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("ensureFolder(\"/ext/css\")"));
        assert!(sent[1].contains("f.open(\"w\")"));
    }

    #[tokio::test]
    async fn silent_host_times_out() {
        let host = ScriptedHost::silent();
        let bridge = Bridge::new(host, Duration::from_millis(50));
        let err = bridge.eval_raw("write chunk", "x".into()).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
        assert!(!bridge.write_chunk("/a", WriteMode::Append, "x").await);
    }

    #[tokio::test]
    async fn restart_request_sends_one_script_and_tolerates_failure() {
        let host = ScriptedHost::replying(["ERR:no app"]);
        let bridge = Bridge::new(host.clone(), Duration::from_secs(1));
        bridge.request_panel_restart().await;

        let sent = host.scripts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("scheduleTask"));
    }

    #[test]
    fn command_host_requires_program() {
        assert!(CommandHost::from_argv(&[], DEADLINE).is_none());
        assert!(CommandHost::from_argv(&["".to_string()], DEADLINE).is_none());
        assert!(CommandHost::from_argv(
            &["estk-runner".to_string(), "--stdin".to_string()],
            DEADLINE
        )
        .is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_host_round_trip_through_process() {
        // `cat`은 stdin을 그대로 돌려주므로 스크립트 본문이 곧 응답
        let host = CommandHost::from_argv(&["cat".to_string()], DEADLINE).unwrap();
        let bridge = Bridge::new(host, Duration::from_secs(5));
        let raw = bridge.eval_raw("echo", "OK".into()).await.unwrap();
        assert_eq!(raw, "OK");
        let reply = bridge.eval("echo", "ERR:boom".into()).await;
        assert_eq!(reply, BridgeReply::Failed("boom".into()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_runner_is_killed_before_it_writes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("written");
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat >/dev/null; sleep 1; touch '{}'; echo OK", marker.display()),
        ];
        let bridge = Bridge::for_panel(&argv, Duration::from_millis(200));

        let reply = bridge.eval("write chunk", "x".into()).await;
        assert!(matches!(reply, BridgeReply::Failed(ref msg) if msg.contains("timed out")), "{:?}", reply);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn sub_second_timeouts_keep_their_unit() {
        let err = SyncError::Timeout { operation: "bridge ping".into(), duration_ms: 200 };
        assert_eq!(err.to_string(), "Timeout after 200ms: bridge ping");
    }
}
