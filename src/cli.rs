//! 동기화 CLI
//!
//! ## 사용법
//! ```text
//! darkpanel-sync check                    # 업데이트 확인
//! darkpanel-sync check --json             # JSON 출력
//! darkpanel-sync update                   # 확인 후 "Update now / Later" 질문
//! darkpanel-sync update --yes             # 질문 없이 적용
//! darkpanel-sync watch                    # check_interval_minutes 간격으로 반복 확인
//! darkpanel-sync status                   # 설치 버전, 설정 표시
//! darkpanel-sync reset                    # 패널 캐시 초기화 (버전 마커 유지)
//! darkpanel-sync reset --all              # 버전 마커까지 초기화
//! darkpanel-sync apply-preset <name>      # 프리셋을 선택된 레이어에 적용
//! darkpanel-sync bump <manifest.xml> <version.json>
//! darkpanel-sync config                   # 설정 표시
//! darkpanel-sync config set <key> <value> # 설정 변경
//! darkpanel-sync help                     # 도움말
//! ```
//!
//! ## 종료 코드 (check --json)
//! - `0`: 업데이트 있음
//! - `1`: 에러
//! - `2`: 업데이트 없음 (최신 상태)

use anyhow::Context;
use std::io::{BufRead, Write};
use std::path::Path;

use darkpanel_sync::bridge::{Bridge, PanelHost};
use darkpanel_sync::scheduler::{exit_code, report_to_json, CheckReport};
use darkpanel_sync::store::{reset_version_markers, KEY_CACHE_BUST, KEY_INSTALLED, KEY_LAST_APPLIED, PRESERVED_KEYS};
use darkpanel_sync::{
    CheckOutcome, FileRole, HtmlPage, HttpFetcher, InstalledState, JsonFileStore, KeyValueStore,
    OverlayApplier, PresetStager, Reconciler, ReloadKind, ScriptHost, SyncConfig, UpdateEvent,
    UpdateMode, VersionOracle, WriteProber,
};
use crate::config::{config_file_path, load_sync_config, set_config_value};

type PanelReconciler = Reconciler<HttpFetcher, Bridge<PanelHost>, HtmlPage, JsonFileStore>;

pub async fn run_cli(args: Vec<String>) -> anyhow::Result<()> {
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if args_ref.is_empty() || matches!(args_ref[0], "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    if matches!(args_ref[0], "--version" | "-V") {
        println!("darkpanel-sync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = load_sync_config()?;
    if cfg.manifest_url.trim().is_empty() && matches!(args_ref[0], "check" | "update" | "watch") {
        eprintln!("⚠ manifest_url이 설정되지 않았습니다.");
        eprintln!("  darkpanel-sync config set manifest_url <url>");
        std::process::exit(1);
    }

    match args_ref[0] {
        "check" => cmd_check(&cfg, &args_ref[1..]).await,
        "update" => cmd_update(&cfg, &args_ref[1..]).await,
        "watch" => cmd_watch(&cfg).await,
        "status" => cmd_status(&cfg),
        "reset" => cmd_reset(&cfg, &args_ref[1..]),
        "apply-preset" => cmd_apply_preset(&cfg, &args_ref[1..]).await,
        "bump" => cmd_bump(&args_ref[1..]),
        "config" => cmd_config(&cfg, &args_ref[1..]),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'darkpanel-sync help' for usage.");
            std::process::exit(1);
        }
    }
}

// ═══════════════════════════════════════════════════════
// 구성
// ═══════════════════════════════════════════════════════

/// 이전 오버레이 결과가 있으면 그 문서를, 없으면 설치된 페이지를 현재 페이지로 사용
///
/// 오버레이 결과는 항상 `overlay_dir`에 보관되며 설치 디렉터리는 건드리지 않습니다.
fn load_live_page(cfg: &SyncConfig) -> HtmlPage {
    let overlay_copy = cfg.overlay_dir().join(FileRole::Markup.rel_path());
    for path in [overlay_copy.clone(), cfg.page_path()] {
        match std::fs::read_to_string(&path) {
            Ok(html) => {
                tracing::debug!("[Cli] Live page: {}", path.display());
                return HtmlPage::new(html).with_output(overlay_copy);
            }
            Err(e) => tracing::debug!("[Cli] {} unreadable: {}", path.display(), e),
        }
    }
    tracing::warn!("[Cli] No live page found, overlay will start from an empty document");
    HtmlPage::new("").with_output(overlay_copy)
}

fn build_reconciler(cfg: &SyncConfig) -> anyhow::Result<PanelReconciler> {
    let fetcher = HttpFetcher::new(cfg.network_timeout_secs)?;
    let bridge = Bridge::for_panel(&cfg.bridge_command, cfg.bridge_timeout());
    let store = JsonFileStore::open(cfg.state_path())?;

    Ok(Reconciler::new(
        VersionOracle::new(fetcher.clone(), &cfg.manifest_url),
        WriteProber::new(fetcher.clone(), bridge, &cfg.install_root, cfg.text_chunk_size),
        OverlayApplier::new(fetcher, load_live_page(cfg), &cfg.content_root),
        store,
        &cfg.bundle_token()?,
        cfg.reload_after_overlay,
    ))
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

async fn cmd_check(cfg: &SyncConfig, flags: &[&str]) -> anyhow::Result<()> {
    let json_mode = flags.contains(&"--json");
    let mut reconciler = build_reconciler(cfg)?;
    let installed = reconciler.installed().clone();

    let report = if cfg.enabled {
        let outcome = reconciler.check().await;
        CheckReport::from_outcome(&installed, &outcome)
    } else {
        CheckReport::disabled(&installed)
    };

    if json_mode {
        println!("{}", report_to_json(&report));
        std::process::exit(exit_code(&report));
    }

    if let Some(err) = &report.error {
        eprintln!("✗ Check failed: {}", err);
        return Ok(());
    }

    match &report.remote_version {
        Some(remote) if report.update_available => {
            println!("📦 Update available: {} → {}", installed, remote);
            for file in &report.files {
                println!("  • {}", file);
            }
            println!();
            println!("💡 Run 'darkpanel-sync update' to apply.");
        }
        _ => println!("✓ Up to date ({}).", installed),
    }
    Ok(())
}

fn prompt_update_now(version: &str) -> bool {
    print!("New version {} is available. Update now? [y/N] (Later): ", version);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn cmd_update(cfg: &SyncConfig, flags: &[&str]) -> anyhow::Result<()> {
    if !cfg.enabled {
        println!("  Updater is disabled (config set enabled true).");
        return Ok(());
    }
    let assume_yes = flags.iter().any(|f| matches!(*f, "--yes" | "-y"));
    let mut reconciler = build_reconciler(cfg)?;
    let mut events = reconciler.subscribe();

    let version = match reconciler.check().await {
        CheckOutcome::UpdateAvailable { version, .. } => version,
        CheckOutcome::UpToDate { .. } => {
            println!("✓ Up to date ({}).", reconciler.installed());
            return Ok(());
        }
        CheckOutcome::CheckFailed { reason } => {
            eprintln!("✗ Check failed: {}", reason);
            return Ok(());
        }
    };

    if !assume_yes && !prompt_update_now(version.as_str()) {
        reconciler.decline()?;
        println!("  Later. {} will be offered again on the next check.", version);
        return Ok(());
    }

    let result = reconciler.confirm().await;
    while let Ok(event) = events.try_recv() {
        if let UpdateEvent::Status { message } = event {
            println!("  {}", message);
        }
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("✗ Update failed: {}", e.user_message());
            std::process::exit(1);
        }
    };

    match outcome.mode {
        UpdateMode::Installed => println!("✓ Installed {} to {}", outcome.version, cfg.install_root),
        UpdateMode::Overlay => {
            println!("✓ Applied {} as overlay (install directory unchanged)", outcome.version);
            if let Some(path) = reconciler.overlay().page().output() {
                println!("  Patched page: {}", path.display());
            }
        }
    }

    match outcome.reload {
        ReloadKind::Full => {
            println!("⏳ Restarting panel...");
            reconciler.prober().sink().request_panel_restart().await;
        }
        ReloadKind::Ui => println!("  Panel UI should re-initialize the replaced content."),
        ReloadKind::None => {}
    }
    Ok(())
}

async fn cmd_watch(cfg: &SyncConfig) -> anyhow::Result<()> {
    let schedule = cfg.scheduler();
    if !schedule.enabled {
        println!("  Updater is disabled (config set enabled true).");
        return Ok(());
    }
    let mut reconciler = build_reconciler(cfg)?;
    let mut ticker = tokio::time::interval(schedule.interval_duration());

    println!(
        "👀 Watching {} every {} minute(s). Press Ctrl+C to stop.",
        cfg.manifest_url,
        schedule.interval_minutes.max(1)
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let CheckOutcome::UpdateAvailable { version, .. } = reconciler.check().await {
                    println!("UPDATE_AVAILABLE|{}|{}", reconciler.installed(), version);
                    // 알림만 하고 다음 체크에서 다시 제시
                    reconciler.decline()?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[Cli] Watch stopped");
                return Ok(());
            }
        }
    }
}

fn cmd_status(cfg: &SyncConfig) -> anyhow::Result<()> {
    let store = JsonFileStore::open(cfg.state_path())?;
    let installed = InstalledState::load(&store, &cfg.bundle_token()?);
    let host = PanelHost::from_config(&cfg.bridge_command, cfg.bridge_timeout());

    println!("📋 Panel Sync Status");
    println!("─────────────────────────────────────────────");
    println!("  Installed version: {}", installed.version);
    println!("  Bundle version:    {}", cfg.bundle_version);
    println!("  Installed marker:  {}", store.get(KEY_INSTALLED).as_deref().unwrap_or("-"));
    println!("  Last applied:      {}", store.get(KEY_LAST_APPLIED).as_deref().unwrap_or("-"));
    println!("  Cache bust:        {}", store.get(KEY_CACHE_BUST).as_deref().unwrap_or("-"));
    println!("  State file:        {}", store.path().display());
    println!("  Install root:      {}", display_or_dash(&cfg.install_root));
    println!("  Host bridge:       {}", if host.is_available() { "available" } else { "unavailable" });
    println!("  Updater enabled:   {}", cfg.enabled);
    Ok(())
}

fn cmd_reset(cfg: &SyncConfig, flags: &[&str]) -> anyhow::Result<()> {
    let all = flags.contains(&"--all");
    let mut store = JsonFileStore::open(cfg.state_path())?;

    store.clear_preserving(&PRESERVED_KEYS)?;
    if all {
        reset_version_markers(&mut store)?;
        let overlay_copy = cfg.overlay_dir().join(FileRole::Markup.rel_path());
        if overlay_copy.exists() {
            std::fs::remove_file(&overlay_copy)
                .with_context(|| format!("failed to remove {}", overlay_copy.display()))?;
        }
        println!("✓ Panel state reset (version markers removed).");
    } else {
        println!("✓ Panel cache cleared (favorites, settings and version kept).");
    }
    Ok(())
}

async fn cmd_apply_preset(cfg: &SyncConfig, args: &[&str]) -> anyhow::Result<()> {
    let Some(name) = args.first() else {
        anyhow::bail!("Usage: darkpanel-sync apply-preset <name>");
    };
    let base_url = cfg.preset_base_url.as_deref().unwrap_or_default();

    let stager = PresetStager::new(
        HttpFetcher::new(cfg.network_timeout_secs)?,
        Bridge::for_panel(&cfg.bridge_command, cfg.bridge_timeout()),
        base_url,
        cfg.binary_chunk_size,
    );

    println!("⏳ Applying {}...", name);
    match stager.stage_and_apply(name).await {
        Ok(count) => {
            println!("✓ Applied to {} layer(s).", count);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}", e.user_message());
            std::process::exit(1);
        }
    }
}

fn cmd_bump(args: &[&str]) -> anyhow::Result<()> {
    let (Some(manifest), Some(version_json)) = (args.first(), args.get(1)) else {
        anyhow::bail!("Usage: darkpanel-sync bump <manifest.xml> <version.json>");
    };
    let next = bump_release(Path::new(manifest), Path::new(version_json))?;
    println!("✓ Bundle version bumped to {}", next);
    Ok(())
}

/// 매니페스트의 번들 버전을 올리고 게시용 version.json 기록
pub fn bump_release(manifest: &Path, version_json: &Path) -> anyhow::Result<String> {
    let xml = std::fs::read_to_string(manifest)
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let (updated, next) = darkpanel_sync::version::bump_bundle_attribute(&xml)
        .ok_or_else(|| anyhow::anyhow!("ExtensionBundleVersion not found in {}", manifest.display()))?;

    std::fs::write(manifest, updated)
        .with_context(|| format!("failed to write {}", manifest.display()))?;
    let json = serde_json::to_string_pretty(&serde_json::json!({ "version": next }))?;
    std::fs::write(version_json, json)
        .with_context(|| format!("failed to write {}", version_json.display()))?;

    tracing::info!("[Cli] Bumped {} to {}", manifest.display(), next);
    Ok(next)
}

fn cmd_config(cfg: &SyncConfig, args: &[&str]) -> anyhow::Result<()> {
    if args.first() == Some(&"set") {
        let (Some(key), Some(value)) = (args.get(1), args.get(2)) else {
            anyhow::bail!("Usage: darkpanel-sync config set <key> <value>");
        };
        set_config_value(key, value)?;
        println!("✓ {} = {}", key, value);
        return Ok(());
    }

    println!("⚙ Config: {}", config_file_path().display());
    println!("─────────────────────────────────────────────");
    println!("  enabled                = {}", cfg.enabled);
    println!("  manifest_url           = {}", display_or_dash(&cfg.manifest_url));
    println!("  bundle_version         = {}", cfg.bundle_version);
    println!("  install_root           = {}", display_or_dash(&cfg.install_root));
    println!("  page_path              = {}", cfg.page_path().display());
    println!("  overlay_dir            = {}", cfg.overlay_dir().display());
    println!("  content_root           = {}", cfg.content_root);
    println!("  text_chunk_size        = {}", cfg.text_chunk_size);
    println!("  binary_chunk_size      = {}", cfg.binary_chunk_size);
    println!("  network_timeout_secs   = {}", cfg.network_timeout_secs);
    println!("  bridge_timeout_secs    = {}", cfg.bridge_timeout_secs);
    println!("  reload_after_overlay   = {}", cfg.reload_after_overlay);
    println!("  check_interval_minutes = {}", cfg.check_interval_minutes);
    println!("  bridge_command         = {}", display_or_dash(&cfg.bridge_command.join(" ")));
    println!("  preset_base_url        = {}", cfg.preset_base_url.as_deref().unwrap_or("-"));
    println!("  state_file             = {}", cfg.state_path().display());
    Ok(())
}

fn display_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn print_help() {
    println!("darkpanel-sync {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("  darkpanel-sync <command> [options]");
    println!();
    println!("COMMANDS:");
    println!("  check [--json]                 Check the remote manifest");
    println!("  update [--yes]                 Check and apply (install or overlay)");
    println!("  watch                          Re-check every check_interval_minutes");
    println!("  status                         Show installed version and state");
    println!("  reset [--all]                  Clear panel cache (--all: version markers too)");
    println!("  apply-preset <name>            Stage a preset in the host and apply it");
    println!("  bump <manifest.xml> <version.json>");
    println!("                                 Increment ExtensionBundleVersion for a release");
    println!("  config                         Show configuration");
    println!("  config set <key> <value>       Change a configuration value");
    println!("  help                           Show this help");
    println!();
    println!("EXIT CODES (check --json):");
    println!("  0  update available");
    println!("  1  error");
    println!("  2  up to date");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_release_updates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.xml");
        let version_json = dir.path().join("version.json");
        std::fs::write(
            &manifest,
            r#"<ExtensionManifest ExtensionBundleId="com.darkpanel" ExtensionBundleVersion="1.4"/>"#,
        )
        .unwrap();

        assert_eq!(bump_release(&manifest, &version_json).unwrap(), "1.5");
        assert!(std::fs::read_to_string(&manifest).unwrap().contains(r#"ExtensionBundleVersion="1.5""#));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&version_json).unwrap()).unwrap();
        assert_eq!(json["version"], "1.5");
    }

    #[test]
    fn bump_release_without_attribute_fails_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.xml");
        let version_json = dir.path().join("version.json");
        std::fs::write(&manifest, "<ExtensionManifest/>").unwrap();

        assert!(bump_release(&manifest, &version_json).is_err());
        assert!(!version_json.exists());
    }

    #[test]
    fn live_page_prefers_previous_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("ext");
        let overlay = dir.path().join("overlay");
        std::fs::create_dir_all(&install).unwrap();
        std::fs::create_dir_all(&overlay).unwrap();
        std::fs::write(install.join("index.html"), "<main>installed</main>").unwrap();

        let cfg = SyncConfig {
            install_root: install.display().to_string(),
            overlay_dir: Some(overlay.display().to_string()),
            ..Default::default()
        };
        let page = load_live_page(&cfg);
        assert_eq!(page.html(), "<main>installed</main>");
        assert_eq!(page.output(), Some(&overlay.join("index.html")));

        std::fs::write(overlay.join("index.html"), "<main>patched</main>").unwrap();
        assert_eq!(load_live_page(&cfg).html(), "<main>patched</main>");
    }
}
