mod cli;
mod config;

#[tokio::main]
async fn main() {
    // 로그는 stderr로: `check --json`의 stdout을 오염시키지 않음
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = cli::run_cli(args).await {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}
