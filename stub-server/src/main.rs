use anyhow::Context;
use clap::Parser;
use std::io::IsTerminal;
use http_test_util::stub::{router, HitCounter};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Local target for trying out `loadgen` against a known endpoint.
#[derive(Parser)]
#[command(name = "stub-server", version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "STUB_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stub_server=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let _g = rt.enter();
    rt.block_on(run_server(&args.addr))
}

async fn run_server(addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let hits = HitCounter::new();
    let app = router(hits.clone());
    tracing::info!("stub target listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server failed")?;
    tracing::info!("served {} requests", hits.get());
    Ok(())
}
