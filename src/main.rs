use std::{
    io::{ErrorKind, Write},
    path::PathBuf,
    sync::Arc,
};

use bft_simple::{
    diagnostics::install_shutdown_diagnostics,
    session::{upcall_channel, upcall_session, Upcall, UpcallHandle},
    stats::JsonStats,
    task::BackgroundMonitor,
    Config, Halt, Stats, StatsSource, Supervisor,
};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

const MAX_FRAME: u32 = 16 << 20;

/// Replica-side executor for the simple service.
///
/// Reads length-prefixed bincode upcalls from stdin and writes outcomes to
/// stdout in the same framing. Runs until SIGINT or SIGTERM, which dump
/// statistics to stdout and exit.
#[derive(Debug, Parser)]
struct Cli {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dump statistics as one JSON line on shutdown.
    #[arg(long)]
    stats_json: bool,
}

#[tokio::main]
async fn main() -> bft_simple::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    tracing::info!(?config, "starting replica");

    let mut monitor = BackgroundMonitor::default();
    let spawner = monitor.spawner();
    let stats = Arc::new(Stats::default());
    let dump: Arc<dyn StatsSource> = if cli.stats_json {
        Arc::new(JsonStats(stats.clone()))
    } else {
        stats.clone()
    };
    // the signal stops the session only, the exit itself is the watcher's
    let session_token = spawner.token().child_token();
    install_shutdown_diagnostics(dump, session_token.clone(), config.diagnostic_exit_code)?;

    let (handle, source) = upcall_channel();
    spawner.spawn(upcall_session(
        Supervisor::new(&config, stats),
        source,
        session_token,
    ));
    spawner.spawn(stdin_session(handle));

    if let Err(err) = monitor.wait().await {
        if let Some(halt) = err.downcast_ref::<Halt>() {
            eprintln!("{halt}");
            std::process::exit(halt.exit_code)
        }
        eprintln!("{err}");
        eprintln!("{}", err.backtrace());
        return Err(err);
    }
    // the root token is never cancelled, a clean stop of every task leaves
    // the process to the signal watcher
    std::future::pending().await
}

async fn stdin_session(handle: UpcallHandle) -> bft_simple::Result<()> {
    let mut stdin = tokio::io::stdin();
    loop {
        let len = match stdin.read_u32_le().await {
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };
        if len > MAX_FRAME {
            bft_simple::bail!("upcall frame of {len} bytes exceeds {MAX_FRAME}")
        }
        let mut buf = vec![0; len as usize];
        stdin.read_exact(&mut buf).await?;
        let upcall = bincode::deserialize::<Upcall>(&buf)?;
        // the upcall session reports its own failure
        let Ok(outcome) = handle.submit(upcall).await else {
            return Ok(());
        };
        let payload = bincode::serialize(&outcome)?;
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        // whole frame under the std stdout lock, shared with the statistics dump
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&frame)?;
            stdout.flush()
        })
        .await??
    }
    tracing::info!("engine input closed, idle until SIGINT or SIGTERM");
    Ok(())
}
