//! Dump statistics and exit on SIGINT/SIGTERM.
//!
//! The only work done in signal context is tokio's own handler, which writes
//! to a self-pipe. Statistics are rendered on an ordinary task.

use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
};

use derive_more::Display;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::stats::StatsSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Signal {
    #[display(fmt = "SIGINT")]
    Interrupt,
    #[display(fmt = "SIGTERM")]
    Terminate,
}

/// Registered SIGINT and SIGTERM listeners.
///
/// Once registered, the default disposition of both signals is replaced for
/// the rest of the process.
#[derive(Debug)]
pub struct SignalWatch {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

impl SignalWatch {
    /// Must be called within a tokio runtime.
    pub fn register() -> crate::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    pub async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => Signal::Interrupt,
            _ = self.terminate.recv() => Signal::Terminate,
        }
    }
}

pub struct ShutdownDiagnostics {
    stats: Arc<dyn StatsSource>,
    token: CancellationToken,
    exit_code: i32,
}

impl std::fmt::Debug for ShutdownDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownDiagnostics")
            .field("token", &self.token)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

impl ShutdownDiagnostics {
    pub fn new(stats: Arc<dyn StatsSource>, token: CancellationToken, exit_code: i32) -> Self {
        Self {
            stats,
            token,
            exit_code,
        }
    }

    /// Stop the upcall session, dump statistics into `out` and return the
    /// status the process should exit with.
    ///
    /// `token` should only scope the upcall session. Cancelling a token that
    /// lets `main` return would race the exit below. A failed dump is logged
    /// and not retried.
    pub fn on_signal(&self, signal: Signal, out: &mut dyn Write) -> i32 {
        info!(%signal, "diagnostic shutdown");
        self.token.cancel();
        if let Err(err) = self.stats.print_stats(out) {
            warn!("statistics dump failed: {err}")
        }
        self.exit_code
    }

    pub async fn run(self, mut watch: SignalWatch) {
        let signal = watch.recv().await;
        // reply frames are written under the same lock, so the dump never
        // lands inside one
        let code = self.on_signal(signal, &mut std::io::stdout().lock());
        // skip every remaining shutdown path of the replica
        std::process::exit(code)
    }
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the dump-then-exit handler for SIGINT and SIGTERM.
///
/// Must be called within a tokio runtime. Returns `false` without doing
/// anything if the handler is already installed in this process.
pub fn install_shutdown_diagnostics(
    stats: Arc<dyn StatsSource>,
    token: CancellationToken,
    exit_code: i32,
) -> crate::Result<bool> {
    if INSTALLED.swap(true, SeqCst) {
        return Ok(false);
    }
    let watch = match SignalWatch::register() {
        Ok(watch) => watch,
        Err(err) => {
            INSTALLED.store(false, SeqCst);
            return Err(err);
        }
    };
    let diagnostics = ShutdownDiagnostics::new(stats, token, exit_code);
    tokio::spawn(diagnostics.run(watch));
    Ok(true)
}
