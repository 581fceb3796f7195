use std::future::Future;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Spawns replica tasks whose errors are reported to a `BackgroundMonitor`.
///
/// Every task is aborted once the shared token is cancelled, either because a
/// sibling failed or because a diagnostic shutdown started.
#[derive(Debug, Clone)]
pub struct BackgroundSpawner {
    err_sender: UnboundedSender<crate::Error>,
    token: CancellationToken,
}

impl BackgroundSpawner {
    pub fn spawn(&self, task: impl Future<Output = crate::Result<()>> + Send + 'static) {
        let err_sender = self.err_sender.clone();
        let token = self.token.clone();
        let mut task = tokio::spawn(task);
        tokio::spawn(async move {
            let result = tokio::select! {
                result = &mut task => result,
                () = token.cancelled() => {
                    task.abort();
                    task.await
                }
            };
            let err = match result {
                Err(err) if !err.is_cancelled() => err.into(),
                Ok(Err(err)) => err,
                _ => return,
            };
            // the monitor may be gone already if the replica is exiting
            let _ = err_sender.send(err);
        });
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[derive(Debug)]
pub struct BackgroundMonitor {
    err_sender: UnboundedSender<crate::Error>,
    err_receiver: UnboundedReceiver<crate::Error>,
    token: CancellationToken,
}

impl BackgroundMonitor {
    pub fn new(token: CancellationToken) -> Self {
        let (err_sender, err_receiver) = unbounded_channel();
        Self {
            err_sender,
            err_receiver,
            token,
        }
    }

    pub fn spawner(&self) -> BackgroundSpawner {
        BackgroundSpawner {
            err_sender: self.err_sender.clone(),
            token: self.token.clone(),
        }
    }

    /// Resolve on the first task error, or with `Ok` once the token is
    /// cancelled.
    pub async fn wait(&mut self) -> crate::Result<()> {
        tokio::select! {
            err = self.err_receiver.recv() => match err {
                Some(err) => {
                    self.token.cancel();
                    Err(err)
                }
                None => Ok(()),
            },
            () = self.token.cancelled() => Ok(()),
        }
    }
}

impl Default for BackgroundMonitor {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
