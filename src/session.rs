use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    buffer::{NonDet, Reply, Request},
    supervisor::Supervisor,
};

/// One agreed request as the consensus engine delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Upcall {
    pub request: Vec<u8>,
    pub non_det: Option<Vec<u8>>,
    pub client_id: u32,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outcome {
    pub status: i32,
    pub reply: Vec<u8>,
}

/// Engine side of the upcall queue. Cloned handles all feed the same ordered
/// queue.
#[derive(Debug, Clone)]
pub struct UpcallHandle(mpsc::UnboundedSender<(Upcall, oneshot::Sender<Outcome>)>);

/// Replica side of the upcall queue.
///
/// Not `Clone`: the single owner is what keeps at most one upcall in flight.
#[derive(Debug)]
pub struct UpcallSource(mpsc::UnboundedReceiver<(Upcall, oneshot::Sender<Outcome>)>);

pub fn upcall_channel() -> (UpcallHandle, UpcallSource) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UpcallHandle(sender), UpcallSource(receiver))
}

impl UpcallHandle {
    /// Queue `upcall` behind every earlier one and wait for its outcome.
    ///
    /// Fails if the session stopped before executing it.
    pub async fn submit(&self, upcall: Upcall) -> crate::Result<Outcome> {
        let (sender, receiver) = oneshot::channel();
        self.0
            .send((upcall, sender))
            .map_err(|_| crate::err!("upcall session stopped"))?;
        receiver
            .await
            .map_err(|_| crate::err!("upcall dropped without outcome"))
    }
}

/// Execute upcalls one at a time in the order they were submitted.
///
/// Returns `Ok` once `token` is cancelled or every handle is dropped. A
/// `Halt` from the supervisor ends the session with that error, leaving the
/// pending upcall without an outcome.
pub async fn upcall_session(
    mut supervisor: Supervisor,
    UpcallSource(mut source): UpcallSource,
    token: CancellationToken,
) -> crate::Result<()> {
    // allocated once and reused, as the engine does with its reply buffer
    let mut contents = vec![0; supervisor.service().buffer_size()];
    loop {
        let (upcall, outcome) = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = source.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };
        let mut reply = Reply::new(&mut contents);
        let status = supervisor.upcall(
            Request::new(&upcall.request),
            &mut reply,
            NonDet::new(upcall.non_det.as_deref()),
            upcall.client_id,
            upcall.read_only,
        )?;
        debug!(
            client_id = upcall.client_id,
            status = status.code(),
            len = reply.len(),
            "upcall"
        );
        outcome
            .send(Outcome {
                status: status.code(),
                reply: reply.as_bytes().to_vec(),
            })
            .map_err(|_| crate::err!("engine stopped waiting for outcome"))?
    }
    info!("upcall session stopped");
    Ok(())
}
