use std::{
    io::Write,
    sync::{
        atomic::{AtomicU64, Ordering::Relaxed},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::service::Shape;

/// Renders performance counters for the diagnostic dump.
///
/// Implementations are read from the signal watcher task while upcalls keep
/// running, so they should only read atomics or other lock-free state.
pub trait StatsSource
where
    Self: Send + Sync + 'static,
{
    fn print_stats(&self, out: &mut dyn Write) -> std::io::Result<()>;
}

#[derive(Debug, Default)]
pub struct Stats {
    null_read: AtomicU64,
    null_write: AtomicU64,
    bulk_write: AtomicU64,
    read_only: AtomicU64,
    read_only_refused: AtomicU64,
    violation: AtomicU64,
    request_bytes: AtomicU64,
    reply_bytes: AtomicU64,
    last_client: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub null_read: u64,
    pub null_write: u64,
    pub bulk_write: u64,
    pub read_only: u64,
    pub read_only_refused: u64,
    pub violation: u64,
    pub request_bytes: u64,
    pub reply_bytes: u64,
    pub last_client: u64,
}

impl Snapshot {
    pub fn executed(&self) -> u64 {
        self.null_read + self.null_write + self.bulk_write
    }
}

impl Stats {
    pub fn record_executed(
        &self,
        shape: Shape,
        client_id: u32,
        read_only: bool,
        request_len: usize,
        reply_len: usize,
    ) {
        let executed = match shape {
            Shape::NullRead => &self.null_read,
            Shape::NullWrite => &self.null_write,
            Shape::BulkWrite => &self.bulk_write,
        };
        executed.fetch_add(1, Relaxed);
        if read_only {
            self.read_only.fetch_add(1, Relaxed);
        }
        self.request_bytes.fetch_add(request_len as _, Relaxed);
        self.reply_bytes.fetch_add(reply_len as _, Relaxed);
        self.last_client.store(client_id as _, Relaxed);
    }

    pub fn record_read_only_refused(&self) {
        self.read_only_refused.fetch_add(1, Relaxed);
    }

    pub fn record_violation(&self) {
        self.violation.fetch_add(1, Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            null_read: self.null_read.load(Relaxed),
            null_write: self.null_write.load(Relaxed),
            bulk_write: self.bulk_write.load(Relaxed),
            read_only: self.read_only.load(Relaxed),
            read_only_refused: self.read_only_refused.load(Relaxed),
            violation: self.violation.load(Relaxed),
            request_bytes: self.request_bytes.load(Relaxed),
            reply_bytes: self.reply_bytes.load(Relaxed),
            last_client: self.last_client.load(Relaxed),
        }
    }
}

impl StatsSource for Stats {
    fn print_stats(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let s = self.snapshot();
        writeln!(out, "executed {}", s.executed())?;
        writeln!(out, "  null read {}", s.null_read)?;
        writeln!(out, "  null write {}", s.null_write)?;
        writeln!(out, "  bulk write {}", s.bulk_write)?;
        writeln!(out, "read only {}", s.read_only)?;
        writeln!(out, "read only refused {}", s.read_only_refused)?;
        writeln!(out, "invalid request {}", s.violation)?;
        writeln!(out, "request bytes {}", s.request_bytes)?;
        writeln!(out, "reply bytes {}", s.reply_bytes)?;
        writeln!(out, "last client {}", s.last_client)?;
        out.flush()
    }
}

/// Renders the same counters as a single JSON line.
#[derive(Debug, Clone)]
pub struct JsonStats(pub Arc<Stats>);

impl StatsSource for JsonStats {
    fn print_stats(&self, out: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer(&mut *out, &self.0.snapshot())?;
        writeln!(out)?;
        out.flush()
    }
}
