use std::sync::Arc;

use derive_more::Display;

use crate::{
    buffer::{NonDet, Reply, ReplyOverflow, Request},
    config::Config,
    stats::Stats,
};

/// The request kinds the service recognizes, by first byte and exact length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `0`, 8 bytes. Replies with an 8-byte zero.
    NullRead,
    /// `1`, 8 bytes. Replies with a zeroed buffer of the configured size.
    NullWrite,
    /// `2`, exactly the configured size. Replies with an 8-byte zero.
    BulkWrite,
}

impl Shape {
    pub fn classify(request: Request<'_>, buffer_size: usize) -> Result<Self, Violation> {
        match (request.first_byte(), request.len()) {
            (Some(0), 8) => Ok(Self::NullRead),
            (Some(1), 8) => Ok(Self::NullWrite),
            (Some(2), len) if len == buffer_size => Ok(Self::BulkWrite),
            (first_byte, len) => Err(Violation::Malformed { first_byte, len }),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::NullWrite | Self::BulkWrite)
    }
}

/// A request or reply buffer the engine should never have delivered.
///
/// Reaching this means replicas may already disagree, so callers must not
/// treat it as a retryable fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Violation {
    #[display(fmt = "malformed request (first byte {:?}, length {})", first_byte, len)]
    Malformed { first_byte: Option<u8>, len: usize },
    #[display(fmt = "reply buffer capacity {} below required {}", capacity, required)]
    ReplyTooSmall { capacity: usize, required: usize },
}

impl std::error::Error for Violation {}

impl From<ReplyOverflow> for Violation {
    fn from(value: ReplyOverflow) -> Self {
        Self::ReplyTooSmall {
            capacity: value.capacity,
            required: value.len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    /// A write was delivered on the read-only path. The engine retries it
    /// through the ordered path.
    ReadOnlyRefused = -1,
    /// A violation under the reject policy.
    Rejected = -2,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    buffer_size: usize,
    stats: Arc<Stats>,
}

impl Service {
    pub fn new(config: &Config, stats: Arc<Stats>) -> Self {
        Self {
            buffer_size: config.buffer_size,
            stats,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Execute one agreed request.
    ///
    /// The reply depends only on the request bytes and the configured buffer
    /// size. `client_id` is bookkeeping only and the non-deterministic input is
    /// not consulted by this service. On `Err` the reply is left untouched.
    pub fn execute(
        &self,
        request: Request<'_>,
        reply: &mut Reply<'_>,
        _non_det: NonDet<'_>,
        client_id: u32,
        read_only: bool,
    ) -> Result<Status, Violation> {
        if reply.capacity() < self.buffer_size {
            return Err(Violation::ReplyTooSmall {
                capacity: reply.capacity(),
                required: self.buffer_size,
            });
        }
        let shape = Shape::classify(request, self.buffer_size)?;
        if read_only && shape.is_write() {
            self.stats.record_read_only_refused();
            return Ok(Status::ReadOnlyRefused);
        }
        match shape {
            // the whole configured size, so nothing from a previous reply leaks
            Shape::NullWrite => reply.zero_fill(self.buffer_size)?,
            Shape::NullRead | Shape::BulkWrite => reply.write(&0u64.to_ne_bytes())?,
        }
        self.stats
            .record_executed(shape, client_id, read_only, request.len(), reply.len());
        Ok(Status::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: usize = crate::config::DEFAULT_BUFFER_SIZE;

    fn service() -> Service {
        Service::new(&Config::default(), Default::default())
    }

    fn run(request: &[u8], read_only: bool) -> (Result<Status, Violation>, Vec<u8>, usize) {
        let mut contents = vec![0xa5; C];
        let mut reply = Reply::new(&mut contents);
        let result = service().execute(
            Request::new(request),
            &mut reply,
            NonDet::default(),
            0,
            read_only,
        );
        let len = reply.len();
        (result, contents, len)
    }

    #[test]
    fn null_write() {
        let (result, contents, len) = run(&[1, 0, 0, 0, 0, 0, 0, 0], false);
        assert_eq!(result, Ok(Status::Ok));
        assert_eq!(len, C);
        assert!(contents.iter().all(|&b| b == 0));
    }

    #[test]
    fn bulk_write() {
        let mut request = vec![0; C];
        request[0] = 2;
        let (result, contents, len) = run(&request, false);
        assert_eq!(result, Ok(Status::Ok));
        assert_eq!(len, 8);
        assert_eq!(contents[..8], 0u64.to_be_bytes());
        assert!(contents[8..].iter().all(|&b| b == 0xa5));
    }

    #[test]
    fn null_read() {
        let (result, contents, len) = run(&[0; 8], false);
        assert_eq!(result, Ok(Status::Ok));
        assert_eq!(len, 8);
        assert_eq!(contents[..8], [0; 8]);
    }

    #[test]
    fn short_null_write() {
        let (result, contents, len) = run(&[1, 0, 0], false);
        assert_eq!(
            result,
            Err(Violation::Malformed {
                first_byte: Some(1),
                len: 3
            })
        );
        assert_eq!(len, 0);
        assert!(contents.iter().all(|&b| b == 0xa5));
    }

    #[test]
    fn unknown_first_byte() {
        let (result, _, len) = run(&[5, 0, 0, 0, 0, 0, 0, 0], false);
        assert!(matches!(
            result,
            Err(Violation::Malformed {
                first_byte: Some(5),
                ..
            })
        ));
        assert_eq!(len, 0);
    }

    #[test]
    fn empty_request() {
        let (result, _, _) = run(&[], false);
        assert_eq!(
            result,
            Err(Violation::Malformed {
                first_byte: None,
                len: 0
            })
        );
    }

    #[test]
    fn read_only_write_refused() {
        let (result, contents, len) = run(&[1, 0, 0, 0, 0, 0, 0, 0], true);
        assert_eq!(result, Ok(Status::ReadOnlyRefused));
        assert_eq!(len, 0);
        assert!(contents.iter().all(|&b| b == 0xa5));

        let (result, _, len) = run(&[0; 8], true);
        assert_eq!(result, Ok(Status::Ok));
        assert_eq!(len, 8);
    }

    #[test]
    fn reply_buffer_too_small() {
        let mut contents = [0u8; 8];
        let mut reply = Reply::new(&mut contents);
        let result = service().execute(
            Request::new(&[0; 8]),
            &mut reply,
            NonDet::default(),
            0,
            false,
        );
        assert_eq!(
            result,
            Err(Violation::ReplyTooSmall {
                capacity: 8,
                required: C
            })
        );
    }

    #[test]
    fn configured_size() {
        let config = Config {
            buffer_size: 64,
            ..Default::default()
        };
        let stats = Arc::new(Stats::default());
        let service = Service::new(&config, stats.clone());
        let mut request = [0u8; 64];
        request[0] = 2;
        let mut contents = [0xffu8; 64];
        let mut reply = Reply::new(&mut contents);
        assert_eq!(
            service.execute(Request::new(&request), &mut reply, NonDet::default(), 9, false),
            Ok(Status::Ok)
        );
        // a default-sized bulk write no longer matches
        let mut request = vec![0u8; C];
        request[0] = 2;
        assert!(service
            .execute(Request::new(&request), &mut reply, NonDet::default(), 9, false)
            .is_err());
        assert_eq!(stats.snapshot().bulk_write, 1);
        assert_eq!(stats.snapshot().last_client, 9);
    }
}
