use std::sync::Arc;

use derive_more::Display;
use tracing::{error, warn};

use crate::{
    buffer::{NonDet, Reply, Request},
    config::{Config, InvalidRequestPolicy},
    service::{Service, Status, Violation},
    stats::Stats,
};

/// The replica detected a protocol violation and must stop executing.
///
/// Whoever owns the process decides how to terminate, normally by exiting with
/// `exit_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(fmt = "Invalid request: {}", violation)]
pub struct Halt {
    pub violation: Violation,
    pub exit_code: i32,
}

impl std::error::Error for Halt {}

/// Applies the invalid-request policy on top of a `Service`.
#[derive(Debug)]
pub struct Supervisor {
    service: Service,
    stats: Arc<Stats>,
    policy: InvalidRequestPolicy,
    exit_code: i32,
    halted: Option<Violation>,
}

impl Supervisor {
    pub fn new(config: &Config, stats: Arc<Stats>) -> Self {
        Self {
            service: Service::new(config, stats.clone()),
            stats,
            policy: config.invalid_request,
            exit_code: config.violation_exit_code,
            halted: None,
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn halted(&self) -> Option<Violation> {
        self.halted
    }

    pub fn upcall(
        &mut self,
        request: Request<'_>,
        reply: &mut Reply<'_>,
        non_det: NonDet<'_>,
        client_id: u32,
        read_only: bool,
    ) -> Result<Status, Halt> {
        if let Some(violation) = self.halted {
            return Err(self.halt(violation));
        }
        match self
            .service
            .execute(request, reply, non_det, client_id, read_only)
        {
            Ok(status) => Ok(status),
            Err(violation) => {
                self.stats.record_violation();
                match self.policy {
                    InvalidRequestPolicy::Halt => {
                        error!(client_id, read_only, "Invalid request: {violation}");
                        self.halted = Some(violation);
                        Err(self.halt(violation))
                    }
                    InvalidRequestPolicy::Reject => {
                        warn!(client_id, read_only, "rejected invalid request: {violation}");
                        Ok(Status::Rejected)
                    }
                }
            }
        }
    }

    fn halt(&self, violation: Violation) -> Halt {
        Halt {
            violation,
            exit_code: self.exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: usize = crate::config::DEFAULT_BUFFER_SIZE;

    fn upcall(supervisor: &mut Supervisor, request: &[u8]) -> (Result<Status, Halt>, usize) {
        let mut contents = vec![0u8; C];
        let mut reply = Reply::new(&mut contents);
        let result = supervisor.upcall(Request::new(request), &mut reply, NonDet::default(), 1, false);
        (result, reply.len())
    }

    #[test]
    fn halt_is_sticky() {
        let stats = Arc::new(Stats::default());
        let mut supervisor = Supervisor::new(&Config::default(), stats.clone());
        assert_eq!(upcall(&mut supervisor, &[0; 8]).0, Ok(Status::Ok));

        let (result, len) = upcall(&mut supervisor, &[5, 0, 0, 0, 0, 0, 0, 0]);
        let halt = result.unwrap_err();
        assert_eq!(halt.exit_code, 255);
        assert_eq!(len, 0);
        assert!(halt.to_string().starts_with("Invalid request"));

        // well-formed requests are no longer executed
        let (result, len) = upcall(&mut supervisor, &[0; 8]);
        assert_eq!(result, Err(halt));
        assert_eq!(len, 0);
        assert_eq!(stats.snapshot().null_read, 1);
        assert_eq!(stats.snapshot().violation, 1);
    }

    #[test]
    fn reject_continues() {
        let config = Config {
            invalid_request: InvalidRequestPolicy::Reject,
            ..Default::default()
        };
        let stats = Arc::new(Stats::default());
        let mut supervisor = Supervisor::new(&config, stats.clone());
        let (result, len) = upcall(&mut supervisor, &[1, 0, 0]);
        assert_eq!(result, Ok(Status::Rejected));
        assert_eq!(len, 0);
        assert_eq!(supervisor.halted(), None);
        assert_eq!(upcall(&mut supervisor, &[1, 0, 0, 0, 0, 0, 0, 0]), (Ok(Status::Ok), C));
        assert_eq!(stats.snapshot().violation, 1);
    }
}
