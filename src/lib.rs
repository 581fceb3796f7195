pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod service;
pub mod session;
pub mod stats;
pub mod supervisor;
pub mod task;

pub use anyhow::{anyhow as err, bail, Error, Result};

pub use crate::buffer::{NonDet, Reply, Request};
pub use crate::config::{Config, InvalidRequestPolicy};
pub use crate::service::{Service, Shape, Status, Violation};
pub use crate::stats::{Stats, StatsSource};
pub use crate::supervisor::{Halt, Supervisor};
