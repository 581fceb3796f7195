use std::path::Path;

use serde::{Deserialize, Serialize};

/// Size shared by the bulk-write request and the null-write reply.
///
/// Every replica must run with the same value, otherwise replicas disagree on
/// which requests are well-formed.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

const MAX_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRequestPolicy {
    /// Stop executing and let the process exit.
    #[default]
    Halt,
    /// Refuse the request with a non-zero status and keep going.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub buffer_size: usize,
    pub invalid_request: InvalidRequestPolicy,
    pub violation_exit_code: i32,
    pub diagnostic_exit_code: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            invalid_request: Default::default(),
            // `exit(-1)` as observed by the parent process
            violation_exit_code: 255,
            diagnostic_exit_code: 0,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config = serde_json::from_str::<Self>(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| crate::err!("read config {}: {err}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer_size < 8 {
            crate::bail!("buffer size {} cannot hold an 8-byte reply", self.buffer_size)
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            crate::bail!(
                "buffer size {} exceeds limit {MAX_BUFFER_SIZE}",
                self.buffer_size
            )
        }
        Ok(())
    }
}
