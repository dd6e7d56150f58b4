//! Local session
//!
//! Bookkeeping handle for hosts served by the local executor. There is no
//! network transport behind it; closing only flips the liveness flag.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::{Connection, ConnectionError, ConnectionResult};

/// Session for a host whose commands run on the control node
#[derive(Debug)]
pub struct LocalSession {
    identifier: String,
    open: AtomicBool,
}

impl LocalSession {
    /// Open a new local session for the given host name
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Connection for LocalSession {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_alive(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> ConnectionResult<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            trace!(host = %self.identifier, "Local session closed");
            Ok(())
        } else {
            Err(ConnectionError::Closed)
        }
    }
}
