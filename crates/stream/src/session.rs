//! Session identifiers and their allocator.

use crate::error::EngineError;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Identifier of one live traversal session, used as an index into shared
/// context-slot storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u32);

impl SessionId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for SessionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}

/// Hands out small integer ids, reusing released ones before growing the
/// range. Reuse keeps shared slot storage bounded by the peak number of
/// concurrently live sessions rather than the total started over the process
/// lifetime.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    /// `live[i]` is true while id `i` belongs to a session.
    live: Vec<bool>,
    free: Vec<u32>,
}

impl IdAllocator {
    /// Take an id not currently held by any live session.
    pub(crate) fn allocate(&mut self) -> SessionId {
        if let Some(id) = self.free.pop() {
            self.live[id as usize] = true;
            return SessionId(id);
        }
        let id = self.live.len() as u32;
        self.live.push(true);
        SessionId(id)
    }

    /// Return an id to the free pool. Double-release and releasing an id that
    /// was never allocated are both protocol violations.
    pub(crate) fn release(&mut self, id: SessionId) -> Result<(), EngineError> {
        match self.live.get_mut(id.index()) {
            Some(slot) if *slot => {
                *slot = false;
                self.free.push(id.0);
                Ok(())
            }
            Some(_) => Err(EngineError::Protocol(format!(
                "session id {id} released twice"
            ))),
            None => Err(EngineError::Protocol(format!(
                "session id {id} was never allocated"
            ))),
        }
    }

    /// Number of ids handed out so far, released or not. Shared slot columns
    /// are sized against this.
    pub(crate) fn capacity(&self) -> usize {
        self.live.len()
    }
}
