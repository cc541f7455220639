//! Shared context-slot storage and per-session scope bookkeeping.
//!
//! Ambient values visible to a subtree live in a [`ContextStore`] keyed by
//! `(ScopeId, SessionId)`. The store is the only state shared between
//! concurrently live sessions; everything else (frame stack, output buffers,
//! scope stack) is exclusively owned by its session.

use crate::error::EngineError;
use crate::session::{IdAllocator, SessionId};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier of one registered scope definition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Clone of every registered scope's current value for one session, captured
/// at suspension time. Resumed sessions are seeded from a snapshot because
/// the shared slots may be restored or overwritten by continued sibling and
/// ancestor traversal before resumption completes.
#[derive(Clone, Debug)]
pub struct ScopeSnapshot {
    values: Vec<Value>,
}

/// Explicit key-value store for ambient values, keyed by scope definition and
/// session id. Owns the session id allocator so slot columns always cover the
/// highest id ever handed out.
#[derive(Debug, Default)]
pub(crate) struct ContextStore {
    ids: IdAllocator,
    defaults: Vec<Value>,
    /// `slots[scope][session]` is the current ambient value.
    slots: Vec<Vec<Value>>,
}

impl ContextStore {
    /// Register a scope definition with its pre-traversal default value.
    pub(crate) fn register_scope(&mut self, default: Value) -> ScopeId {
        let id = ScopeId(self.defaults.len() as u32);
        self.slots.push(vec![default.clone(); self.ids.capacity()]);
        self.defaults.push(default);
        id
    }

    /// Allocate a session id and expand every scope's slot column to cover
    /// it, seeding defaults.
    pub(crate) fn begin_session(&mut self) -> SessionId {
        let id = self.ids.allocate();
        for (column, default) in self.slots.iter_mut().zip(&self.defaults) {
            while column.len() <= id.index() {
                column.push(default.clone());
            }
        }
        id
    }

    /// Release a session id back to the pool.
    pub(crate) fn end_session(&mut self, id: SessionId) -> Result<(), EngineError> {
        self.ids.release(id)
    }

    pub(crate) fn get(&self, scope: ScopeId, session: SessionId) -> Result<&Value, EngineError> {
        self.slots
            .get(scope.index())
            .and_then(|column| column.get(session.index()))
            .ok_or_else(|| {
                EngineError::Protocol(format!(
                    "slot ({:?}, session {session}) is not initialized",
                    scope
                ))
            })
    }

    /// Write a slot, returning the value it held.
    pub(crate) fn set(
        &mut self,
        scope: ScopeId,
        session: SessionId,
        value: Value,
    ) -> Result<Value, EngineError> {
        let slot = self
            .slots
            .get_mut(scope.index())
            .and_then(|column| column.get_mut(session.index()))
            .ok_or_else(|| {
                EngineError::Protocol(format!(
                    "slot ({:?}, session {session}) is not initialized",
                    scope
                ))
            })?;
        Ok(std::mem::replace(slot, value))
    }

    /// Clone the current value of every scope for one session.
    pub(crate) fn snapshot(&self, session: SessionId) -> Result<ScopeSnapshot, EngineError> {
        let mut values = Vec::with_capacity(self.slots.len());
        for (index, column) in self.slots.iter().enumerate() {
            let value = column.get(session.index()).ok_or_else(|| {
                EngineError::Protocol(format!(
                    "snapshot of session {session} misses scope {index}"
                ))
            })?;
            values.push(value.clone());
        }
        Ok(ScopeSnapshot { values })
    }
}

/// Cloneable handle to a [`ContextStore`] shared by every session of one
/// serialization setup.
#[derive(Clone, Debug, Default)]
pub struct SharedContext {
    store: Arc<Mutex<ContextStore>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope definition with its pre-traversal default value.
    pub fn register_scope(&self, default: Value) -> ScopeId {
        self.lock().register_scope(default)
    }

    /// Current value of a slot. Mostly useful to observe restoration after a
    /// session ends.
    pub fn current(&self, scope: ScopeId, session: SessionId) -> Result<Value, EngineError> {
        self.lock().get(scope, session).cloned()
    }

    /// Build a private, single-session store for a resumed subtree, seeded
    /// with snapshot values under the given session id.
    pub(crate) fn from_snapshot(snapshot: &ScopeSnapshot, session: SessionId) -> Self {
        let mut store = ContextStore::default();
        for value in &snapshot.values {
            store.defaults.push(value.clone());
            store.slots.push(vec![value.clone(); session.index() + 1]);
        }
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ContextStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read view over the store handed to resolvers and encoders.
pub struct Ambient<'store> {
    store: &'store ContextStore,
    session: SessionId,
}

impl<'store> Ambient<'store> {
    pub(crate) fn new(store: &'store ContextStore, session: SessionId) -> Self {
        Self { store, session }
    }

    /// Current ambient value for a scope, as seen by the node being resolved.
    pub fn get(&self, scope: ScopeId) -> Result<&'store Value, EngineError> {
        self.store.get(scope, self.session)
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

/// Entry recording what a provider scope overrode and what to restore on
/// exit.
#[derive(Debug)]
struct ScopeEntry {
    scope: ScopeId,
    previous: Value,
}

/// Per-session LIFO of open provider scopes. Scopes nest, never interleave.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    entries: Vec<ScopeEntry>,
}

impl ScopeStack {
    /// Enter a provider scope: record the slot's current value and write the
    /// override.
    pub(crate) fn enter(
        &mut self,
        store: &mut ContextStore,
        session: SessionId,
        scope: ScopeId,
        value: Value,
    ) -> Result<(), EngineError> {
        let previous = store.set(scope, session, value)?;
        self.entries.push(ScopeEntry { scope, previous });
        Ok(())
    }

    /// Exit the innermost scope, restoring the recorded previous value. A
    /// mismatched owner is a hard error under `debug_assertions` and a
    /// warning otherwise; restoration still uses the recorded entry.
    pub(crate) fn exit(
        &mut self,
        store: &mut ContextStore,
        session: SessionId,
        scope: ScopeId,
    ) -> Result<(), EngineError> {
        let Some(entry) = self.entries.pop() else {
            return Err(EngineError::Protocol(format!(
                "scope exit of {scope:?} with an empty scope stack"
            )));
        };
        if entry.scope != scope {
            debug_assert!(
                false,
                "scope exit mismatch: expected {scope:?}, top of stack is {:?}",
                entry.scope
            );
            log::warn!(
                "scope: exit mismatch in session {session}, expected {:?} but top is {:?}",
                scope,
                entry.scope
            );
        }
        store.set(entry.scope, session, entry.previous)?;
        Ok(())
    }

    /// Restore every still-open scope, top to bottom. Used on early session
    /// termination so no shared slot keeps a stale override.
    pub(crate) fn drain(&mut self, store: &mut ContextStore, session: SessionId) {
        while let Some(entry) = self.entries.pop() {
            if let Err(error) = store.set(entry.scope, session, entry.previous) {
                log::warn!("scope: failed to restore {:?} while draining: {error}", entry.scope);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enter_and_exit_restore_the_slot() {
        let mut store = ContextStore::default();
        let scope = store.register_scope(json!("default"));
        let session = store.begin_session();
        let mut stack = ScopeStack::default();

        stack
            .enter(&mut store, session, scope, json!("override"))
            .expect("registered slot");
        assert_eq!(store.get(scope, session).expect("slot"), &json!("override"));

        stack.exit(&mut store, session, scope).expect("balanced exit");
        assert_eq!(store.get(scope, session).expect("slot"), &json!("default"));
        assert!(stack.is_empty());
    }

    #[test]
    fn nested_scopes_restore_in_reverse_order() {
        let mut store = ContextStore::default();
        let scope = store.register_scope(json!(0));
        let session = store.begin_session();
        let mut stack = ScopeStack::default();

        stack.enter(&mut store, session, scope, json!(1)).expect("enter");
        stack.enter(&mut store, session, scope, json!(2)).expect("enter");
        assert_eq!(store.get(scope, session).expect("slot"), &json!(2));

        stack.exit(&mut store, session, scope).expect("exit inner");
        assert_eq!(store.get(scope, session).expect("slot"), &json!(1));
        stack.exit(&mut store, session, scope).expect("exit outer");
        assert_eq!(store.get(scope, session).expect("slot"), &json!(0));
    }

    #[test]
    fn drain_restores_everything() {
        let mut store = ContextStore::default();
        let first = store.register_scope(json!("a"));
        let second = store.register_scope(json!("b"));
        let session = store.begin_session();
        let mut stack = ScopeStack::default();

        stack.enter(&mut store, session, first, json!("a2")).expect("enter");
        stack.enter(&mut store, session, second, json!("b2")).expect("enter");
        stack.drain(&mut store, session);

        assert_eq!(store.get(first, session).expect("slot"), &json!("a"));
        assert_eq!(store.get(second, session).expect("slot"), &json!("b"));
        assert!(stack.is_empty());
    }

    #[test]
    fn sessions_do_not_share_slots() {
        let mut store = ContextStore::default();
        let scope = store.register_scope(json!(null));
        let first = store.begin_session();
        let second = store.begin_session();

        store.set(scope, first, json!("first")).expect("set");
        assert_eq!(store.get(scope, second).expect("slot"), &json!(null));
    }

    #[test]
    fn unregistered_slot_is_a_protocol_error() {
        let mut store = ContextStore::default();
        let session = store.begin_session();
        let scope = store.register_scope(json!(null));
        // A scope registered after the session began still covers it.
        assert!(store.get(scope, session).is_ok());

        let foreign = ScopeId(7);
        assert!(matches!(
            store.get(foreign, session),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn snapshot_seeds_a_private_store() {
        let shared = SharedContext::new();
        let scope = shared.register_scope(json!("default"));
        let session = shared.lock().begin_session();
        shared
            .lock()
            .set(scope, session, json!("live"))
            .expect("set");

        let snapshot = shared.lock().snapshot(session).expect("snapshot");
        let private = SharedContext::from_snapshot(&snapshot, session);
        assert_eq!(
            private.current(scope, session).expect("slot"),
            json!("live")
        );

        // Mutating the original afterwards does not leak into the snapshot.
        shared
            .lock()
            .set(scope, session, json!("moved on"))
            .expect("set");
        assert_eq!(
            private.current(scope, session).expect("slot"),
            json!("live")
        );
    }
}
