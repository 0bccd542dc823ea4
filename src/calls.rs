//! RPC call table.
//!
//! Tracks in-flight calls by id for response correlation and holds calls
//! issued before authorization so they can be replayed, in original order,
//! the moment the connection is authorized. Ids increase monotonically and
//! are unique within one engine instance.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, VoicewireError};

/// Who receives a call's outcome.
pub(crate) enum Completion {
    /// The host's `call` future.
    Host(oneshot::Sender<Result<Value>>),
    /// The engine's own authorization handshake.
    Auth,
}

/// An in-flight call awaiting its correlated response.
pub(crate) struct PendingCall {
    pub method: String,
    pub completion: Completion,
}

/// A call issued before the connection was authorized.
pub(crate) struct QueuedCall {
    pub method: String,
    pub params: Value,
    pub completion: Completion,
}

/// Call table: id source, in-flight map, deferral queue.
pub(crate) struct CallTable {
    next_id: i64,
    inflight: HashMap<i64, PendingCall>,
    deferred: Vec<QueuedCall>,
}

impl CallTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            inflight: HashMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Allocate the next call id.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Track a call that has been written to the wire.
    pub fn register(&mut self, id: i64, method: String, completion: Completion) {
        self.inflight.insert(id, PendingCall { method, completion });
    }

    /// Queue a call for replay after the next successful authorization.
    pub fn defer(&mut self, call: QueuedCall) {
        self.deferred.push(call);
    }

    /// Take the deferred calls in original submission order.
    pub fn take_deferred(&mut self) -> Vec<QueuedCall> {
        std::mem::take(&mut self.deferred)
    }

    /// Remove and return the call matching a response id, if any.
    pub fn remove(&mut self, id: i64) -> Option<PendingCall> {
        self.inflight.remove(&id)
    }

    /// Fail the calls already written to a connection that just died.
    /// Deferred calls survive: they replay after the next authorization.
    pub fn fail_inflight(&mut self, err: impl Fn() -> VoicewireError) {
        for (_, call) in self.inflight.drain() {
            if let Completion::Host(tx) = call.completion {
                let _ = tx.send(Err(err()));
            }
        }
    }

    /// Fail every in-flight and deferred call. Auth completions are
    /// dropped; the engine owns that path directly.
    pub fn fail_all(&mut self, err: impl Fn() -> VoicewireError) {
        self.fail_inflight(&err);
        for call in self.deferred.drain(..) {
            if let Completion::Host(tx) = call.completion {
                let _ = tx.send(Err(err()));
            }
        }
    }
}
