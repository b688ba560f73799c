//! Request-scoped log accumulation.
//!
//! A [`RequestLogStore`] collects deferred [`LogMessage`]s and a few side
//! values (request id, salt key) for the lifetime of one request. Handlers
//! reach it through a cloneable [`RequestContext`]; whoever finishes the
//! request calls [`RequestLogStore::pop_all`] once and emits the result.

use crate::caller::format_location;
use crate::env;
use crate::record::Severity;
use std::collections::HashMap;
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard};

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// A message captured during a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// `dir/file.rs:line` of the logging call.
    pub caller: String,
    pub severity: Severity,
    pub message: String,
}

/// Concurrency-safe slot set bound to one request.
///
/// The message sequence and the auxiliary slots each sit behind their own
/// lock, so appends from fan-out tasks sharing the store never lose entries
/// and a [`pop_all`](Self::pop_all) sees every append that completed before
/// it and none that start after.
#[derive(Debug, Default)]
pub struct RequestLogStore {
    messages: Mutex<Vec<LogMessage>>,
    slots: Mutex<HashMap<String, String>>,
}

impl RequestLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` with the caller's source location.
    ///
    /// Debug messages are skipped while `APP_ENV` is `production`; the
    /// variable is read on every call.
    #[track_caller]
    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        if severity == Severity::Debug && env::is_production() {
            return;
        }
        self.append_at(Location::caller(), severity, message.into());
    }

    /// Record `message` against an explicit call site.
    pub fn append_at(&self, location: &Location<'_>, severity: Severity, message: String) {
        let entry = LogMessage {
            caller: format_location(location),
            severity,
            message,
        };
        lock(&self.messages).push(entry);
    }

    /// Take every accumulated message, leaving the store empty.
    pub fn pop_all(&self) -> Vec<LogMessage> {
        std::mem::take(&mut *lock(&self.messages))
    }

    /// Number of messages currently held.
    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.slots).get(key).cloned()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        lock(&self.slots).insert(key.into(), value.into())
    }
}

// A panic while holding one of these locks cannot leave the data half
// written, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-request execution context that may carry a [`RequestLogStore`].
///
/// Cloning shares the store. The store is released when the last clone is
/// dropped, normally at the end of the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    store: Option<Arc<RequestLogStore>>,
}

impl RequestContext {
    /// A context without a store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fresh store unless one is already bound.
    ///
    /// Re-binding keeps the existing store, so nested layers that each call
    /// `bind` never discard messages accumulated further up.
    pub fn bind(self) -> Self {
        if self.store.is_some() {
            return self;
        }
        RequestContext {
            store: Some(Arc::new(RequestLogStore::new())),
        }
    }

    /// The bound store, or `None` when [`bind`](Self::bind) was never called.
    pub fn extract(&self) -> Option<&Arc<RequestLogStore>> {
        self.store.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.store.is_some()
    }

    /// Run `fut` with this context available through [`current`](Self::current).
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// The context installed by the innermost enclosing [`scope`](Self::scope).
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }
}
