//! Logging helpers that write into the [`RequestLogStore`](crate::store::RequestLogStore) bound to a
//! [`RequestContext`].
//!
//! Every helper takes `Option<&RequestContext>`. Without a context, or with
//! one that has no store, the message is emitted immediately through
//! `tracing` instead of being deferred, so nothing is lost.

use crate::env;
use crate::record::Severity;
use crate::store::RequestContext;
use std::panic::Location;
use uuid::Uuid;

/// Slot holding the request identifier.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Slot holding the per-request salt key.
pub const SALT_KEY: &str = "salt_key";

/// Append `message` to the request's store, or emit it right away when
/// there is no store to append to.
#[track_caller]
pub fn log(ctx: Option<&RequestContext>, severity: Severity, message: impl Into<String>) {
    if severity == Severity::Debug && env::is_production() {
        return;
    }

    let message = message.into();
    let Some(ctx) = ctx else {
        emit_now(severity, &message, "nil context");
        return;
    };
    match ctx.extract() {
        Some(store) => store.append_at(Location::caller(), severity, message),
        None => emit_now(severity, &message, "logger not found in context"),
    }
}

#[track_caller]
pub fn debug(ctx: Option<&RequestContext>, message: impl Into<String>) {
    log(ctx, Severity::Debug, message);
}

#[track_caller]
pub fn info(ctx: Option<&RequestContext>, message: impl Into<String>) {
    log(ctx, Severity::Info, message);
}

#[track_caller]
pub fn warn(ctx: Option<&RequestContext>, message: impl Into<String>) {
    log(ctx, Severity::Warn, message);
}

#[track_caller]
pub fn error(ctx: Option<&RequestContext>, message: impl Into<String>) {
    log(ctx, Severity::Error, message);
}

fn emit_now(severity: Severity, message: &str, reason: &str) {
    match severity {
        Severity::Debug => tracing::debug!("{} ({})", message, reason),
        Severity::Info => tracing::info!("{} ({})", message, reason),
        Severity::Warn => tracing::warn!("{} ({})", message, reason),
        Severity::Error | Severity::Fatal => tracing::error!("{} ({})", message, reason),
    }
}

/// Pop every deferred message and emit it through `tracing`.
///
/// Meant for request-completion middleware. Each event carries the
/// original call site and the request id. Returns how many were emitted.
pub fn flush_to_tracing(ctx: &RequestContext) -> usize {
    let Some(store) = ctx.extract() else {
        return 0;
    };
    let request_id = store.get(REQUEST_ID_KEY).unwrap_or_default();
    let messages = store.pop_all();
    for m in &messages {
        match m.severity {
            Severity::Debug => tracing::debug!(caller = %m.caller, request_id = %request_id, "{}", m.message),
            Severity::Info => tracing::info!(caller = %m.caller, request_id = %request_id, "{}", m.message),
            Severity::Warn => tracing::warn!(caller = %m.caller, request_id = %request_id, "{}", m.message),
            Severity::Error | Severity::Fatal => {
                tracing::error!(caller = %m.caller, request_id = %request_id, "{}", m.message)
            }
        }
    }
    messages.len()
}

/// The request id stored on the context, or a fresh UUID v4.
///
/// A generated id is not stored; call [`set_request_id`] to pin one.
pub fn request_id(ctx: Option<&RequestContext>) -> String {
    non_empty_slot(ctx, REQUEST_ID_KEY).unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn set_request_id(ctx: Option<&RequestContext>, id: impl Into<String>) {
    if let Some(store) = ctx.and_then(RequestContext::extract) {
        store.set(REQUEST_ID_KEY, id);
    }
}

/// Store the salt key for this request. An empty value stores the
/// `NEW_SALT_KEY` default instead.
pub fn set_salt_key(ctx: Option<&RequestContext>, value: &str) {
    let Some(store) = ctx.and_then(RequestContext::extract) else {
        return;
    };
    let value = if value.is_empty() {
        env::env_or(env::NEW_SALT_KEY, "")
    } else {
        value.to_string()
    };
    store.set(SALT_KEY, value);
}

/// The salt key stored on the context, or `NEW_SALT_KEY` from the
/// environment (empty when unset).
pub fn salt_key(ctx: Option<&RequestContext>) -> String {
    non_empty_slot(ctx, SALT_KEY).unwrap_or_else(|| env::env_or(env::NEW_SALT_KEY, ""))
}

fn non_empty_slot(ctx: Option<&RequestContext>, key: &str) -> Option<String> {
    ctx.and_then(RequestContext::extract)
        .and_then(|store| store.get(key))
        .filter(|v| !v.is_empty())
}

/// Defer a debug message on a request context with `format!` arguments.
///
/// ```
/// use request_log_sink::{request_debug, store::RequestContext};
///
/// let ctx = RequestContext::new().bind();
/// request_debug!(Some(&ctx), "cache miss for {}", 42);
/// ```
#[macro_export]
macro_rules! request_debug {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::request::log($ctx, $crate::record::Severity::Debug, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! request_info {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::request::log($ctx, $crate::record::Severity::Info, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! request_warn {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::request::log($ctx, $crate::record::Severity::Warn, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! request_error {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::request::log($ctx, $crate::record::Severity::Error, format!($($arg)+))
    };
}
