// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Request-scoped sampling state
//!
//! A [`SamplingContext`] lives in one of two slots:
//!
//! - a **task-local** slot, installed with [`scope`] around a future; every
//!   poll of that future sees the same context no matter which runtime
//!   thread runs it
//! - a **thread-local** slot, used when no task scope is active
//!
//! The task-local slot wins when both exist. A context is created on first
//! access and must be cleared when the request ends, otherwise the next
//! request served by the same thread inherits a stale head decision. Prefer
//! [`initialize_context`], whose guard clears on drop.
//!
//! Moving a context to another thread or task is only done through
//! [`snapshot`] + [`restore`] (or [`scope`]).

use std::cell::Cell;
use std::future::Future;
use std::marker::PhantomData;

/// Per-request sampling state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingContext {
    head_decision: Option<bool>,
    tail_marked: bool,
}

impl SamplingContext {
    /// Cached HEAD_BASED decision, if one was drawn
    pub fn head_decision(&self) -> Option<bool> {
        self.head_decision
    }

    pub fn is_tail_marked(&self) -> bool {
        self.tail_marked
    }

    /// Return the cached head decision, drawing it with `draw` the first time
    pub(crate) fn decide_head(&mut self, draw: impl FnOnce() -> bool) -> bool {
        *self.head_decision.get_or_insert_with(draw)
    }

    pub(crate) fn mark_tail(&mut self) {
        self.tail_marked = true;
    }
}

thread_local! {
    static THREAD_CONTEXT: Cell<Option<SamplingContext>> = const { Cell::new(None) };
}

tokio::task_local! {
    static TASK_CONTEXT: Cell<SamplingContext>;
}

fn in_task_scope() -> bool {
    TASK_CONTEXT.try_with(|_| ()).is_ok()
}

/// Run `f` against the current context, creating it if needed
pub(crate) fn with_current<R>(f: impl FnOnce(&mut SamplingContext) -> R) -> R {
    if in_task_scope() {
        TASK_CONTEXT.with(|cell| {
            let mut ctx = cell.get();
            let result = f(&mut ctx);
            cell.set(ctx);
            result
        })
    } else {
        THREAD_CONTEXT.with(|cell| {
            let mut ctx = cell.get().unwrap_or_default();
            let result = f(&mut ctx);
            cell.set(Some(ctx));
            result
        })
    }
}

/// Clears the context it was created for when dropped
///
/// Not `Send`: it must be dropped on the thread that created it.
#[must_use = "the context is cleared as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        clear_context();
    }
}

/// Start a request with a fresh context
pub fn initialize_context() -> ContextGuard {
    restore(SamplingContext::default());
    ContextGuard {
        _not_send: PhantomData,
    }
}

/// End the current request, discarding its head decision and tail mark
pub fn clear_context() {
    if in_task_scope() {
        TASK_CONTEXT.with(|cell| cell.set(SamplingContext::default()));
    } else {
        THREAD_CONTEXT.with(|cell| cell.set(None));
    }
}

/// Copy of the current context, for handing to spawned work
pub fn snapshot() -> SamplingContext {
    with_current(|ctx| *ctx)
}

/// Install `context` as the current context
pub fn restore(context: SamplingContext) {
    if in_task_scope() {
        TASK_CONTEXT.with(|cell| cell.set(context));
    } else {
        THREAD_CONTEXT.with(|cell| cell.set(Some(context)));
    }
}

/// Run `future` with `context` as its task-local context
///
/// ```ignore
/// let ctx = logflow::sampling::context::snapshot();
/// tokio::spawn(logflow::sampling::context::scope(ctx, async move {
///     // sampling decisions here share the parent's head decision
/// }));
/// ```
pub async fn scope<F: Future>(context: SamplingContext, future: F) -> F::Output {
    TASK_CONTEXT.scope(Cell::new(context), future).await
}
