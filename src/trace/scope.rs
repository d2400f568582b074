use std::collections::hash_map::{Entry, HashMap};
use std::fmt;

use opentelemetry::{
    trace::{Status, TraceContextExt},
    Context, ContextGuard,
};
use thiserror::Error;

/// Error raised by [`ConsumeScope::exit`] when enter/exit pairing broke.
///
/// This always indicates a host-side bug: an exit hook fired without its
/// matching enter, which means some other span has leaked. Callers should
/// report it rather than discard it, but must not let it escape into the
/// instrumented application's message loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScopeError {
    /// No entry is active for the component on this call thread.
    #[error("no active consume span for component {component:?} on this call thread")]
    NotEntered {
        /// Component identity the exit was recorded against.
        component: String,
    },
}

/// An active consume span together with its activation guard and the number
/// of nested entries currently sharing it.
struct ActiveConsume {
    cx: Context,
    guard: ContextGuard,
    depth: usize,
}

/// Outcome of [`ConsumeScope::exit`].
pub enum Exit {
    /// Outer entries are still active; the span stays open. Carries the
    /// remaining depth.
    Nested(usize),
    /// The outermost entry exited. The entry has been removed from the scope
    /// and the returned finisher is the only remaining handle on the span.
    Finished(SpanFinisher),
}

impl fmt::Debug for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Nested(depth) => f.debug_tuple("Nested").field(depth).finish(),
            Exit::Finished(..) => f.debug_tuple("Finished").finish(),
        }
    }
}

/// Per-call-thread registry of active consume spans, keyed by component
/// identity.
///
/// A scope belongs to exactly one logical call thread: it holds each span's
/// [`ContextGuard`], which is `!Send`, so handing a scope to another thread is
/// a compile error rather than a data race. No locking is involved anywhere.
///
/// Re-entering a component that is already active reuses the existing span
/// and bumps a nesting counter; the span is only released once the counter
/// returns to zero. Depth moves by exactly one per call in either direction.
pub struct ConsumeScope {
    entries: HashMap<String, ActiveConsume>,
}

impl ConsumeScope {
    /// Creates an empty scope. Typically one per consumer thread, created
    /// alongside it and dropped with it.
    pub fn new() -> Self {
        ConsumeScope {
            entries: HashMap::new(),
        }
    }

    /// Current nesting depth for `component`, `0` when no entry is active.
    pub fn depth(&self, component: &str) -> usize {
        self.entries.get(component).map_or(0, |entry| entry.depth)
    }

    /// Records one entry for `component` and returns the depth afterwards.
    ///
    /// When an entry is already active its depth is incremented and `start`
    /// is *not* run. Otherwise `start` is invoked to build and activate the
    /// span, and the entry is registered at depth 1. The exclusive borrow
    /// makes reservation and population one step, and a panicking `start`
    /// leaves no half-built entry behind.
    pub fn enter_with(
        &mut self,
        component: &str,
        start: impl FnOnce() -> (Context, ContextGuard),
    ) -> usize {
        match self.entries.entry(component.to_owned()) {
            Entry::Occupied(active) => {
                let active = active.into_mut();
                active.depth += 1;
                active.depth
            }
            Entry::Vacant(slot) => {
                let (cx, guard) = start();
                slot.insert(ActiveConsume {
                    cx,
                    guard,
                    depth: 1,
                });
                1
            }
        }
    }

    /// Records one exit for `component`.
    ///
    /// Returns [`Exit::Nested`] while outer entries remain, or
    /// [`Exit::Finished`] with the span's finisher once the outermost entry
    /// exits — the entry is removed in the same step, so depth 0 and "still
    /// registered" can never be observed together.
    pub fn exit(&mut self, component: &str) -> Result<Exit, ScopeError> {
        match self.entries.entry(component.to_owned()) {
            Entry::Vacant(_) => Err(ScopeError::NotEntered {
                component: component.to_owned(),
            }),
            Entry::Occupied(mut active) => {
                let entry = active.get_mut();
                entry.depth -= 1;
                if entry.depth > 0 {
                    return Ok(Exit::Nested(entry.depth));
                }
                let ActiveConsume { cx, guard, .. } = active.remove();
                Ok(Exit::Finished(SpanFinisher { cx, guard }))
            }
        }
    }
}

impl Default for ConsumeScope {
    fn default() -> Self {
        ConsumeScope::new()
    }
}

impl fmt::Debug for ConsumeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v.depth)))
            .finish()
    }
}

/// Sole remaining handle on a consume span whose outermost entry has exited.
///
/// Dropping the finisher without calling [`finish`](SpanFinisher::finish)
/// deactivates the span but leaves it un-ended; always finish it.
pub struct SpanFinisher {
    cx: Context,
    guard: ContextGuard,
}

impl SpanFinisher {
    /// Closes out the span: records the processing failure when one occurred,
    /// deactivates the span and ends it.
    ///
    /// Tagging is best effort and cannot fail; export is the tracer's
    /// concern and happens out of band.
    pub fn finish(self, failure: Option<&dyn std::error::Error>) {
        let SpanFinisher { cx, guard } = self;
        let span = cx.span();
        if let Some(err) = failure {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
        drop(guard);
        span.end();
    }
}

impl fmt::Debug for SpanFinisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanFinisher").finish_non_exhaustive()
    }
}
