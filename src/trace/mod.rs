//! Span lifecycle coordination for consumer callbacks.
//!
//! The types in this module split the work into three pieces:
//!
//! * [`ConsumeTracer`] owns the tracer and propagation format and exposes the
//!   `on_message_enter` / `on_message_exit` hook pair that an instrumentation
//!   host invokes around the consuming library's callback.
//! * [`ConsumeScope`] is the per-call-thread registry that collapses nested
//!   entries into a single active span. It holds the span's activation guard
//!   and is therefore `!Send`; every consumer thread owns its own scope.
//! * [`MessageProperties`] carries the delivery metadata that becomes span
//!   attributes, with [`AmqpHeaderExtractor`] reading the propagation carrier
//!   out of byte-valued AMQP header tables.
//!
//! Hooks must be called in matched pairs on one thread, entry strictly before
//! its exit. Pairs may nest; an exit that never arrives leaks its span open,
//! which is accepted here — forced closing is the host's business.

mod consume;
mod message;
mod scope;

pub use consume::ConsumeTracer;
pub use message::{
    AmqpHeaderExtractor, MessageProperties, MESSAGING_RABBITMQ_APP_ID,
    MESSAGING_RABBITMQ_CLUSTER_ID, MESSAGING_RABBITMQ_CONSUMER_TAG,
};
pub use scope::{ConsumeScope, Exit, ScopeError, SpanFinisher};
