//! Instrumentation support for AMQP message consumers.
//!
//! Message-processing callbacks are an awkward fit for ordinary span guards:
//! the consuming library may re-enter the same callback recursively for one
//! delivery, the producer span has usually already finished by the time the
//! message is picked up, and a failure in the tracing path must never abort
//! message handling. This crate provides the span-lifecycle bookkeeping that
//! deals with all three:
//!
//! * one consumer span per logical delivery, no matter how often the hook
//!   re-enters itself,
//! * a *follows-from* [`Link`] to the trace context carried in the message
//!   headers instead of a parent/child edge,
//! * guaranteed finalization (with error status when processing failed) once
//!   the outermost exit is observed.
//!
//! [`Link`]: opentelemetry::trace::Link
//!
//! # Getting started
//!
//! ```
//! use std::collections::HashMap;
//! use opentelemetry_amqp::trace::{ConsumeScope, ConsumeTracer, MessageProperties};
//!
//! // One tracer per instrumented library, one scope per consumer thread.
//! let tracer = ConsumeTracer::global();
//! let mut scope = ConsumeScope::new();
//!
//! let headers: HashMap<String, String> = HashMap::new();
//! let message = MessageProperties {
//!     queue: Some("orders".to_owned()),
//!     message_id: Some("m-4711".to_owned()),
//!     ..Default::default()
//! };
//!
//! tracer.on_message_enter(&mut scope, &message, &headers);
//! // ... hand the delivery to the application ...
//! tracer.on_message_exit(&mut scope, None);
//! ```
//!
//! # Supported Rust Versions
//!
//! OpenTelemetry is built against the latest stable release. The minimum
//! supported version is 1.75. The current OpenTelemetry version is not
//! guaranteed to build on Rust versions earlier than the minimum supported
//! version.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

#[cfg(feature = "trace")]
pub mod trace;
