use std::borrow::Cow;
use std::fmt;

use opentelemetry::{
    global::{self, BoxedTracer},
    otel_warn,
    propagation::{Extractor, TextMapPropagator},
    trace::{Link, SpanContext, SpanKind, TraceContextExt, Tracer},
    Context, ContextGuard,
};

use super::{ConsumeScope, Exit, MessageProperties};

const DEFAULT_COMPONENT: &str = "rabbitmq";
// Operation name used by the interceptors this crate instruments for.
const DEFAULT_OPERATION: &str = "onMessage";

/// Entry/exit hook pair that traces one consumer span per logical delivery.
///
/// A `ConsumeTracer` is stateless apart from its configuration and may be
/// shared freely; all per-delivery state lives in the [`ConsumeScope`] the
/// host threads through the hooks. The tracer is an injected capability —
/// pass an SDK tracer in production and a test-double provider's tracer in
/// tests, or use [`ConsumeTracer::global`] to pick up whatever the process
/// has installed (a no-op tracer when nothing is, so instrumentation can
/// never break message handling).
///
/// The upstream context found in the message headers is attached as a
/// follows-from [`Link`]: consumption is asynchronous and the producer span
/// has usually already ended, so a parent/child edge would be a lie.
pub struct ConsumeTracer<T = BoxedTracer> {
    tracer: T,
    component: Cow<'static, str>,
    operation: Cow<'static, str>,
    propagator: Option<Box<dyn TextMapPropagator + Send + Sync>>,
}

impl ConsumeTracer<BoxedTracer> {
    /// Creates a hook pair backed by the globally registered tracer provider
    /// and text map propagator.
    pub fn global() -> Self {
        ConsumeTracer::new(global::tracer("opentelemetry-amqp"))
    }
}

impl<T> ConsumeTracer<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    /// Creates a hook pair around `tracer` with the default component
    /// identity (`rabbitmq`) and operation name (`onMessage`).
    pub fn new(tracer: T) -> Self {
        ConsumeTracer {
            tracer,
            component: Cow::Borrowed(DEFAULT_COMPONENT),
            operation: Cow::Borrowed(DEFAULT_OPERATION),
            propagator: None,
        }
    }

    /// Sets the component identity: the registry key in the scope and the
    /// `messaging.system` attribute value.
    pub fn with_component(mut self, component: impl Into<Cow<'static, str>>) -> Self {
        self.component = component.into();
        self
    }

    /// Sets the span name used for consume spans.
    pub fn with_operation(mut self, operation: impl Into<Cow<'static, str>>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Extracts upstream context with `propagator` instead of the globally
    /// registered one.
    pub fn with_propagator(
        mut self,
        propagator: impl TextMapPropagator + Send + Sync + 'static,
    ) -> Self {
        self.propagator = Some(Box::new(propagator));
        self
    }

    /// The configured component identity.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Entry hook. Invoke before the consuming library's callback runs.
    ///
    /// The first entry for this tracer's component in `scope` starts and
    /// activates a consumer span for the delivery; nested entries reuse that
    /// span and only deepen the nesting count, so a recursive callback never
    /// produces duplicate spans.
    pub fn on_message_enter(
        &self,
        scope: &mut ConsumeScope,
        message: &MessageProperties,
        headers: &dyn Extractor,
    ) {
        scope.enter_with(&self.component, || {
            self.start_consume_span(message, headers)
        });
    }

    /// Exit hook. Invoke after the callback returns, with the failure it
    /// produced, if any.
    ///
    /// Only the outermost exit releases the span: it records `failure` as an
    /// error status, deactivates the span and ends it. Nested exits leave the
    /// span open and their `failure` unrecorded — the outer call owns the
    /// outcome. An exit with no matching entry is reported through the
    /// internal diagnostics channel and performs no span operations; a
    /// tracing bug must never abort the host's message loop.
    pub fn on_message_exit(&self, scope: &mut ConsumeScope, failure: Option<&dyn std::error::Error>) {
        match scope.exit(&self.component) {
            Ok(Exit::Nested(_)) => {}
            Ok(Exit::Finished(finisher)) => finisher.finish(failure),
            Err(error) => {
                otel_warn!(
                    name: "ConsumeTracer.ExitWithoutEnter",
                    reason = error.to_string()
                );
            }
        }
    }

    fn start_consume_span(
        &self,
        message: &MessageProperties,
        headers: &dyn Extractor,
    ) -> (Context, ContextGuard) {
        let mut builder = self
            .tracer
            .span_builder(self.operation.clone())
            .with_kind(SpanKind::Consumer)
            .with_attributes(message.span_attributes(&self.component));
        if let Some(upstream) = self.upstream_context(headers) {
            builder = builder.with_links(vec![Link::with_context(upstream)]);
        }
        let span = builder.start(&self.tracer);
        let cx = Context::current_with_span(span);
        let guard = cx.clone().attach();
        (cx, guard)
    }

    /// Decodes the upstream trace reference from the header carrier. An
    /// empty, unrecognized or malformed carrier is the normal negative
    /// outcome, not an error.
    fn upstream_context(&self, headers: &dyn Extractor) -> Option<SpanContext> {
        let remote = match &self.propagator {
            Some(propagator) => propagator.extract(headers),
            None => global::get_text_map_propagator(|propagator| propagator.extract(headers)),
        };
        let span_context = remote.span().span_context().clone();
        if span_context.is_valid() {
            Some(span_context)
        } else {
            None
        }
    }
}

impl<T> fmt::Debug for ConsumeTracer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeTracer")
            .field("component", &self.component)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
