use std::collections::HashMap;

use opentelemetry::{propagation::Extractor, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    MESSAGING_DESTINATION_NAME, MESSAGING_MESSAGE_ID, MESSAGING_OPERATION_TYPE,
    MESSAGING_RABBITMQ_DESTINATION_ROUTING_KEY, MESSAGING_RABBITMQ_MESSAGE_DELIVERY_TAG,
    MESSAGING_SYSTEM,
};

/// Span attribute recording the AMQP `app-id` property of the delivery.
pub const MESSAGING_RABBITMQ_APP_ID: &str = "messaging.rabbitmq.app_id";
/// Span attribute recording the cluster id reported by the broker.
pub const MESSAGING_RABBITMQ_CLUSTER_ID: &str = "messaging.rabbitmq.cluster_id";
/// Span attribute recording the tag of the consumer the delivery went to.
pub const MESSAGING_RABBITMQ_CONSUMER_TAG: &str = "messaging.rabbitmq.consumer_tag";

const OPERATION_TYPE_PROCESS: &str = "process";

/// Delivery metadata recorded on the consume span.
///
/// Every field is optional; brokers and client libraries differ in what they
/// populate. Fields with an OpenTelemetry messaging semantic convention are
/// recorded under that key, the rest under crate-local `messaging.rabbitmq.*`
/// keys. `extra_attributes` is the escape hatch for vendor-specific tags that
/// have no typed field here.
///
/// Attributes are attached when the span starts and are not updated
/// afterwards.
#[derive(Clone, Debug, Default)]
pub struct MessageProperties {
    /// Application id set by the producer (`app-id` property).
    pub app_id: Option<String>,
    /// Broker cluster the delivery originated from.
    pub cluster_id: Option<String>,
    /// Consumer tag of the subscription that received the delivery.
    pub consumer_tag: Option<String>,
    /// Queue the message was consumed from.
    pub queue: Option<String>,
    /// Routing key the message was published with.
    pub routing_key: Option<String>,
    /// Message id set by the producer (`message-id` property).
    pub message_id: Option<String>,
    /// Channel-local delivery tag assigned by the broker.
    pub delivery_tag: Option<i64>,
    /// Additional vendor-specific attributes, appended verbatim.
    pub extra_attributes: Vec<KeyValue>,
}

impl MessageProperties {
    pub(crate) fn span_attributes(&self, system: &str) -> Vec<KeyValue> {
        let mut attributes = Vec::with_capacity(9 + self.extra_attributes.len());
        attributes.push(KeyValue::new(MESSAGING_SYSTEM, system.to_owned()));
        attributes.push(KeyValue::new(MESSAGING_OPERATION_TYPE, OPERATION_TYPE_PROCESS));
        if let Some(queue) = &self.queue {
            attributes.push(KeyValue::new(MESSAGING_DESTINATION_NAME, queue.clone()));
        }
        if let Some(routing_key) = &self.routing_key {
            attributes.push(KeyValue::new(
                MESSAGING_RABBITMQ_DESTINATION_ROUTING_KEY,
                routing_key.clone(),
            ));
        }
        if let Some(message_id) = &self.message_id {
            attributes.push(KeyValue::new(MESSAGING_MESSAGE_ID, message_id.clone()));
        }
        if let Some(delivery_tag) = self.delivery_tag {
            attributes.push(KeyValue::new(
                MESSAGING_RABBITMQ_MESSAGE_DELIVERY_TAG,
                delivery_tag,
            ));
        }
        if let Some(app_id) = &self.app_id {
            attributes.push(KeyValue::new(MESSAGING_RABBITMQ_APP_ID, app_id.clone()));
        }
        if let Some(cluster_id) = &self.cluster_id {
            attributes.push(KeyValue::new(MESSAGING_RABBITMQ_CLUSTER_ID, cluster_id.clone()));
        }
        if let Some(consumer_tag) = &self.consumer_tag {
            attributes.push(KeyValue::new(
                MESSAGING_RABBITMQ_CONSUMER_TAG,
                consumer_tag.clone(),
            ));
        }
        attributes.extend(self.extra_attributes.iter().cloned());
        attributes
    }
}

/// Reads propagation headers out of an AMQP header table whose values arrive
/// as raw bytes (AMQP `longstr`). Values that are not valid UTF-8 are treated
/// as absent, which downstream propagators report as "no upstream context"
/// rather than an error.
///
/// Header tables that already carry `String` values can be passed to the
/// hooks directly; `HashMap<String, String>` implements [`Extractor`]
/// upstream.
#[derive(Debug)]
pub struct AmqpHeaderExtractor<'a>(pub &'a HashMap<String, Vec<u8>>);

impl Extractor for AmqpHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Value;

    #[test]
    fn attributes_cover_populated_fields_only() {
        let message = MessageProperties {
            queue: Some("orders".to_owned()),
            message_id: Some("m-1".to_owned()),
            delivery_tag: Some(7),
            extra_attributes: vec![KeyValue::new("tenant", "acme")],
            ..Default::default()
        };

        let attributes = message.span_attributes("rabbitmq");
        assert!(attributes.contains(&KeyValue::new(MESSAGING_SYSTEM, "rabbitmq".to_owned())));
        assert!(attributes.contains(&KeyValue::new(MESSAGING_OPERATION_TYPE, "process")));
        assert!(attributes.contains(&KeyValue::new(MESSAGING_DESTINATION_NAME, "orders".to_owned())));
        assert!(attributes.contains(&KeyValue::new(MESSAGING_MESSAGE_ID, "m-1".to_owned())));
        assert!(attributes.contains(&KeyValue::new(MESSAGING_RABBITMQ_MESSAGE_DELIVERY_TAG, 7)));
        assert!(attributes.contains(&KeyValue::new("tenant", "acme")));
        assert!(!attributes
            .iter()
            .any(|kv| kv.key.as_str() == MESSAGING_RABBITMQ_APP_ID));
    }

    #[test]
    fn empty_properties_still_identify_the_operation() {
        let attributes = MessageProperties::default().span_attributes("rabbitmq");
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].value, Value::from("process"));
    }

    #[test]
    fn byte_headers_decode_as_utf8() {
        let mut headers = HashMap::new();
        headers.insert("traceparent".to_owned(), b"00-abc".to_vec());
        headers.insert("garbage".to_owned(), vec![0xff, 0xfe]);

        let extractor = AmqpHeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("00-abc"));
        assert_eq!(extractor.get("garbage"), None);
        assert_eq!(extractor.get("missing"), None);
        assert_eq!(extractor.keys().len(), 2);
    }
}
