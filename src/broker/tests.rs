use super::topic::{Subscription, Topic};
use super::{Body, Broker, Message, SubscriptionKey};
use crate::DeliveryError;

#[test]
fn test_topic_new() {
    let topic = Topic::new("orders");
    assert_eq!(topic.name, "orders");
    assert!(topic.subscriptions.is_empty());
}

#[test]
fn test_subscription_take_moves_message_in_flight() {
    let mut subscription = Subscription::new("orders", "billing");
    subscription.enqueue(1, Message::new("orders", "a"));

    let (tag, message) = subscription.take().unwrap();
    assert_eq!(message.delivery_count, 1);
    assert_eq!(subscription.ready_len(), 0);
    assert_eq!(subscription.in_flight_len(), 1);

    assert!(subscription.ack(tag).is_some());
    assert_eq!(subscription.in_flight_len(), 0);
    assert!(subscription.take().is_none());
}

#[test]
fn test_subscription_requeue_puts_message_at_head() {
    let mut subscription = Subscription::new("orders", "billing");
    subscription.enqueue(1, Message::new("orders", "first"));
    subscription.enqueue(2, Message::new("orders", "second"));

    let (tag, _) = subscription.take().unwrap();
    subscription.requeue(tag).unwrap();

    let (_, redelivered) = subscription.take().unwrap();
    assert_eq!(redelivered.text().unwrap(), "first");
    assert_eq!(redelivered.delivery_count, 2);
    assert!(redelivered.is_redelivered());
}

#[test]
fn test_publish_without_subscription_is_discarded() {
    let mut broker = Broker::new();
    broker.publish("orders", "lost").unwrap();
    assert!(broker.has_topic("orders"));

    let key = broker.subscribe_durable("orders", "billing").unwrap();
    assert_eq!(broker.pending(&key), 0);
}

#[test]
fn test_publish_fans_out_to_every_subscription() {
    let mut broker = Broker::new();
    let billing = broker.subscribe_durable("orders", "billing").unwrap();
    let shipping = broker.subscribe_durable("orders", "shipping").unwrap();

    let published = broker.publish("orders", "hello").unwrap();

    let (_, a) = broker.take(&billing).unwrap().unwrap();
    let (_, b) = broker.take(&shipping).unwrap().unwrap();
    assert_eq!(a.message_id, published.message_id);
    assert_eq!(b.message_id, published.message_id);
}

#[test]
fn test_subscribe_durable_is_idempotent() {
    let mut broker = Broker::new();
    let key = broker.subscribe_durable("orders", "billing").unwrap();
    broker.publish("orders", "kept").unwrap();

    let again = broker.subscribe_durable("orders", "billing").unwrap();
    assert_eq!(key, again);
    assert_eq!(broker.pending(&key), 1);
}

#[test]
fn test_subscription_untake_restores_ready_state() {
    let mut subscription = Subscription::new("orders", "billing");
    subscription.enqueue(1, Message::new("orders", "first"));
    subscription.enqueue(2, Message::new("orders", "second"));

    let (tag, _) = subscription.take().unwrap();
    subscription.untake(tag);
    assert_eq!(subscription.in_flight_len(), 0);

    let (_, again) = subscription.take().unwrap();
    assert_eq!(again.text().unwrap(), "first");
    assert_eq!(again.delivery_count, 1);
}

#[test]
fn test_ack_and_requeue_unknown_tag() {
    let mut broker = Broker::new();
    let key = broker.subscribe_durable("orders", "billing").unwrap();
    assert!(!broker.ack(&key, 42).unwrap());
    assert!(!broker.requeue(&key, 42));

    let missing = SubscriptionKey::new("nope", "nope");
    assert!(broker.take(&missing).unwrap().is_none());
    assert_eq!(broker.pending(&missing), 0);
}

#[test]
fn test_in_flight_message_counts_as_pending() {
    let mut broker = Broker::new();
    let key = broker.subscribe_durable("orders", "billing").unwrap();
    broker.publish("orders", "x").unwrap();

    let (tag, _) = broker.take(&key).unwrap().unwrap();
    assert_eq!(broker.pending(&key), 1);
    assert!(broker.take(&key).unwrap().is_none());

    assert!(broker.ack(&key, tag).unwrap());
    assert_eq!(broker.pending(&key), 0);
}

#[test]
fn test_message_body_accessors() {
    let text = Message::new("t", "{\"n\":3}");
    assert_eq!(text.text().unwrap(), "{\"n\":3}");
    let value: serde_json::Value = text.json().unwrap();
    assert_eq!(value["n"], 3);

    let bytes = Message::new("t", Body::Bytes(vec![0xff]));
    assert!(matches!(
        bytes.text(),
        Err(DeliveryError::UnexpectedBody { actual: "bytes", .. })
    ));
    assert!(matches!(
        bytes.json::<serde_json::Value>(),
        Err(DeliveryError::Malformed { .. })
    ));
}
