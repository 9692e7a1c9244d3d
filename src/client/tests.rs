use std::collections::HashSet;
use std::time::Duration;

use super::ConnectionFactory;
use crate::broker::engine;
use crate::transaction::TransactionalResource;

#[tokio::test]
async fn test_send_and_receive_round_trip() {
    let factory = ConnectionFactory::in_memory("default");
    let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();

    factory.producer().send("first", "test").unwrap();

    let delivery = consumer.receive(Duration::from_secs(1)).await.unwrap();
    assert_eq!(delivery.message().text().unwrap(), "test");
    assert_eq!(delivery.message().delivery_count, 1);

    let message = delivery.ack().unwrap();
    assert_eq!(message.text().unwrap(), "test");
    assert_eq!(engine::lock(factory.broker()).pending(consumer.key()), 0);
}

#[tokio::test]
async fn test_receive_times_out_on_empty_subscription() {
    let factory = ConnectionFactory::in_memory("default");
    let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();

    let started = tokio::time::Instant::now();
    assert!(consumer.receive(Duration::from_millis(100)).await.is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_waiting_consumer_wakes_on_publish() {
    let factory = ConnectionFactory::in_memory("default");
    let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();

    let producer = factory.producer();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.send("first", "late").unwrap();
    });

    let delivery = consumer.receive(Duration::from_secs(2)).await.unwrap();
    assert_eq!(delivery.message().text().unwrap(), "late");
}

#[tokio::test]
async fn test_shared_consumers_never_see_the_same_delivery() {
    let factory = ConnectionFactory::in_memory("default");
    let a = factory.shared_durable_consumer("first", "first-sub").unwrap();
    let b = factory.shared_durable_consumer("first", "first-sub").unwrap();

    factory.producer().send("first", "only").unwrap();

    let first = a.receive_no_wait().unwrap();
    assert!(b.receive_no_wait().is_none());

    let (_, receipt) = first.into_parts();
    receipt.release().unwrap();

    let redelivered = b.receive_no_wait().unwrap();
    assert_eq!(redelivered.message().delivery_count, 2);
}

#[tokio::test]
async fn test_dropped_delivery_is_redelivered() {
    let factory = ConnectionFactory::in_memory("default");
    let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();
    factory.producer().send("first", "test").unwrap();

    drop(consumer.receive_no_wait().unwrap());

    let again = consumer.receive_no_wait().unwrap();
    assert!(again.message().is_redelivered());
}

#[test]
fn test_factories_are_isolated() {
    let first = ConnectionFactory::in_memory("default");
    let second = ConnectionFactory::in_memory("second");

    let consumer = second.shared_durable_consumer("topic", "sub").unwrap();
    first.producer().send("topic", "elsewhere").unwrap();

    assert!(consumer.receive_no_wait().is_none());
    assert_eq!(second.name(), "second");
    assert_eq!(first.coordinator().capacity(), super::connection::DEFAULT_MAX_TRANSACTIONS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_deliver_each_message_once() {
    const CONSUMERS: usize = 8;
    const MESSAGES: usize = 200;

    let factory = ConnectionFactory::in_memory("default");
    let mut workers = Vec::new();
    for _ in 0..CONSUMERS {
        let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();
        workers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(delivery) = consumer.receive(Duration::from_millis(200)).await {
                assert_eq!(delivery.message().delivery_count, 1);
                seen.push(delivery.ack().unwrap().message_id);
            }
            seen
        }));
    }

    let producer = factory.producer();
    let mut published = HashSet::new();
    for i in 0..MESSAGES {
        published.insert(producer.send("first", format!("m{i}")).unwrap().message_id);
    }

    let mut delivered = Vec::new();
    for worker in workers {
        delivered.extend(worker.await.unwrap());
    }

    assert_eq!(delivered.len(), MESSAGES);
    let unique: HashSet<_> = delivered.into_iter().collect();
    assert_eq!(unique, published);
}

#[tokio::test]
async fn test_rolled_back_receipt_is_requeued() {
    let factory = ConnectionFactory::in_memory("default");
    let consumer = factory.shared_durable_consumer("first", "first-sub").unwrap();
    factory.producer().send("first", "test").unwrap();

    let (_, mut receipt) = consumer.receive_no_wait().unwrap().into_parts();
    receipt.rollback();
    assert_eq!(engine::lock(factory.broker()).pending(consumer.key()), 1);

    // A settled receipt does nothing more on drop.
    drop(receipt);
    let again = consumer.receive_no_wait().unwrap();
    assert_eq!(again.message().delivery_count, 2);
    assert!(consumer.receive_no_wait().is_none());
}
