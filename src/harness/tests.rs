use std::time::Duration;

use super::{Harness, Recorder, Timeouts};
use crate::broker::Message;
use crate::client::ConnectionFactory;
use crate::controller::RouteController;
use crate::route::{Exchange, Step};
use crate::Error;

fn quick() -> Timeouts {
    Timeouts {
        lifecycle: Duration::from_secs(5),
        receive: Duration::from_millis(100),
        drain: Duration::from_millis(50),
    }
}

fn harness() -> Harness {
    Harness::new(RouteController::new(Duration::from_millis(50)), quick())
}

#[tokio::test]
async fn test_drain_is_idempotent() {
    let harness = harness();
    let factory = ConnectionFactory::in_memory("default");
    harness.drain_subscription(&factory, "t", "s").await.unwrap();

    for i in 0..3 {
        harness.send(&factory, "t", format!("m{i}")).unwrap();
    }

    assert_eq!(harness.drain_subscription(&factory, "t", "s").await.unwrap(), 3);
    assert_eq!(harness.drain_subscription(&factory, "t", "s").await.unwrap(), 0);
    assert!(harness.receive_one(&factory, "t", "s").await.unwrap().is_none());
}

#[tokio::test]
async fn test_receive_one_acknowledges() {
    let harness = harness();
    let factory = ConnectionFactory::in_memory("default");
    harness.drain_subscription(&factory, "t", "s").await.unwrap();
    harness.send(&factory, "t", "test").unwrap();

    let message = harness.receive_one(&factory, "t", "s").await.unwrap().unwrap();
    assert_eq!(message.text().unwrap(), "test");
    assert!(harness.receive_one(&factory, "t", "s").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_route_is_reported() {
    let harness = harness();
    assert!(matches!(harness.route_status("ghost"), Err(Error::RouteNotFound(_))));
    assert!(matches!(harness.start_route("ghost").await, Err(Error::RouteNotFound(_))));
    assert!(matches!(harness.stop_route("ghost").await, Err(Error::RouteNotFound(_))));
}

#[tokio::test]
async fn test_recorder_expectations() {
    let recorder = Recorder::new();
    recorder.expect_count(1);

    let err = recorder
        .assert_is_satisfied(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    let mut exchange = Exchange::new("r", Message::new("t", "test"));
    recorder.process(&mut exchange).unwrap();
    recorder.assert_is_satisfied(Duration::from_millis(20)).await.unwrap();

    recorder.process(&mut exchange).unwrap();
    assert!(matches!(
        recorder.assert_is_satisfied(Duration::from_millis(20)).await,
        Err(Error::UnexpectedDeliveries { expected: 1, actual: 2 })
    ));

    recorder.reset();
    assert_eq!(recorder.count(), 0);
    recorder.assert_is_satisfied(Duration::from_millis(20)).await.unwrap();
}

#[tokio::test]
async fn test_recorder_wakes_waiter() {
    let recorder = Recorder::new();
    recorder.expect_count(1);

    let feeder = recorder.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut exchange = Exchange::new("r", Message::new("t", "late"));
        feeder.process(&mut exchange).unwrap();
    });

    recorder.assert_is_satisfied(Duration::from_secs(2)).await.unwrap();
    assert_eq!(recorder.received()[0].text().unwrap(), "late");
}
