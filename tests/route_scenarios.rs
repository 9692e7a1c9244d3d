//! End-to-end route behaviour against in-memory brokers.

use txroute::App;
use txroute::config::{BrokerSettings, LoggingSettings, RouteSettings, Settings, TimeoutSettings};
use txroute::harness::{Harness, Recorder};
use txroute::route::{RouteStatus, ThrowException};

const FAILURE: &str = "Artificial exception to test rollback";

fn broker(name: &str) -> BrokerSettings {
    BrokerSettings {
        name: name.to_string(),
        data_dir: None,
        max_transactions: 10,
    }
}

fn route(id: &str, factory: &str, topic: &str, consumers: usize) -> RouteSettings {
    RouteSettings {
        id: id.to_string(),
        connection_factory: factory.to_string(),
        topic: topic.to_string(),
        subscription: format!("{topic}-subscription"),
        consumers,
        max_redeliveries: 1,
        redelivery_delay_ms: 0,
        forward_to: None,
    }
}

fn settings() -> Settings {
    Settings {
        brokers: vec![broker("default"), broker("second")],
        routes: vec![
            route("first-route", "default", "first", 1),
            route("second-route", "second", "second", 10),
        ],
        timeouts: TimeoutSettings {
            lifecycle_ms: 5_000,
            receive_ms: 300,
            drain_ms: 100,
        },
        logging: LoggingSettings {
            level: "debug".to_string(),
        },
    }
}

struct Fixture {
    app: App,
    harness: Harness,
}

impl Fixture {
    /// Stops the route, empties its subscription and starts it again.
    async fn setup(route_id: &str, factory: &str, topic: &str) -> Self {
        let settings = settings();
        txroute::utils::logging::init(&settings.logging.level);
        let app = App::from_settings(&settings).unwrap();
        let harness = app.harness();
        harness.stop_route(route_id).await.unwrap();
        harness
            .drain_subscription(app.factory(factory).unwrap(), topic, &format!("{topic}-subscription"))
            .await
            .unwrap();
        harness.start_route(route_id).await.unwrap();
        Self { app, harness }
    }
}

mod first_route {
    use super::*;

    const ROUTE: &str = "first-route";
    const FACTORY: &str = "default";
    const TOPIC: &str = "first";
    const SUBSCRIPTION: &str = "first-subscription";

    #[tokio::test]
    async fn test_message_is_consumed() {
        let Fixture { app, harness } = Fixture::setup(ROUTE, FACTORY, TOPIC).await;
        let factory = app.factory(FACTORY).unwrap();

        let recorder = Recorder::new();
        recorder.expect_count(1);
        let observer = recorder.clone();
        harness
            .controller()
            .advise(ROUTE, move |pipeline| {
                pipeline.add_last("mockFirst", observer);
            })
            .unwrap();

        harness.send(factory, TOPIC, "test").unwrap();

        recorder
            .assert_is_satisfied(app.timeouts().lifecycle)
            .await
            .unwrap();
        assert_eq!(recorder.received()[0].text().unwrap(), "test");
        assert!(harness.receive_one(factory, TOPIC, SUBSCRIPTION).await.unwrap().is_none());

        harness
            .controller()
            .advise(ROUTE, |pipeline| {
                pipeline.remove("mockFirst");
            })
            .unwrap();
        harness.stop_route(ROUTE).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_stops_route() {
        let Fixture { app, harness } = Fixture::setup(ROUTE, FACTORY, TOPIC).await;
        let factory = app.factory(FACTORY).unwrap();

        harness
            .controller()
            .advise(ROUTE, |pipeline| {
                pipeline.add_first("failure", ThrowException::new(FAILURE));
            })
            .unwrap();

        harness.send(factory, TOPIC, "test").unwrap();

        harness
            .await_route_status(ROUTE, RouteStatus::Stopped)
            .await
            .unwrap();
        let message = harness
            .receive_one(factory, TOPIC, SUBSCRIPTION)
            .await
            .unwrap()
            .expect("rolled back message is still on the subscription");
        assert_eq!(message.text().unwrap(), "test");
    }
}

mod second_route {
    use super::*;

    const ROUTE: &str = "second-route";
    const FACTORY: &str = "second";
    const TOPIC: &str = "second";
    const SUBSCRIPTION: &str = "second-subscription";

    #[tokio::test]
    async fn test_message_is_consumed() {
        let Fixture { app, harness } = Fixture::setup(ROUTE, FACTORY, TOPIC).await;
        let factory = app.factory(FACTORY).unwrap();

        let recorder = Recorder::new();
        recorder.expect_count(1);
        let observer = recorder.clone();
        harness
            .controller()
            .advise(ROUTE, move |pipeline| {
                pipeline.add_last("mockSecond", observer);
            })
            .unwrap();

        harness.send(factory, TOPIC, "test").unwrap();

        recorder
            .assert_is_satisfied(app.timeouts().lifecycle)
            .await
            .unwrap();
        assert!(harness.receive_one(factory, TOPIC, SUBSCRIPTION).await.unwrap().is_none());
        harness.stop_route(ROUTE).await.unwrap();
    }

    /// With ten consumers the route is not guaranteed to be stopped in time:
    /// other consumers may already hold a redelivery when the limit trips.
    /// The payload must still come back once the route is down.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_rolls_back_with_concurrent_consumers() {
        let Fixture { app, harness } = Fixture::setup(ROUTE, FACTORY, TOPIC).await;
        let factory = app.factory(FACTORY).unwrap();

        harness
            .controller()
            .advise(ROUTE, |pipeline| {
                pipeline.add_first("failure", ThrowException::new(FAILURE));
            })
            .unwrap();

        harness.send(factory, TOPIC, "test").unwrap();

        let _ = harness.await_route_status(ROUTE, RouteStatus::Stopped).await;
        harness.stop_route(ROUTE).await.unwrap();

        let message = harness
            .receive_one(factory, TOPIC, SUBSCRIPTION)
            .await
            .unwrap()
            .expect("rolled back message is still on the subscription");
        assert_eq!(message.text().unwrap(), "test");
    }
}

#[tokio::test]
async fn test_drain_twice_leaves_subscription_empty() {
    let app = App::from_settings(&settings()).unwrap();
    let harness = app.harness();
    let factory = app.factory("default").unwrap();

    harness.send(factory, "first", "a").unwrap();
    harness.send(factory, "first", "b").unwrap();

    assert_eq!(
        harness.drain_subscription(factory, "first", "first-subscription").await.unwrap(),
        2
    );
    assert_eq!(
        harness.drain_subscription(factory, "first", "first-subscription").await.unwrap(),
        0
    );
    assert!(harness.receive_one(factory, "first", "first-subscription").await.unwrap().is_none());
}

#[tokio::test]
async fn test_payload_round_trip() {
    let app = App::from_settings(&settings()).unwrap();
    let harness = app.harness();
    let factory = app.factory("second").unwrap();

    harness.send(factory, "second", "test").unwrap();
    let message = harness
        .receive_one(factory, "second", "second-subscription")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.text().unwrap(), "test");
    assert!(!message.is_redelivered());
}

#[tokio::test]
async fn test_consume_then_fail_on_one_route() {
    let Fixture { app, harness } = Fixture::setup("first-route", "default", "first").await;
    let factory = app.factory("default").unwrap();

    let recorder = Recorder::new();
    recorder.expect_count(1);
    let observer = recorder.clone();
    harness
        .controller()
        .advise("first-route", move |pipeline| {
            pipeline.add_last("observer", observer);
        })
        .unwrap();
    harness.send(factory, "first", "test").unwrap();
    recorder.assert_is_satisfied(app.timeouts().lifecycle).await.unwrap();
    assert!(harness.receive_one(factory, "first", "first-subscription").await.unwrap().is_none());

    harness
        .controller()
        .advise("first-route", |pipeline| {
            pipeline.remove("observer");
            pipeline.add_first("failure", ThrowException::new(FAILURE));
        })
        .unwrap();
    harness.send(factory, "first", "test").unwrap();

    harness
        .await_route_status("first-route", RouteStatus::Stopped)
        .await
        .unwrap();
    let message = harness
        .receive_one(factory, "first", "first-subscription")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.text().unwrap(), "test");
}
