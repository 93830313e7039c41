mod common;

use std::time::Duration;

use common::{Answer, FakeNetwork, ScriptedProber, addr, engine, fast_config};
use lanpulse::{AddressRange, DeviceClass, DiscoverySettings, EngineError, ProbeError, Reachability};

#[tokio::test]
async fn slash30_scenario_uses_gateway_and_tcp_fallback() {
    let prober = ScriptedProber::new();
    prober.ping("192.0.2.1", Answer::Reply(Duration::from_millis(1)));
    prober.port("192.0.2.2", 80, Answer::Reply(Duration::from_millis(2)));
    let engine = engine(fast_config(1), prober.clone(), FakeNetwork::lan());

    let range = AddressRange::parse("192.0.2.0/30").unwrap();
    let devices = engine.scan(Some(range)).await.unwrap();

    let addresses: Vec<_> = devices.iter().map(|d| d.address).collect();
    assert_eq!(addresses, vec![addr("192.0.2.1"), addr("192.0.2.2")]);

    assert_eq!(devices[0].class, DeviceClass::Router);
    assert_eq!(devices[0].state, Reachability::Online);
    assert_eq!(devices[1].state, Reachability::Online);
    assert!(devices[1].open_ports.contains(&80));
}

#[tokio::test]
async fn previously_known_device_is_reported_offline() {
    let prober = ScriptedProber::new();
    prober.ping("192.0.2.1", Answer::Reply(Duration::from_millis(1)));
    prober.ping("192.0.2.3", Answer::Reply(Duration::from_millis(1)));
    let engine = engine(fast_config(1), prober.clone(), FakeNetwork::lan());
    let range = AddressRange::parse("192.0.2.0/30").unwrap();

    engine.scan(Some(range)).await.unwrap();
    prober.ping("192.0.2.3", Answer::Fail(ProbeError::Unreachable));
    let devices = engine.scan(Some(range)).await.unwrap();

    let gone = devices
        .iter()
        .find(|d| d.address == addr("192.0.2.3"))
        .expect("known device stays in the result");
    assert_eq!(gone.state, Reachability::Offline);
    assert!(devices.iter().all(|d| d.address != addr("192.0.2.2")));
    assert_eq!(engine.inventory().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_targets_cannot_stall_the_scan() {
    let prober = ScriptedProber::new();
    for host in 1..=254u8 {
        let ip = format!("192.0.2.{}", host);
        prober.ping(&ip, Answer::Hang);
        prober.all_ports(&ip, Answer::Hang);
    }
    let budget = Duration::from_secs(2);
    let config = fast_config(1).with_discovery(DiscoverySettings {
        concurrency: 16,
        scan_budget: budget,
        ..DiscoverySettings::default()
    });
    let engine = engine(config, prober, FakeNetwork::lan());

    let started = tokio::time::Instant::now();
    let devices = engine
        .scan(Some(AddressRange::parse("192.0.2.0/24").unwrap()))
        .await
        .unwrap();

    assert!(devices.is_empty());
    assert!(started.elapsed() <= budget + Duration::from_millis(500));
}

#[tokio::test]
async fn missing_interface_is_discovery_failed() {
    let engine = engine(fast_config(1), ScriptedProber::new(), FakeNetwork::without_interface());

    let result = engine
        .scan(Some(AddressRange::parse("192.0.2.0/30").unwrap()))
        .await;

    assert!(matches!(result, Err(EngineError::DiscoveryFailed(_))));
}

#[test]
fn malformed_range_is_invalid_target() {
    for raw in ["192.0.2.0/33", "not-an-address", "192.0.2.20-192.0.2.10", ""] {
        assert!(
            matches!(AddressRange::parse(raw), Err(EngineError::InvalidTarget { .. })),
            "{raw} should be rejected"
        );
    }
}

#[tokio::test]
async fn default_range_is_local_subnet() {
    let prober = ScriptedProber::new();
    prober.ping("192.0.2.100", Answer::Reply(Duration::from_millis(1)));
    let engine = engine(fast_config(1), prober, FakeNetwork::lan());

    let devices = engine.scan(None).await.unwrap();

    assert_eq!(devices.len(), 1);
    // The scanning host reports its own interface MAC
    assert_eq!(devices[0].mac.as_deref(), Some("02:00:5e:00:00:64"));
}

#[tokio::test]
async fn trigger_scan_delivers_result_to_callback() {
    let prober = ScriptedProber::new();
    prober.ping("192.0.2.1", Answer::Reply(Duration::from_millis(1)));
    let engine = engine(fast_config(1), prober, FakeNetwork::lan());
    let (tx, rx) = tokio::sync::oneshot::channel();

    let handle = engine.trigger_scan(Some(AddressRange::parse("192.0.2.1").unwrap()), move |result| {
        let _ = tx.send(result);
    });

    let devices = rx.await.unwrap().unwrap();
    handle.await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(engine.inventory().len(), 1);
}

async fn peak_calls_with_concurrency(concurrency: usize) -> (usize, u32) {
    let prober = ScriptedProber::new();
    for host in 10..=13u8 {
        prober.ping(&format!("192.0.2.{}", host), Answer::Reply(Duration::from_millis(1)));
    }
    prober.set_ping_delay(Duration::from_millis(10));
    prober.set_port_delay(Duration::from_millis(10));
    let config = fast_config(1).with_discovery(DiscoverySettings {
        concurrency,
        resolve_hostnames: false,
        ..DiscoverySettings::default()
    });
    let engine = engine(config, prober.clone(), FakeNetwork::lan());

    let range = AddressRange::parse("192.0.2.10-13").unwrap();
    let devices = engine.scan(Some(range)).await.unwrap();

    (devices.len(), prober.peak_in_flight())
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_covers_classification_ports() {
    assert_eq!(peak_calls_with_concurrency(1).await, (4, 1));
    assert_eq!(peak_calls_with_concurrency(2).await, (4, 2));
}
