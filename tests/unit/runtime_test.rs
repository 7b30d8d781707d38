//! Tests for the thread spawner and introspection API

use std::time::Duration;

use shared_line_appearance::builders::EngineBuilder;
use shared_line_appearance::config::SlaConfig;
use shared_line_appearance::core::{HoldAccess, Spawn, TrunkState};
use shared_line_appearance::infra::memory::MemoryServices;
use shared_line_appearance::runtime::{engine_status, list_stations, list_trunks, ThreadSpawner};

#[test]
fn test_thread_spawner_spawn() {
    let spawner = ThreadSpawner::new();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = spawner
        .spawn(
            "sla-test",
            Box::new(move || {
                tx.send(123).unwrap();
            }),
        )
        .unwrap();

    let result = rx.recv_timeout(Duration::from_secs(5)).expect("spawned result");
    assert_eq!(result, 123);
    assert_eq!(handle.thread().name(), Some("sla-test"));
    handle.join().unwrap();
}

#[test]
fn test_snapshots_of_configured_engine() {
    let cfg = SlaConfig::from_json_str(
        r#"{
            "trunks": [
                { "name": "line1", "device": "DAHDI/1", "ring_timeout_secs": 20 },
                { "name": "line2", "device": "DAHDI/2", "barge": false, "hold": "private" }
            ],
            "stations": [
                { "name": "s1", "device": "SIP/s1", "ring_delay_secs": 2,
                  "trunks": [{ "name": "line2" }, { "name": "line1", "ring_timeout_secs": 10 }] },
                { "name": "s2", "device": "SIP/s2", "trunks": [{ "name": "line1" }] }
            ]
        }"#,
    )
    .unwrap();
    let services = MemoryServices::new();
    let engine = EngineBuilder::new(services.collaborators())
        .with_config(cfg)
        .build()
        .unwrap();

    let trunks = list_trunks(&engine);
    assert_eq!(trunks.len(), 2);
    assert_eq!(trunks[0].name, "line1");
    assert_eq!(trunks[0].stations, vec!["s1", "s2"]);
    assert_eq!(trunks[0].ring_timeout_secs, Some(20));
    assert!(!trunks[1].barge);
    assert_eq!(trunks[1].hold, HoldAccess::Private);

    let stations = list_stations(&engine);
    let s1 = &stations[0];
    assert_eq!(s1.ring_delay_secs, Some(2));
    let order: Vec<_> = s1.trunks.iter().map(|t| t.trunk.as_str()).collect();
    assert_eq!(order, vec!["line2", "line1"]);
    assert_eq!(s1.trunks[1].ring_timeout_secs, Some(10));
    assert!(s1.trunks.iter().all(|t| t.state == TrunkState::Idle));

    let status = engine_status(&engine);
    assert!(status.running);
    assert_eq!(status.trunks, 2);
    assert_eq!(status.stations, 2);
    assert_eq!(status.ringing_trunks, 0);
    assert!(status.ringing_stations.is_empty());

    let json = serde_json::to_string(&status).unwrap();
    assert!(json.contains("\"running\":true"));

    engine.shutdown();
    assert!(!engine_status(&engine).running);
}
