//! Tests for entry-point argument handling

use shared_line_appearance::builders::EngineBuilder;
use shared_line_appearance::config::SlaConfig;
use shared_line_appearance::core::{
    Channel, ChannelHandle, DeviceState, Engine, SlaError, StationStatus, TrunkStatus,
    STATION_STATUS_VAR, TRUNK_STATUS_VAR,
};
use shared_line_appearance::infra::memory::{MemoryChannel, MemoryServices};

fn engine() -> (MemoryServices, Engine) {
    let cfg = SlaConfig::from_json_str(
        r#"{
            "trunks": [{ "name": "line1", "device": "DAHDI/1" }],
            "stations": [{ "name": "s1", "device": "SIP/s1", "trunks": [{ "name": "line1" }] }]
        }"#,
    )
    .unwrap();
    let services = MemoryServices::new();
    let engine = EngineBuilder::new(services.collaborators())
        .with_config(cfg)
        .build()
        .unwrap();
    (services, engine)
}

#[test]
fn test_status_strings() {
    assert_eq!(StationStatus::Congestion.as_str(), "CONGESTION");
    assert_eq!(TrunkStatus::RingTimeout.as_str(), "RINGTIMEOUT");
    assert_eq!(TrunkStatus::parse("UNANSWERED"), Some(TrunkStatus::Unanswered));
    assert_eq!(TrunkStatus::parse("BUSY"), None);
}

#[test]
fn test_station_exec_rejects_bad_arguments() {
    let (_services, engine) = engine();
    for data in ["", "_line1", "s9", "s9_line1"] {
        let chan = MemoryChannel::new("SIP/x-0001");
        let leg: ChannelHandle = chan.clone();
        assert_eq!(engine.station_exec(&leg, data), StationStatus::Failure, "{}", data);
        assert_eq!(chan.var(STATION_STATUS_VAR).as_deref(), Some("FAILURE"));
    }
    engine.shutdown();
}

#[test]
fn test_station_exec_unknown_trunk_is_congestion() {
    let (_services, engine) = engine();
    let leg: ChannelHandle = MemoryChannel::new("SIP/s1-0001");
    assert_eq!(engine.station_exec(&leg, "s1_line9"), StationStatus::Congestion);
    engine.shutdown();
}

#[test]
fn test_trunk_exec_rejects_bad_arguments() {
    let (_services, engine) = engine();
    let chan = MemoryChannel::new("DAHDI/1-0001");
    let leg: ChannelHandle = chan.clone();

    let err = engine.trunk_exec(&leg, "line1,X").unwrap_err();
    assert!(matches!(err, SlaError::InvalidArgument(_)));
    assert_eq!(chan.var(TRUNK_STATUS_VAR).as_deref(), Some("FAILURE"));

    assert!(engine.trunk_exec(&leg, "").is_err());
    assert_eq!(engine.trunk_exec(&leg, "line9").unwrap(), TrunkStatus::Failure);
    engine.shutdown();
}

#[test]
fn test_device_state_lookup() {
    let (_services, engine) = engine();
    assert_eq!(engine.device_state("s1_line1"), DeviceState::NotInUse);
    assert_eq!(engine.device_state("s1_LINE1"), DeviceState::NotInUse);
    assert_eq!(engine.device_state("s1_line9"), DeviceState::Invalid);
    assert_eq!(engine.device_state("s9_line1"), DeviceState::Invalid);
    assert_eq!(engine.device_state("s1"), DeviceState::Invalid);
    engine.shutdown();
}
