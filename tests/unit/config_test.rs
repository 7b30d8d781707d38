//! Tests for configuration validation

use std::time::Duration;

use shared_line_appearance::config::{
    GeneralConfig, SlaConfig, StationConfig, StationTrunkConfig, TrunkConfig,
};
use shared_line_appearance::core::HoldAccess;

fn trunk(name: &str) -> TrunkConfig {
    TrunkConfig {
        name: name.to_string(),
        device: format!("SIP/{}", name),
        autocontext: None,
        ring_timeout_secs: None,
        barge: true,
        hold: HoldAccess::Open,
    }
}

fn station(name: &str, trunks: &[&str]) -> StationConfig {
    StationConfig {
        name: name.to_string(),
        device: format!("SIP/{}", name),
        autocontext: None,
        ring_timeout_secs: None,
        ring_delay_secs: None,
        hold: HoldAccess::Open,
        trunks: trunks
            .iter()
            .map(|t| StationTrunkConfig {
                name: t.to_string(),
                ring_timeout_secs: None,
                ring_delay_secs: None,
            })
            .collect(),
    }
}

#[test]
fn test_valid_config() {
    let cfg = SlaConfig {
        general: GeneralConfig::default(),
        trunks: vec![trunk("line1"), trunk("line2")],
        stations: vec![station("s1", &["line1", "line2"]), station("s2", &["line1"])],
    };
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_invalid_trunk_device() {
    let mut bad = trunk("line1");
    bad.device = "line1".to_string();
    let cfg = SlaConfig {
        trunks: vec![bad],
        ..SlaConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("invalid device"), "{}", err);
}

#[test]
fn test_station_name_with_underscore() {
    let cfg = SlaConfig {
        trunks: vec![trunk("line1")],
        stations: vec![station("desk_1", &["line1"])],
        ..SlaConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_unknown_trunk_reference() {
    let cfg = SlaConfig {
        trunks: vec![trunk("line1")],
        stations: vec![station("s1", &["line7"])],
        ..SlaConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("unknown trunk `line7`"), "{}", err);
}

#[test]
fn test_duplicate_names() {
    let cfg = SlaConfig {
        trunks: vec![trunk("line1"), trunk("LINE1")],
        ..SlaConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = SlaConfig {
        trunks: vec![trunk("line1")],
        stations: vec![station("s1", &["line1", "line1"])],
        ..SlaConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_json_defaults() {
    let cfg = SlaConfig::from_json_str(
        r#"{
            "trunks": [{ "name": "line1", "device": "DAHDI/1" }],
            "stations": [{ "name": "s1", "device": "SIP/s1", "trunks": [{ "name": "line1" }] }]
        }"#,
    )
    .unwrap();
    assert!(!cfg.general.attempt_callerid);
    assert!(cfg.trunks[0].barge);
    assert_eq!(cfg.trunks[0].hold, HoldAccess::Open);
    assert_eq!(cfg.stations[0].trunks.len(), 1);
}

#[test]
fn test_zero_seconds_means_unset() {
    let mut t = trunk("line1");
    t.ring_timeout_secs = Some(0);
    assert_eq!(t.settings().ring_timeout, None);

    t.ring_timeout_secs = Some(30);
    t.barge = false;
    t.hold = HoldAccess::Private;
    let settings = t.settings();
    assert_eq!(settings.ring_timeout, Some(Duration::from_secs(30)));
    assert!(settings.barge_disabled);
    assert_eq!(settings.hold_access, HoldAccess::Private);

    let pair = StationTrunkConfig {
        name: "line1".to_string(),
        ring_timeout_secs: Some(0),
        ring_delay_secs: Some(5),
    };
    assert_eq!(pair.ring_timeout(), None);
    assert_eq!(pair.ring_delay(), Some(Duration::from_secs(5)));
}

#[test]
fn test_parse_error_is_reported() {
    let err = SlaConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"), "{}", err);
}

#[test]
fn test_missing_file() {
    let err = SlaConfig::from_json_file("/nonexistent/sla.json").unwrap_err();
    assert!(format!("{:#}", err).contains("reading /nonexistent/sla.json"));
}
