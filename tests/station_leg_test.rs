//! Stations going off-hook: seizing idle trunks and picking up ringing ones.

mod common;

use shared_line_appearance::core::{
    CallerId, Channel, DeviceState, DialResult, Indication, StationStatus, TrunkStatus,
};
use shared_line_appearance::infra::memory::DialScript;

use common::{wait_until, Harness, WAIT};

const CONFIG: &str = r#"{
    "trunks": [
        { "name": "line1", "device": "DAHDI/1" },
        { "name": "line2", "device": "DAHDI/2" }
    ],
    "stations": [
        { "name": "s1", "device": "SIP/s1", "trunks": [{ "name": "line1" }, { "name": "line2" }] },
        { "name": "s2", "device": "SIP/s2", "trunks": [{ "name": "line1" }] }
    ]
}"#;

// ============================================================================
// Outbound seizure
// ============================================================================

#[test]
fn test_seize_first_idle_trunk() {
    let h = Harness::new(CONFIG);
    h.services.dialer.script("DAHDI/1", DialScript::Answer);

    let s1 = h.off_hook("s1");
    assert!(h.wait_for_conference("SLA_line1", 2));
    assert!(h.services.devices.wait_for("SLA:s1_line1", DeviceState::InUse, WAIT));
    assert!(h.services.devices.wait_for("SLA:s2_line1", DeviceState::InUse, WAIT));
    assert_eq!(h.services.dialer.dial_count("DAHDI/2"), 0);
    assert!(s1.chan.is_answered());

    // line1 is busy now, so the next idle trunk for s1 is line2.
    h.services.dialer.script("DAHDI/2", DialScript::Answer);
    let s1b = h.off_hook("s1");
    assert!(h.wait_for_conference("SLA_line2", 2));
    assert_eq!(h.engine.device_state("s1_line2"), DeviceState::InUse);

    assert_eq!(s1b.hang_up(), StationStatus::Success);
    assert_eq!(s1.hang_up(), StationStatus::Success);
    let line = h.services.dialer.answered_channel("DAHDI/1").unwrap();
    assert!(line.wait_for_hangup(WAIT));
    assert!(h.services.devices.wait_for("SLA:s1_line1", DeviceState::NotInUse, WAIT));
    assert!(wait_until(WAIT, || !h.trunk("line1").has_channel()));
}

#[test]
fn test_seize_relays_ringing_until_answer() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;

    let s2 = h.off_hook("s2_line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("DAHDI/1")));
    assert!(wait_until(WAIT, || s2.chan.indications().contains(&Indication::Ringing)));
    assert!(!h.trunk("line1").has_channel());
    assert!(h.services.devices.wait_for("SLA:s2_line1", DeviceState::InUse, WAIT));

    let line = dialer.answer("DAHDI/1").unwrap();
    assert!(h.wait_for_conference("SLA_line1", 2));
    assert!(h.trunk("line1").has_channel());
    let ringing = s2
        .chan
        .indications()
        .iter()
        .filter(|i| **i == Indication::Ringing)
        .count();
    assert_eq!(ringing, 1);

    // The far end hanging up ends the station's call too.
    line.hang_up();
    assert_eq!(s2.finish(), StationStatus::Success);
    assert!(h.services.devices.wait_for("SLA:s2_line1", DeviceState::NotInUse, WAIT));
}

#[test]
fn test_failed_seizure_is_congestion() {
    let h = Harness::new(CONFIG);
    h.services.dialer.script("DAHDI/1", DialScript::Fail(DialResult::Failed));

    let s2 = h.off_hook("s2");
    let chan = std::sync::Arc::clone(&s2.chan);
    assert_eq!(s2.finish(), StationStatus::Congestion);
    assert_eq!(chan.var("SLASTATION_STATUS").as_deref(), Some("CONGESTION"));
    assert_eq!(h.engine.device_state("s2_line1"), DeviceState::NotInUse);
    assert!(!h.engine.find_station("s2").unwrap().trunk_refs()[0].has_channel());
}

#[test]
fn test_far_end_rejects_seizure() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;

    let s2 = h.off_hook("s2_line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("DAHDI/1")));
    assert!(dialer.end("DAHDI/1", DialResult::Unanswered));
    assert_eq!(s2.finish(), StationStatus::Congestion);
    assert!(h.services.devices.wait_for("SLA:s2_line1", DeviceState::NotInUse, WAIT));
}

#[test]
fn test_station_hangup_abandons_seizure() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;

    let s2 = h.off_hook("s2_line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("DAHDI/1")));
    assert_eq!(s2.hang_up(), StationStatus::Congestion);
    assert!(wait_until(WAIT, || dialer.live_dials("DAHDI/1") == 0));
    assert!(!h.trunk("line1").has_channel());
}

#[test]
fn test_idle_station_device_abandons_seizure() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;

    let s2 = h.off_hook("s2_line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("DAHDI/1")));
    h.services.devices.set_device_state("SIP/s2", DeviceState::NotInUse);
    assert_eq!(s2.finish(), StationStatus::Congestion);
    assert!(wait_until(WAIT, || dialer.live_dials("DAHDI/1") == 0));
}

#[test]
fn test_no_idle_trunk_is_congestion() {
    let h = Harness::new(CONFIG);
    h.services.dialer.script("DAHDI/1", DialScript::Answer);
    let s1 = h.off_hook("s1_line1");
    assert!(h.wait_for_conference("SLA_line1", 2));

    let s2 = h.off_hook("s2");
    assert_eq!(s2.finish(), StationStatus::Congestion);
    assert_eq!(s1.hang_up(), StationStatus::Success);
}

#[test]
fn test_caller_id_hidden_from_trunk() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;
    let s2 = h.off_hook("s2_line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("DAHDI/1")));
    assert_eq!(dialer.last_caller_id("DAHDI/1"), Some(CallerId::default()));
    assert_eq!(s2.hang_up(), StationStatus::Congestion);
}

// ============================================================================
// Picking up a ringing trunk
// ============================================================================

#[test]
fn test_line_key_picks_up_ringing_trunk() {
    let h = Harness::new(CONFIG);
    let dialer = &h.services.dialer;
    let call = h.call_trunk("line1");
    assert!(wait_until(WAIT, || dialer.is_ringing("SIP/s1") && dialer.is_ringing("SIP/s2")));

    let s2 = h.off_hook("s2_line1");
    assert!(h.wait_for_conference("SLA_line1", 2));
    assert!(call.chan.is_answered());
    assert!(wait_until(WAIT, || dialer.live_dials("SIP/s1") + dialer.live_dials("SIP/s2") == 0));
    assert!(h.services.devices.wait_for("SLA:s1_line1", DeviceState::InUse, WAIT));
    assert_eq!(h.engine.ringing_trunk_count(), 0);
    assert_eq!(dialer.dial_count("DAHDI/1"), 0);

    assert_eq!(s2.hang_up(), StationStatus::Success);
    assert_eq!(call.finish(), TrunkStatus::Success);
    assert!(h.services.devices.wait_for("SLA:s2_line1", DeviceState::NotInUse, WAIT));
}
