//! Tests for error types

use shared_line_appearance::core::SlaError;

#[test]
fn test_invalid_argument_error() {
    let err = SlaError::InvalidArgument("option `X`".to_string());
    assert_eq!(format!("{}", err), "invalid argument: option `X`");
}

#[test]
fn test_not_found_error() {
    let err = SlaError::NotFound("trunk line9".to_string());
    assert_eq!(format!("{}", err), "not found: trunk line9");
}

#[test]
fn test_dialer_unavailable_error() {
    let err = SlaError::DialerUnavailable("no channels".to_string());
    assert_eq!(format!("{}", err), "dialer unavailable: no channels");
}

#[test]
fn test_spawn_error() {
    let err = SlaError::Spawn("sla-ring-s1: out of memory".to_string());
    assert_eq!(format!("{}", err), "spawn failed: sla-ring-s1: out of memory");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SlaError::Shutdown), "engine shut down");
}

#[test]
fn test_error_converts_into_anyhow() {
    fn load() -> shared_line_appearance::core::AppResult<()> {
        Err(SlaError::InvalidConfig("bad".to_string()))?;
        Ok(())
    }
    let err = load().unwrap_err();
    assert_eq!(format!("{}", err), "invalid configuration: bad");
}
