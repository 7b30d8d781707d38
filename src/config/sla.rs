//! Trunk and station configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::model::{HoldAccess, StationSettings, TrunkSettings};
use crate::core::AppResult;

/// Options that apply to the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Pass the caller's identity to stations and trunks being dialed.
    #[serde(default)]
    pub attempt_callerid: bool,
}

/// A trunk definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkConfig {
    /// Trunk name.
    pub name: String,
    /// Dial target, `tech/resource`.
    pub device: String,
    /// Dialplan context to register an `s` extension in.
    #[serde(default)]
    pub autocontext: Option<String>,
    /// Inbound ring timeout in seconds; zero means none.
    #[serde(default)]
    pub ring_timeout_secs: Option<u64>,
    /// Whether stations may join a call already up.
    #[serde(default = "default_barge")]
    pub barge: bool,
    /// Hold retrieval policy.
    #[serde(default)]
    pub hold: HoldAccess,
}

const fn default_barge() -> bool {
    true
}

/// One trunk on a station, with per-pair overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationTrunkConfig {
    /// Name of a configured trunk.
    pub name: String,
    /// Ring timeout for this trunk on this station, in seconds.
    #[serde(default)]
    pub ring_timeout_secs: Option<u64>,
    /// Ring delay for this trunk on this station, in seconds.
    #[serde(default)]
    pub ring_delay_secs: Option<u64>,
}

/// A station definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station name.
    pub name: String,
    /// Dial target, `tech/resource`.
    pub device: String,
    /// Dialplan context to register line-key extensions in.
    #[serde(default)]
    pub autocontext: Option<String>,
    /// Station ring timeout in seconds.
    #[serde(default)]
    pub ring_timeout_secs: Option<u64>,
    /// Station ring delay in seconds.
    #[serde(default)]
    pub ring_delay_secs: Option<u64>,
    /// Hold retrieval policy for calls this station parks.
    #[serde(default)]
    pub hold: HoldAccess,
    /// Trunks in priority order.
    #[serde(default)]
    pub trunks: Vec<StationTrunkConfig>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Engine-wide options.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Trunk definitions.
    #[serde(default)]
    pub trunks: Vec<TrunkConfig>,
    /// Station definitions.
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

fn secs(value: Option<u64>) -> Option<Duration> {
    value.filter(|s| *s > 0).map(Duration::from_secs)
}

fn check_device(device: &str) -> Result<(), String> {
    match device.split_once('/') {
        Some((tech, resource)) if !tech.is_empty() && !resource.is_empty() => Ok(()),
        _ => Err(format!("invalid device `{device}`")),
    }
}

fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    Ok(())
}

fn non_empty(context: Option<&String>) -> Option<String> {
    context.filter(|c| !c.is_empty()).cloned()
}

impl TrunkConfig {
    /// Validate a single trunk definition.
    pub fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_device(&self.device)
    }

    /// Live settings for this definition.
    #[must_use]
    pub fn settings(&self) -> TrunkSettings {
        TrunkSettings {
            device: self.device.clone(),
            autocontext: non_empty(self.autocontext.as_ref()),
            ring_timeout: secs(self.ring_timeout_secs),
            barge_disabled: !self.barge,
            hold_access: self.hold,
        }
    }
}

impl StationTrunkConfig {
    /// Per-pair ring timeout.
    #[must_use]
    pub fn ring_timeout(&self) -> Option<Duration> {
        secs(self.ring_timeout_secs)
    }

    /// Per-pair ring delay.
    #[must_use]
    pub fn ring_delay(&self) -> Option<Duration> {
        secs(self.ring_delay_secs)
    }
}

impl StationConfig {
    /// Validate a single station definition.
    ///
    /// Station names may not contain `_`, which separates the station from
    /// the trunk in line-key identifiers.
    pub fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        if self.name.contains('_') {
            return Err("name must not contain `_`".into());
        }
        check_device(&self.device)?;
        let mut seen = HashSet::new();
        for trunk in &self.trunks {
            if !seen.insert(trunk.name.to_lowercase()) {
                return Err(format!("trunk `{}` listed twice", trunk.name));
            }
        }
        Ok(())
    }

    /// Live settings for this definition.
    #[must_use]
    pub fn settings(&self) -> StationSettings {
        StationSettings {
            device: self.device.clone(),
            autocontext: non_empty(self.autocontext.as_ref()),
            ring_timeout: secs(self.ring_timeout_secs),
            ring_delay: secs(self.ring_delay_secs),
            hold_access: self.hold,
        }
    }
}

impl SlaConfig {
    /// Validate every definition and cross-references between them.
    pub fn validate(&self) -> Result<(), String> {
        let mut trunks = HashSet::new();
        for trunk in &self.trunks {
            trunk
                .validate()
                .map_err(|e| format!("trunk `{}` invalid: {e}", trunk.name))?;
            if !trunks.insert(trunk.name.to_lowercase()) {
                return Err(format!("trunk `{}` defined twice", trunk.name));
            }
        }

        let mut stations = HashSet::new();
        for station in &self.stations {
            station
                .validate()
                .map_err(|e| format!("station `{}` invalid: {e}", station.name))?;
            if !stations.insert(station.name.to_lowercase()) {
                return Err(format!("station `{}` defined twice", station.name));
            }
            if let Some(missing) = station
                .trunks
                .iter()
                .find(|t| !trunks.contains(&t.name.to_lowercase()))
            {
                return Err(format!(
                    "station `{}` references unknown trunk `{}`",
                    station.name, missing.name
                ));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "general": { "attempt_callerid": true },
        "trunks": [
            { "name": "line1", "device": "SIP/line1", "ring_timeout_secs": 30, "hold": "private" },
            { "name": "line2", "device": "SIP/line2", "barge": false }
        ],
        "stations": [
            {
                "name": "s1",
                "device": "SIP/s1",
                "ring_delay_secs": 5,
                "trunks": [
                    { "name": "line1", "ring_timeout_secs": 0 },
                    { "name": "LINE2", "ring_delay_secs": 2 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let cfg = SlaConfig::from_json_str(SAMPLE).unwrap();
        assert!(cfg.general.attempt_callerid);
        let line1 = cfg.trunks[0].settings();
        assert_eq!(line1.ring_timeout, Some(Duration::from_secs(30)));
        assert_eq!(line1.hold_access, HoldAccess::Private);
        assert!(!line1.barge_disabled);
        assert!(cfg.trunks[1].settings().barge_disabled);

        let s1 = &cfg.stations[0];
        assert_eq!(s1.settings().ring_delay, Some(Duration::from_secs(5)));
        assert_eq!(s1.trunks[0].ring_timeout(), None);
        assert_eq!(s1.trunks[1].ring_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_rejects_bad_device() {
        let err = SlaConfig::from_json_str(
            r#"{ "trunks": [ { "name": "line1", "device": "SIP" } ] }"#,
        )
        .unwrap_err();
        assert!(err.contains("invalid device"));
    }

    #[test]
    fn test_rejects_unknown_trunk_reference() {
        let err = SlaConfig::from_json_str(
            r#"{ "stations": [ { "name": "s1", "device": "SIP/s1", "trunks": [ { "name": "line9" } ] } ] }"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown trunk `line9`"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let cfg = SlaConfig {
            trunks: vec![
                TrunkConfig {
                    name: "line1".into(),
                    device: "SIP/a".into(),
                    autocontext: None,
                    ring_timeout_secs: None,
                    barge: true,
                    hold: HoldAccess::Open,
                },
                TrunkConfig {
                    name: "LINE1".into(),
                    device: "SIP/b".into(),
                    autocontext: None,
                    ring_timeout_secs: None,
                    barge: true,
                    hold: HoldAccess::Open,
                },
            ],
            ..SlaConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("defined twice"));
    }

    #[test]
    fn test_rejects_underscore_in_station_name() {
        let err = SlaConfig::from_json_str(
            r#"{ "stations": [ { "name": "front_desk", "device": "SIP/fd" } ] }"#,
        )
        .unwrap_err();
        assert!(err.contains("must not contain"));
    }
}
