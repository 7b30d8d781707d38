//! Mark-and-sweep reconciliation of a new configuration into the live
//! trunks and stations.
//!
//! Every object and membership record is marked, the configuration clears
//! the marks of what it still describes (creating what is new), and the
//! sweep drops whatever stayed marked. A pairing whose station is engaged
//! in the trunk's call survives the sweep and is removed by a later reload.
//! Live objects are updated in place, so call legs already holding them
//! carry on undisturbed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{SlaConfig, StationConfig, StationTrunkConfig, TrunkConfig};
use crate::core::collaborator::{Extension, ExtensionPriority};
use crate::core::engine::{Engine, Shared, REGISTRAR};
use crate::core::model::{pairing_device, Station, StationRef, Trunk, TrunkRef};
use crate::core::SlaError;

/// What a reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSummary {
    /// Trunks created.
    pub trunks_added: usize,
    /// Existing trunks whose settings were refreshed.
    pub trunks_updated: usize,
    /// Trunks evicted.
    pub trunks_removed: usize,
    /// Stations created.
    pub stations_added: usize,
    /// Existing stations whose settings were refreshed.
    pub stations_updated: usize,
    /// Stations evicted.
    pub stations_removed: usize,
    /// Station/trunk pairings created.
    pub refs_added: usize,
    /// Station/trunk pairings removed.
    pub refs_removed: usize,
    /// Removed pairings kept until their call ends.
    pub refs_deferred: usize,
}

fn line_key(station: &str, trunk: &str) -> String {
    format!("{station}_{trunk}")
}

impl Engine {
    /// Merge `config` into the live registry.
    ///
    /// The configuration is validated as a whole first; an invalid one
    /// leaves everything untouched. Starts the coordinator loop once
    /// anything is configured.
    ///
    /// # Errors
    ///
    /// [`SlaError::InvalidConfig`] for a configuration that does not
    /// validate, or the spawner's error if the coordinator cannot start.
    pub fn reload(&self, config: &SlaConfig) -> Result<ReloadSummary, SlaError> {
        config.validate().map_err(SlaError::InvalidConfig)?;
        let shared = &self.shared;
        let _guard = shared.reload_lock.lock();

        shared
            .attempt_callerid
            .store(config.general.attempt_callerid, Ordering::Release);

        let mut summary = ReloadSummary::default();
        mark_all(shared);
        for trunk in &config.trunks {
            build_trunk(shared, trunk, &mut summary);
        }
        for station in &config.stations {
            build_station(shared, station, &mut summary);
        }
        sweep_trunks(shared, &mut summary);
        sweep_stations(shared, &mut summary);

        tracing::info!(
            trunks = shared.trunks.len(),
            stations = shared.stations.len(),
            ?summary,
            "configuration reloaded"
        );

        if !shared.trunks.is_empty() || !shared.stations.is_empty() {
            shared.ensure_coordinator()?;
        }
        Ok(summary)
    }
}

fn mark_all(shared: &Shared) {
    for trunk in shared.trunks.snapshot() {
        let mut inner = trunk.lock();
        inner.mark = true;
        for station_ref in &mut inner.stations {
            station_ref.mark = true;
        }
    }
    for station in shared.stations.snapshot() {
        let mut inner = station.lock();
        inner.mark = true;
        for trunk_ref in &inner.trunks {
            trunk_ref.lock().mark = true;
        }
    }
}

fn add_extension(shared: &Shared, context: &str, extension: Extension) {
    let exten = extension.exten.clone();
    if let Err(e) = shared.collab.dialplan.add_extension(context, REGISTRAR, extension) {
        tracing::error!(context = %context, exten = %exten, error = %e, "could not register extension");
    }
}

fn add_trunk_extensions(shared: &Shared, trunk: &Trunk, context: &str) {
    add_extension(
        shared,
        context,
        Extension {
            exten: "s".into(),
            priority: ExtensionPriority::Step(1),
            app: "SLATrunk".into(),
            data: Some(trunk.name().to_owned()),
        },
    );
}

fn remove_trunk_extensions(shared: &Shared, context: &str) {
    shared
        .collab
        .dialplan
        .remove_extension(context, "s", ExtensionPriority::Step(1), REGISTRAR);
}

fn add_line_key_extensions(shared: &Shared, context: &str, station: &str, trunk: &str) {
    let exten = line_key(station, trunk);
    add_extension(
        shared,
        context,
        Extension {
            exten: exten.clone(),
            priority: ExtensionPriority::Step(1),
            app: "SLAStation".into(),
            data: Some(exten.clone()),
        },
    );
    add_extension(
        shared,
        context,
        Extension {
            exten,
            priority: ExtensionPriority::Hint,
            app: pairing_device(station, trunk),
            data: None,
        },
    );
}

fn remove_line_key_extensions(shared: &Shared, context: &str, station: &str, trunk: &str) {
    let exten = line_key(station, trunk);
    let dialplan = &shared.collab.dialplan;
    dialplan.remove_extension(context, &exten, ExtensionPriority::Step(1), REGISTRAR);
    dialplan.remove_extension(context, &exten, ExtensionPriority::Hint, REGISTRAR);
}

fn remove_station_extensions(shared: &Shared, station: &Station, context: &str) {
    shared
        .collab
        .dialplan
        .remove_extension(context, station.name(), ExtensionPriority::Step(1), REGISTRAR);
    for trunk_ref in station.trunk_refs() {
        remove_line_key_extensions(shared, context, station.name(), trunk_ref.trunk().name());
    }
}

fn build_trunk(shared: &Shared, config: &TrunkConfig, summary: &mut ReloadSummary) {
    let settings = config.settings();
    let (trunk, created) = shared
        .trunks
        .upsert(Arc::new(Trunk::new(config.name.clone(), settings.clone())));

    let previous_context = {
        let mut inner = trunk.lock();
        inner.mark = false;
        if created {
            None
        } else {
            std::mem::replace(&mut inner.settings, settings.clone()).autocontext
        }
    };
    if created {
        summary.trunks_added += 1;
        tracing::debug!(trunk = %trunk.name(), "trunk created");
    } else {
        summary.trunks_updated += 1;
    }

    if let Some(old) = previous_context.filter(|old| settings.autocontext.as_ref() != Some(old)) {
        remove_trunk_extensions(shared, &old);
    }
    if let Some(context) = &settings.autocontext {
        add_trunk_extensions(shared, &trunk, context);
    }
}

fn build_station(shared: &Shared, config: &StationConfig, summary: &mut ReloadSummary) {
    let settings = config.settings();
    let (station, created) = shared
        .stations
        .upsert(Arc::new(Station::new(config.name.clone(), settings.clone())));

    let previous_context = {
        let mut inner = station.lock();
        inner.mark = false;
        if created {
            None
        } else {
            std::mem::replace(&mut inner.settings, settings.clone()).autocontext
        }
    };
    if created {
        summary.stations_added += 1;
        tracing::debug!(station = %station.name(), "station created");
    } else {
        summary.stations_updated += 1;
    }

    if let Some(old) = previous_context.filter(|old| settings.autocontext.as_ref() != Some(old)) {
        remove_station_extensions(shared, &station, &old);
    }

    for trunk_config in &config.trunks {
        add_trunk_to_station(shared, &station, trunk_config, summary);
    }

    if let Some(context) = &settings.autocontext {
        add_extension(
            shared,
            context,
            Extension {
                exten: station.name().to_owned(),
                priority: ExtensionPriority::Step(1),
                app: "SLAStation".into(),
                data: Some(station.name().to_owned()),
            },
        );
        for trunk_config in &config.trunks {
            if let Some(trunk) = shared.trunks.find(&trunk_config.name) {
                add_line_key_extensions(shared, context, station.name(), trunk.name());
            }
        }
    }
}

fn add_trunk_to_station(
    shared: &Shared,
    station: &Arc<Station>,
    config: &StationTrunkConfig,
    summary: &mut ReloadSummary,
) {
    let Some(trunk) = shared.trunks.find(&config.name) else {
        tracing::warn!(station = %station.name(), trunk = %config.name, "trunk not configured");
        return;
    };

    match station.find_ref(&trunk) {
        Some(trunk_ref) => {
            let mut inner = trunk_ref.lock();
            inner.mark = false;
            inner.ring_timeout = config.ring_timeout();
            inner.ring_delay = config.ring_delay();
        }
        None => {
            let trunk_ref = TrunkRef::new(Arc::clone(&trunk), config.ring_timeout(), config.ring_delay());
            station.lock().trunks.push(Arc::new(trunk_ref));
            summary.refs_added += 1;
            tracing::debug!(station = %station.name(), trunk = %trunk.name(), "trunk added to station");
        }
    }

    let mut inner = trunk.lock();
    match inner.stations.iter_mut().find(|r| r.is(station)) {
        Some(station_ref) => station_ref.mark = false,
        None => inner.stations.push(StationRef::new(station)),
    }
}

fn sweep_trunks(shared: &Shared, summary: &mut ReloadSummary) {
    for trunk in shared.trunks.snapshot() {
        let mut guard = trunk.lock();
        let inner = &mut *guard;
        inner
            .stations
            .retain(|r| !r.mark || inner.active.contains(&r.station_name));
        if !inner.mark {
            continue;
        }
        let context = inner.settings.autocontext.clone();
        drop(guard);

        shared.trunks.remove(trunk.name());
        if let Some(context) = context {
            remove_trunk_extensions(shared, &context);
        }
        summary.trunks_removed += 1;
        tracing::info!(trunk = %trunk.name(), "trunk removed");
    }
}

fn sweep_stations(shared: &Shared, summary: &mut ReloadSummary) {
    for station in shared.stations.snapshot() {
        let (marked, context) = {
            let inner = station.lock();
            (inner.mark, inner.settings.autocontext.clone())
        };

        if marked {
            if let Some(context) = &context {
                remove_station_extensions(shared, &station, context);
            }
            shared.stations.remove(station.name());
            let released = std::mem::take(&mut station.lock().trunks);
            summary.refs_removed += released.len();
            summary.stations_removed += 1;
            tracing::info!(station = %station.name(), "station removed");
            continue;
        }

        for trunk_ref in station.trunk_refs() {
            if !trunk_ref.lock().mark {
                continue;
            }
            let trunk = trunk_ref.trunk();
            if trunk.lock().is_engaged(station.name()) {
                summary.refs_deferred += 1;
                tracing::debug!(station = %station.name(), trunk = %trunk.name(), "pairing in use, removal deferred");
                continue;
            }
            station.lock().trunks.retain(|r| !Arc::ptr_eq(r, &trunk_ref));
            if let Some(context) = &context {
                remove_line_key_extensions(shared, context, station.name(), trunk.name());
            }
            summary.refs_removed += 1;
            tracing::debug!(station = %station.name(), trunk = %trunk.name(), "trunk removed from station");
        }
    }
}
