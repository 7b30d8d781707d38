//! Tests for the engine builder

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use shared_line_appearance::builders::EngineBuilder;
use shared_line_appearance::config::SlaConfig;
use shared_line_appearance::core::{Job, SlaError, Spawn};
use shared_line_appearance::infra::memory::MemoryServices;
use shared_line_appearance::runtime::ThreadSpawner;

const CONFIG: &str = r#"{
    "trunks": [{ "name": "line1", "device": "DAHDI/1" }],
    "stations": [{ "name": "s1", "device": "SIP/s1", "trunks": [{ "name": "line1" }] }]
}"#;

/// Counts spawns and hands them to real threads.
#[derive(Default)]
struct CountingSpawner {
    spawned: AtomicUsize,
}

impl Spawn for CountingSpawner {
    fn spawn(&self, name: &str, job: Job) -> Result<JoinHandle<()>, SlaError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        ThreadSpawner::new().spawn(name, job)
    }
}

#[test]
fn test_build_without_config() {
    let services = MemoryServices::new();
    let engine = EngineBuilder::new(services.collaborators()).build().unwrap();
    assert!(engine.trunks().is_empty());
    assert!(!engine.is_running());
}

#[test]
fn test_build_with_config_starts_coordinator() {
    let services = MemoryServices::new();
    let spawner = Arc::new(CountingSpawner::default());
    let engine = EngineBuilder::new(services.collaborators())
        .with_spawner(spawner.clone())
        .with_config(SlaConfig::from_json_str(CONFIG).unwrap())
        .build()
        .unwrap();

    assert!(engine.find_trunk("line1").is_some());
    assert!(engine.find_station("s1").is_some());
    assert!(engine.is_running());
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
    engine.shutdown();
}

#[test]
fn test_build_from_file() {
    let path = std::env::temp_dir().join(format!("sla-builder-{}.json", uuid::Uuid::new_v4()));
    std::fs::File::create(&path)
        .unwrap()
        .write_all(CONFIG.as_bytes())
        .unwrap();

    let services = MemoryServices::new();
    let engine = EngineBuilder::new(services.collaborators())
        .with_config_file(&path)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(engine.stations().len(), 1);
    engine.shutdown();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_build_from_missing_file() {
    let services = MemoryServices::new();
    let err = EngineBuilder::new(services.collaborators())
        .with_config_file("/nonexistent/sla.json")
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("building engine from /nonexistent/sla.json"));
}
