//! # Integration Tests for the Port Registry
//!
//! Exercises the registry, the store and the recovery scanner together.
//!
//! ## Test Categories
//!
//! 1. **Allocation**: idempotence and uniqueness
//! 2. **Recovery**: rebuilding state from descriptor files
//! 3. **Cold start**: store falls back to recovery when `ports.json` is absent

use crate::models::{PortRange, RegistryError};
use crate::recovery::PortScanner;
use crate::registry::PortRegistry;
use crate::storage::RegistryStore;
use std::path::Path;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn descriptor(host_port: u16, container_port: u16) -> String {
    format!(
        "{{ config, pkgs, ... }}:\n{{\n  virtualisation.oci-containers.containers.\"x\" = rec {{\n    ports = [ \"127.0.0.1:{host_port}:{container_port}\" ];\n  }};\n}}"
    )
}

fn write_descriptor(apps: &Path, name: &str, content: &str) {
    std::fs::create_dir_all(apps).unwrap();
    std::fs::write(apps.join(format!("{name}.nix")), content).unwrap();
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_idempotent_allocation() {
    let mut registry = PortRegistry::default();

    let first = registry.allocate("app").unwrap();
    let after_first = registry.clone();
    let second = registry.allocate("app").unwrap();

    assert_eq!(first, second);
    assert_eq!(registry, after_first);
}

#[test]
fn test_uniqueness_in_three_port_range() {
    let mut registry = PortRegistry::new(PortRange::new(10000, 10002).unwrap());

    let mut ports = vec![
        registry.allocate("one").unwrap(),
        registry.allocate("two").unwrap(),
        registry.allocate("three").unwrap(),
    ];
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports, vec![10000, 10001, 10002]);

    assert!(matches!(
        registry.allocate("four"),
        Err(RegistryError::PortsExhausted { .. })
    ));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_fidelity() {
    let dir = TempDir::new().unwrap();
    write_descriptor(dir.path(), "a", &descriptor(10005, 3000));
    write_descriptor(dir.path(), "b", &descriptor(10009, 80));

    let registry = PortScanner::new("127.0.0.1", PortRange::default())
        .scan(dir.path())
        .unwrap();

    let recovered: Vec<(&str, u16)> = registry.iter().collect();
    assert_eq!(recovered, vec![("a", 10005), ("b", 10009)]);
    assert_eq!(registry.next_port(), 10010);
}

#[test]
fn test_recovery_skips_malformed_descriptors() {
    let dir = TempDir::new().unwrap();
    write_descriptor(dir.path(), "good", &descriptor(10003, 80));
    write_descriptor(dir.path(), "legacy", "{ ports = [ \"8080:80\" ]; }");
    write_descriptor(dir.path(), "empty", "");
    std::fs::write(dir.path().join("notes.txt"), descriptor(10007, 80)).unwrap();

    let registry = PortScanner::new("127.0.0.1", PortRange::default())
        .scan(dir.path())
        .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("good"), Some(10003));
    assert_eq!(registry.next_port(), 10004);
}

#[test]
fn test_recovery_skips_duplicate_ports() {
    let dir = TempDir::new().unwrap();
    write_descriptor(dir.path(), "first", &descriptor(10001, 80));
    write_descriptor(dir.path(), "second", &descriptor(10001, 80));

    let registry = PortScanner::new("127.0.0.1", PortRange::default())
        .scan(dir.path())
        .unwrap();

    // Files are visited in name order, so "first" keeps the port
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("first"), Some(10001));
    registry.check().unwrap();
}

#[test]
fn test_recovery_with_no_descriptors_starts_at_range() {
    let dir = TempDir::new().unwrap();
    let range = PortRange::new(12000, 12999).unwrap();

    let registry = PortScanner::new("127.0.0.1", range).scan(dir.path()).unwrap();

    assert!(registry.is_empty());
    assert_eq!(registry.next_port(), 12000);
}

#[test]
fn test_recovered_registry_allocates_after_highest() {
    let dir = TempDir::new().unwrap();
    write_descriptor(dir.path(), "a", &descriptor(10000, 80));
    write_descriptor(dir.path(), "b", &descriptor(10004, 80));

    let mut registry = PortScanner::new("127.0.0.1", PortRange::default())
        .scan(dir.path())
        .unwrap();

    assert_eq!(registry.allocate("c").unwrap(), 10005);
    assert_eq!(registry.allocate("a").unwrap(), 10000);
}

// =============================================================================
// Cold Start Tests
// =============================================================================

#[test]
fn test_store_recovers_when_registry_missing() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path());
    write_descriptor(store.apps_dir(), "a", &descriptor(10005, 3000));
    write_descriptor(store.apps_dir(), "b", &descriptor(10009, 3000));

    let registry = store.load().unwrap();

    assert_eq!(registry.get("a"), Some(10005));
    assert_eq!(registry.get("b"), Some(10009));
    assert_eq!(registry.next_port(), 10010);
    // Recovery does not write the registry by itself
    assert!(!store.path().exists());
}

#[test]
fn test_store_prefers_persisted_registry() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path());
    write_descriptor(store.apps_dir(), "a", &descriptor(10005, 3000));

    let mut registry = PortRegistry::default();
    registry.allocate("z").unwrap();
    store.save(&registry).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.get("z"), Some(10000));
    assert!(!loaded.contains("a"));
}

#[test]
fn test_store_custom_bind_address() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(dir.path()).with_bind_address("10.0.0.2");
    write_descriptor(
        store.apps_dir(),
        "a",
        "ports = [ \"10.0.0.2:10020:80\" ];",
    );

    assert_eq!(store.load().unwrap().get("a"), Some(10020));
}
