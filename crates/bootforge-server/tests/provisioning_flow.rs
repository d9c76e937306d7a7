//! End-to-end provisioning lifecycle against a real store file.

use bootforge_common::{Node, NodeStage, UNASSIGNED_ADDR};
use bootforge_ipxe::{IpxeConfig, IpxeScripts};
use bootforge_server::generator::{
    CombustionGenerator, IgnitionGenerator, InstallUser, NetworkDefaults,
};
use bootforge_server::provisioning::{BootArtifact, Provisioner, ProvisioningError};
use bootforge_server::registry::NodeRegistry;
use bootforge_server::store::FileStore;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn build(dir: &TempDir) -> Provisioner {
    let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());
    let registry = NodeRegistry::new(store);
    let scripts = IpxeScripts::new(IpxeConfig::new("http://10.0.0.1:8080"));
    let network = NetworkDefaults {
        gateway: Some("10.0.0.1".to_string()),
        ..NetworkDefaults::default()
    };
    let users = vec![InstallUser {
        name: "root".to_string(),
        password_hash: "$6$salt$hash".to_string(),
    }];
    Provisioner::new(registry, scripts)
        .with_generator(Arc::new(IgnitionGenerator::new(users, network.clone())))
        .with_generator(Arc::new(CombustionGenerator::new(network)))
}

#[test]
fn full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let p = build(&dir);

    // first contact parks the node
    let artifact = p.boot_contact("abc-1", "aa:bb:cc").unwrap();
    assert!(matches!(artifact, BootArtifact::DormantLoop(_)));

    let node = p.registry().get("abc-1").unwrap().unwrap();
    assert_eq!(node.stage, NodeStage::Dormant);
    assert_eq!(node.hwaddr, "aa:bb:cc");
    assert_eq!(node.addr, UNASSIGNED_ADDR);

    // operator promotes the node
    let mut promoted = node;
    promoted.stage = NodeStage::ChainloadReady;
    promoted.addr = "10.0.0.50".to_string();
    p.registry().replace("abc-1", promoted).unwrap();

    // next boot contact chainloads, whatever address it reports
    let artifact = p.boot_contact("abc-1", "anything").unwrap();
    match &artifact {
        BootArtifact::Chainload(script) => {
            assert!(script.contains("abc-1"));
            assert!(script.contains("bootforge.addr=10.0.0.50"));
        }
        other => panic!("unexpected artifact: {:?}", other),
    }

    // the installer fetches its config; the node becomes provisioned
    let payload = p.config_fetch("abc-1", "ignition").unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(doc["ignition"]["version"], "3.2.0");

    let node = p.registry().get("abc-1").unwrap().unwrap();
    assert_eq!(node.stage, NodeStage::Provisioned);
}

#[test]
fn lifecycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let p = build(&dir);
        p.boot_contact("abc-1", "aa:bb:cc").unwrap();
        let mut node = p.registry().get("abc-1").unwrap().unwrap();
        node.stage = NodeStage::ChainloadReady;
        p.registry().replace("abc-1", node).unwrap();
    }

    // a fresh process over the same file sees the promoted record
    let p = build(&dir);
    let artifact = p.boot_contact("abc-1", "aa:bb:cc").unwrap();
    assert!(matches!(artifact, BootArtifact::Chainload(_)));
}

#[test]
fn config_fetch_before_boot_contact_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = build(&dir);

    let err = p.config_fetch("never-seen", "ignition").unwrap_err();
    assert!(matches!(err, ProvisioningError::UnknownNode(_)));

    // nothing was written: the registry is still empty and so is the file
    assert!(p.registry().list().unwrap().is_empty());
    assert!(!dir.path().join("store.json").exists());
}

#[test]
fn concurrent_first_contact_creates_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());
    let registry = NodeRegistry::new(store);

    const CONTENDERS: usize = 16;
    let mut handles = Vec::new();
    for _ in 0..CONTENDERS {
        let registry = registry.clone();
        handles.push(std::thread::spawn(move || {
            registry.ensure_node("abc-1", "aa:bb:cc").unwrap().1
        }));
    }

    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();
    assert_eq!(created, 1, "exactly one contender observes creation");

    // one record in memory and exactly one entry in the snapshot file
    assert_eq!(registry.list().unwrap().len(), 1);
    let raw = std::fs::read(dir.path().join("store.json")).unwrap();
    let snapshot: HashMap<String, Node> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("node-abc-1"));
}

#[test]
fn interrupted_persist_leaves_store_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let p = build(&dir);
        p.boot_contact("abc-1", "aa:bb:cc").unwrap();
    }
    let before = std::fs::read(&path).unwrap();

    // simulate a crash between the temp-file write and the rename
    std::fs::write(dir.path().join("store.json.tmp"), b"half-written garbage").unwrap();

    let p = build(&dir);
    assert_eq!(
        std::fs::read(&path).unwrap(),
        before,
        "original snapshot is byte-for-byte unchanged"
    );
    let node = p.registry().get("abc-1").unwrap().unwrap();
    assert_eq!(node.stage, NodeStage::Dormant);
}

#[test]
fn management_edits_flow_through_boot_path() {
    let dir = tempfile::tempdir().unwrap();
    let p = build(&dir);

    p.boot_contact("abc-1", "aa:bb:cc").unwrap();

    // operator renames and promotes in one replace
    let node = Node {
        id: "abc-1".to_string(),
        hwaddr: "aa:bb:cc".to_string(),
        name: "rack4-db01".to_string(),
        addr: "10.0.0.50".to_string(),
        stage: NodeStage::ChainloadReady,
    };
    p.registry().replace("abc-1", node).unwrap();

    let artifact = p.boot_contact("abc-1", "aa:bb:cc").unwrap();
    assert!(artifact.script().contains("hostname=rack4-db01"));

    let script = p.config_fetch("abc-1", "combustion").unwrap();
    let script = String::from_utf8(script).unwrap();
    assert!(script.contains("rack4-db01"));
    assert!(script.contains("10.0.0.50"));
}
