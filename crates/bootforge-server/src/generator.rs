//! Installer config generators
//!
//! Each generator renders the final install configuration for one installer
//! family. The orchestrator treats them as opaque capabilities: bytes out,
//! or an error passed through unchanged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bootforge_common::Node;
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

/// Renders the install configuration payload for a node
pub trait ConfigGenerator: Send + Sync {
    /// Family key the generator is registered under (e.g. "ignition")
    fn family(&self) -> &'static str;

    /// Render the configuration for the given node
    fn generate(&self, node: &Node) -> anyhow::Result<Vec<u8>>;
}

/// A user provisioned onto every installed node.
///
/// Password hashes are produced offline by the operator (`mkpasswd`,
/// `openssl passwd`) and carried in config; nothing here hashes at request
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallUser {
    pub name: String,
    pub password_hash: String,
}

/// Network parameters shared by all nodes; the per-node address comes from
/// the registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDefaults {
    pub interface: String,
    pub prefix_len: u8,
    pub gateway: Option<String>,
    pub dns: Option<String>,
}

impl Default for NetworkDefaults {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            prefix_len: 24,
            gateway: None,
            dns: None,
        }
    }
}

// --- Ignition ---

#[derive(Debug, Serialize)]
struct IgnitionDoc {
    ignition: IgnitionMeta,
    passwd: Passwd,
    storage: Storage,
    systemd: Systemd,
}

#[derive(Debug, Serialize)]
struct IgnitionMeta {
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct Passwd {
    users: Vec<PasswdUser>,
}

#[derive(Debug, Serialize)]
struct PasswdUser {
    name: String,
    #[serde(rename = "passwordHash")]
    password_hash: String,
}

#[derive(Debug, Serialize)]
struct Storage {
    files: Vec<IgnitionFile>,
}

#[derive(Debug, Serialize)]
struct IgnitionFile {
    path: String,
    mode: u32,
    overwrite: bool,
    contents: FileContents,
}

#[derive(Debug, Serialize)]
struct FileContents {
    source: String,
}

#[derive(Debug, Serialize)]
struct Systemd {
    units: Vec<SystemdUnit>,
}

#[derive(Debug, Serialize)]
struct SystemdUnit {
    name: String,
    enabled: bool,
}

/// Ignition v3 document generator
#[derive(Debug, Clone)]
pub struct IgnitionGenerator {
    users: Vec<InstallUser>,
    network: NetworkDefaults,
}

impl IgnitionGenerator {
    pub fn new(users: Vec<InstallUser>, network: NetworkDefaults) -> Self {
        Self { users, network }
    }

    fn network_unit(&self, node: &Node) -> String {
        let mut unit = format!(
            "[Match]\nName={}\n\n[Network]\nAddress={}/{}\n",
            self.network.interface, node.addr, self.network.prefix_len
        );
        if let Some(ref gateway) = self.network.gateway {
            unit.push_str(&format!("Gateway={}\n", gateway));
        }
        if let Some(ref dns) = self.network.dns {
            unit.push_str(&format!("DNS={}\n", dns));
        }
        unit
    }
}

impl ConfigGenerator for IgnitionGenerator {
    fn family(&self) -> &'static str {
        "ignition"
    }

    fn generate(&self, node: &Node) -> anyhow::Result<Vec<u8>> {
        let mut files = vec![IgnitionFile {
            path: "/etc/hostname".to_string(),
            mode: 0o644,
            overwrite: true,
            contents: FileContents {
                source: format!("data:,{}", node.name),
            },
        }];

        if !node.is_unassigned() {
            files.push(IgnitionFile {
                path: format!("/etc/systemd/network/20-{}.network", self.network.interface),
                mode: 0o644,
                overwrite: true,
                contents: FileContents {
                    source: format!(
                        "data:text/plain;charset=utf-8;base64,{}",
                        BASE64.encode(self.network_unit(node))
                    ),
                },
            });
        }

        let doc = IgnitionDoc {
            ignition: IgnitionMeta { version: "3.2.0" },
            passwd: Passwd {
                users: self
                    .users
                    .iter()
                    .map(|u| PasswdUser {
                        name: u.name.clone(),
                        password_hash: u.password_hash.clone(),
                    })
                    .collect(),
            },
            storage: Storage { files },
            systemd: Systemd {
                units: vec![SystemdUnit {
                    name: "sshd.service".to_string(),
                    enabled: true,
                }],
            },
        };

        Ok(serde_json::to_vec_pretty(&doc)?)
    }
}

// --- Combustion ---

const COMBUSTION_TEMPLATE: &str = r#"#!/bin/bash
# combustion: network
set -euo pipefail

echo {{ hostname }} > /etc/hostname
{% if address -%}
cat > /etc/systemd/network/20-{{ interface }}.network <<'EOF'
[Match]
Name={{ interface }}

[Network]
Address={{ address }}/{{ prefix_len }}
{% if gateway %}Gateway={{ gateway }}
{% endif -%}
{% if dns %}DNS={{ dns }}
{% endif -%}
EOF
{% endif -%}
systemctl enable sshd.service
"#;

/// First-boot shell script generator (openSUSE combustion)
#[derive(Debug, Clone)]
pub struct CombustionGenerator {
    network: NetworkDefaults,
}

impl CombustionGenerator {
    pub fn new(network: NetworkDefaults) -> Self {
        Self { network }
    }
}

impl ConfigGenerator for CombustionGenerator {
    fn family(&self) -> &'static str {
        "combustion"
    }

    fn generate(&self, node: &Node) -> anyhow::Result<Vec<u8>> {
        let mut env = Environment::new();
        env.add_template("combustion", COMBUSTION_TEMPLATE)?;
        let rendered = env.get_template("combustion")?.render(context! {
            hostname => node.name.clone(),
            address => if node.is_unassigned() { None } else { Some(node.addr.clone()) },
            interface => self.network.interface.clone(),
            prefix_len => self.network.prefix_len,
            gateway => self.network.gateway.clone(),
            dns => self.network.dns.clone(),
        })?;
        Ok(rendered.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootforge_common::{NodeStage, UNASSIGNED_ADDR};
    use serde_json::Value;

    fn assigned_node() -> Node {
        Node {
            id: "abc-1".to_string(),
            hwaddr: "aa:bb:cc:dd:ee:ff".to_string(),
            name: "calm-heron-abc1".to_string(),
            addr: "10.0.0.50".to_string(),
            stage: NodeStage::ChainloadReady,
        }
    }

    fn unassigned_node() -> Node {
        let mut node = assigned_node();
        node.addr = UNASSIGNED_ADDR.to_string();
        node
    }

    fn network() -> NetworkDefaults {
        NetworkDefaults {
            interface: "em1".to_string(),
            prefix_len: 24,
            gateway: Some("10.0.0.1".to_string()),
            dns: Some("1.1.1.1".to_string()),
        }
    }

    fn users() -> Vec<InstallUser> {
        vec![InstallUser {
            name: "root".to_string(),
            password_hash: "$6$abcdef$hash".to_string(),
        }]
    }

    #[test]
    fn test_ignition_document_shape() {
        let generator = IgnitionGenerator::new(users(), network());
        let payload = generator.generate(&assigned_node()).unwrap();

        let doc: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(doc["ignition"]["version"], "3.2.0");
        assert_eq!(doc["passwd"]["users"][0]["name"], "root");
        assert_eq!(doc["passwd"]["users"][0]["passwordHash"], "$6$abcdef$hash");
        assert_eq!(doc["storage"]["files"][0]["path"], "/etc/hostname");
        assert_eq!(
            doc["storage"]["files"][0]["contents"]["source"],
            "data:,calm-heron-abc1"
        );
        assert_eq!(doc["systemd"]["units"][0]["name"], "sshd.service");
    }

    #[test]
    fn test_ignition_network_file_roundtrip() {
        let generator = IgnitionGenerator::new(users(), network());
        let payload = generator.generate(&assigned_node()).unwrap();

        let doc: Value = serde_json::from_slice(&payload).unwrap();
        let source = doc["storage"]["files"][1]["contents"]["source"]
            .as_str()
            .unwrap();
        let encoded = source.rsplit(',').next().unwrap();
        let unit = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();

        assert!(unit.contains("Name=em1"));
        assert!(unit.contains("Address=10.0.0.50/24"));
        assert!(unit.contains("Gateway=10.0.0.1"));
        assert!(unit.contains("DNS=1.1.1.1"));
    }

    #[test]
    fn test_ignition_skips_network_when_unassigned() {
        let generator = IgnitionGenerator::new(users(), network());
        let payload = generator.generate(&unassigned_node()).unwrap();

        let doc: Value = serde_json::from_slice(&payload).unwrap();
        let files = doc["storage"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_combustion_script() {
        let generator = CombustionGenerator::new(network());
        let payload = generator.generate(&assigned_node()).unwrap();
        let script = String::from_utf8(payload).unwrap();

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("echo calm-heron-abc1 > /etc/hostname"));
        assert!(script.contains("Address=10.0.0.50/24"));
        assert!(script.contains("systemctl enable sshd.service"));
    }

    #[test]
    fn test_combustion_skips_network_when_unassigned() {
        let generator = CombustionGenerator::new(network());
        let payload = generator.generate(&unassigned_node()).unwrap();
        let script = String::from_utf8(payload).unwrap();

        assert!(!script.contains("[Network]"));
        assert!(script.contains("systemctl enable sshd.service"));
    }
}
