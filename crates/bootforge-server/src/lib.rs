//! Bootforge server
//!
//! Wires the durable node store, the provisioning state machine, and the
//! two listeners (TFTP for the first boot stage, HTTP for everything after)
//! into one process. All state is constructed here and injected; nothing is
//! ambient, so tests can stand up independent instances against temporary
//! store files.

pub mod api;
pub mod config;
pub mod generator;
pub mod provisioning;
pub mod registry;
pub mod store;

pub use config::ServerConfig;

use crate::generator::{CombustionGenerator, IgnitionGenerator};
use crate::provisioning::Provisioner;
use crate::registry::NodeRegistry;
use crate::store::FileStore;
use anyhow::Context;
use async_trait::async_trait;
use bootforge_ipxe::{IpxeConfig, IpxeScripts};
use bootforge_tftp::{ArtifactSource, TftpServer};
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// What the TFTP listener hands to booting firmware: the autoexec script
/// rendered once at startup, everything else from the artifact directory.
struct BootArtifacts {
    autoexec: Bytes,
    root: PathBuf,
}

#[async_trait]
impl ArtifactSource for BootArtifacts {
    async fn fetch(&self, path: &str) -> Option<Bytes> {
        if path == "autoexec.ipxe" {
            return Some(self.autoexec.clone());
        }

        // only plain relative components; no escaping the artifact dir
        let rel = Path::new(path);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        tokio::fs::read(self.root.join(rel)).await.ok().map(Bytes::from)
    }
}

/// Run the server until interrupted.
///
/// Fails fast if the store cannot be loaded: a store we cannot trust is not
/// one to serve provisioning decisions from.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = Arc::new(FileStore::open(&config.store_path).with_context(|| {
        format!("opening node store {}", config.store_path.display())
    })?);
    let registry = NodeRegistry::new(store);

    let mut ipxe = IpxeConfig::new(config.base_url.clone())
        .with_retry_delay(config.retry_delay_secs)
        .with_kernel_path(config.kernel_path.clone())
        .with_initrd_path(config.initrd_path.clone());
    if let Some(ref console) = config.console {
        ipxe = ipxe.with_console(console.clone());
    }
    for param in &config.kernel_params {
        ipxe = ipxe.with_kernel_param(param.clone());
    }
    let scripts = IpxeScripts::new(ipxe);

    let provisioner = Arc::new(
        Provisioner::new(registry, scripts.clone())
            .with_generator(Arc::new(IgnitionGenerator::new(
                config.users.clone(),
                config.network.clone(),
            )))
            .with_generator(Arc::new(CombustionGenerator::new(config.network.clone()))),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let artifacts = Arc::new(BootArtifacts {
        autoexec: Bytes::from(scripts.autoexec_script()),
        root: config.artifact_dir.clone(),
    });
    let tftp = TftpServer::new(
        SocketAddrV4::new(config.tftp_bind, config.tftp_port),
        artifacts,
    );
    let tftp_task = tokio::spawn(async move {
        if let Err(e) = tftp.run(shutdown_rx).await {
            error!(error = %e, "TFTP listener failed");
        }
    });

    let app = api::router(api::AppState { provisioner }, &config.artifact_dir);
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", addr))?;
    info!(addr = %addr, "HTTP listener started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
        })
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    let _ = tftp_task.await;
    Ok(())
}
