//! One-shot installer image preparation.
//!
//! Downloads the self-install tarball and unpacks it into the artifact
//! directory the server serves chainloads from. This never runs on the
//! provisioning path; it is an offline step an operator runs once.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// openSUSE MicroOS self-install image, the default installer payload
const DEFAULT_IMAGE_URL: &str =
    "https://download.opensuse.org/tumbleweed/appliances/openSUSE-MicroOS.x86_64-SelfInstall.install.tar";

/// Log progress every this many bytes
const PROGRESS_STEP: u64 = 64 * 1024 * 1024;

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Installer image tarball to download
    #[arg(long, default_value = DEFAULT_IMAGE_URL)]
    pub url: String,

    /// Artifact directory to unpack into
    #[arg(long, default_value = "/var/lib/bootforge/artifacts")]
    pub dest: PathBuf,
}

pub async fn run(args: PrepareArgs) -> Result<()> {
    tokio::fs::create_dir_all(&args.dest)
        .await
        .with_context(|| format!("creating artifact directory {}", args.dest.display()))?;

    info!(url = %args.url, "downloading installer image");
    let tarball = download(&args.url, &args.dest).await?;

    info!(path = %tarball.display(), "download complete, unpacking");
    unpack(&tarball, &args.dest).await?;
    let _ = tokio::fs::remove_file(&tarball).await;

    info!(dest = %args.dest.display(), "installer image ready");
    Ok(())
}

/// Stream the tarball to a staging file in the destination directory.
async fn download(url: &str, dir: &Path) -> Result<PathBuf> {
    let mut response = reqwest::get(url)
        .await
        .context("requesting installer image")?;
    if !response.status().is_success() {
        bail!("bad status: {}", response.status());
    }

    let total = response.content_length();
    let path = dir.join("installer.download");
    let mut file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;

    let mut downloaded: u64 = 0;
    let mut last_logged: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .context("reading installer image stream")?
    {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if downloaded - last_logged >= PROGRESS_STEP {
            match total {
                Some(total) => {
                    info!("downloaded {} / {} MiB", downloaded >> 20, total >> 20)
                }
                None => info!("downloaded {} MiB", downloaded >> 20),
            }
            last_logged = downloaded;
        }
    }
    file.flush().await?;

    Ok(path)
}

/// Unpack the tarball; tar extraction is blocking, so it runs off the
/// async runtime.
async fn unpack(tarball: &Path, dest: &Path) -> Result<()> {
    let tarball = tarball.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&tarball)
            .with_context(|| format!("opening {}", tarball.display()))?;
        tar::Archive::new(file)
            .unpack(&dest)
            .context("unpacking installer image")?;
        Ok(())
    })
    .await
    .context("unpack task panicked")?
}
