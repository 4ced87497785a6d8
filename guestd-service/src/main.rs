// SPDX-License-Identifier: GPL-3.0-only

//! guestd - in-guest daemon of the appliance
//!
//! Runs inside the appliance VM, reads requests from the host over a
//! virtio-serial channel and performs them against the attached guest
//! disks.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use guestd_sys::{DEFAULT_BY_PATH_DIR, DEFAULT_SYSROOT, DaemonContext, prog_exists};
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, fmt};

mod dispatch;
mod error;
mod handlers;
#[cfg(test)]
mod testutil;
mod transport;

use dispatch::Dispatcher;
use transport::{DEFAULT_MAX_MESSAGE, Transport};

const DEFAULT_CHANNEL: &str = "/dev/virtio-ports/org.libguestfs.channel.0";

#[derive(Debug, Parser)]
#[command(name = "guestd", version, about = "Appliance daemon for guest disk access")]
struct Args {
    /// Host communication channel
    #[arg(long, default_value = DEFAULT_CHANNEL)]
    channel: PathBuf,

    /// Mount point of the guest root filesystem
    #[arg(long, default_value = DEFAULT_SYSROOT)]
    sysroot: PathBuf,

    /// Directory of stable per-path device links
    #[arg(long, default_value = DEFAULT_BY_PATH_DIR)]
    by_path_dir: PathBuf,

    /// Log every command run and device name translation
    #[arg(short, long)]
    verbose: bool,

    /// Do not discover attached drives (for running outside the appliance)
    #[arg(long)]
    no_device_cache: bool,

    /// Largest request or reply accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE)]
    max_message: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "guestd=debug,guestd_sys=debug,warn"
    } else {
        "guestd=info,guestd_sys=info,warn"
    };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting guestd v{}", env!("CARGO_PKG_VERSION"));

    if !args.no_device_cache && !nix::unistd::geteuid().is_root() {
        tracing::error!("guestd must run as root");
        anyhow::bail!("Daemon must run with root privileges");
    }

    let ctx = DaemonContext::builder()
        .sysroot(&args.sysroot)
        .by_path_dir(&args.by_path_dir)
        .verbose(args.verbose)
        .discover_devices(!args.no_device_cache)
        .build()
        .context("building daemon context")?;
    let ctx = Arc::new(ctx);

    for tool in ["udevadm", "mount", "umount"] {
        if !prog_exists(tool) {
            tracing::warn!("{tool} not found on PATH; calls that need it will fail");
        }
    }

    let channel = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.channel)
        .await
        .with_context(|| format!("opening channel {}", args.channel.display()))?;
    tracing::info!("Connected to host on {}", args.channel.display());

    let dispatcher = Dispatcher::new(ctx, Transport::new(channel, args.max_message));

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = dispatcher.serve() => {
            result.context("serving requests")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received interrupt");
        }
        _ = terminate.recv() => {
            tracing::info!("Received SIGTERM");
        }
    }

    tracing::info!("guestd shutting down");
    Ok(())
}
