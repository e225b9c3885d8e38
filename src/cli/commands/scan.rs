//! Collection scanning, listing, deletion and monitoring commands.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Context;
use crate::config::ScannerSettings;
use crate::db::tracks;
use crate::model::ScanType;
use crate::scanner::monitor::{CollectionMonitor, MonitorEvent};
use crate::scanner::{ScanEvent, ScannerService};
use crate::uri;

/// Coalescing window for monitor events before a NEW_FILES scan is requested
const BATCH_DELAY: Duration = Duration::from_millis(100);

fn normalize_all(inputs: &[String]) -> anyhow::Result<Vec<String>> {
    inputs
        .iter()
        .map(|input| uri::normalize(input).with_context(|| format!("Invalid location: {input}")))
        .collect()
}

/// Print scan notifications until every sender is gone.
fn spawn_printer(mut rx: UnboundedReceiver<ScanEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_percent = None;
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Progress { current, total } => {
                    let percent = current * 100 / total.max(1);
                    if last_percent != Some(percent) {
                        last_percent = Some(percent);
                        eprint!("\rScanning... {percent:>3}%");
                        let _ = std::io::stderr().flush();
                    }
                }
                ScanEvent::Updated(item, update) => {
                    debug!(
                        target: "scanner::job",
                        album = %item.album_name,
                        album_id = item.album_id,
                        track_id = item.track_id,
                        ?update,
                        "Collection updated"
                    );
                }
                ScanEvent::Finished { had_changes } => {
                    last_percent = None;
                    eprintln!();
                    if had_changes {
                        println!("Scan complete, collection updated.");
                    } else {
                        println!("Scan complete, no changes.");
                    }
                }
                ScanEvent::CollectionMissing(root) => {
                    eprintln!("Collection root is missing: {root}");
                }
                ScanEvent::PlayAlbums(albums) => {
                    let tracks: usize = albums.iter().map(|a| a.track_ids.len()).sum();
                    println!("Ready to play {} album(s), {} track(s).", albums.len(), tracks);
                }
            }
        }
    })
}

/// Scanner wired to the configured settings and a printing listener.
async fn build_scanner(ctx: &Context) -> anyhow::Result<(ScannerService, JoinHandle<()>)> {
    let pool = ctx.open_db().await?;
    let (tx, rx) = unbounded_channel();
    let scanner = ScannerService::builder(pool)
        .settings(ScannerSettings::from(&ctx.config.collection))
        .listener(Arc::new(tx))
        .build();
    Ok((scanner, spawn_printer(rx)))
}

/// Run one scan: FULL by default, NEW_FILES or EXTERNAL over the given locations
pub fn cmd_scan(
    rt: &Runtime,
    ctx: &Context,
    new_files: &[String],
    external: &[String],
) -> anyhow::Result<()> {
    let (scan_type, uris) = if !external.is_empty() {
        (ScanType::External, normalize_all(external)?)
    } else if !new_files.is_empty() {
        (ScanType::NewFiles, normalize_all(new_files)?)
    } else {
        (ScanType::Full, Vec::new())
    };

    rt.block_on(async {
        let (scanner, printer) = build_scanner(ctx).await?;
        if scan_type == ScanType::Full && scanner.settings().music_uris.is_empty() {
            anyhow::bail!("No collection roots configured");
        }

        info!(target: "scanner::job", ?scan_type, "Requesting scan");
        scanner.update(scan_type, uris).await?;
        scanner.wait().await;

        drop(scanner);
        printer.await?;
        Ok(())
    })
}

/// List all tracks in the database
pub fn cmd_list(rt: &Runtime, ctx: &Context) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = ctx.open_db().await?;
        let mut conn = pool.acquire().await?;
        for track in tracks::get_all(&mut conn).await? {
            println!("{} - {}", track.name, track.uri);
        }
        Ok(())
    })
}

/// Remove one track, keeping its stats in the history store when `backup`
pub fn cmd_delete(rt: &Runtime, ctx: &Context, location: &str, backup: bool) -> anyhow::Result<()> {
    let track_uri = uri::normalize(location).with_context(|| format!("Invalid location: {location}"))?;

    rt.block_on(async {
        let pool = ctx.open_db().await?;
        let scanner = ScannerService::builder(pool).build();
        let stats = scanner.delete(&track_uri, backup).await?;
        println!(
            "Removed {} (popularity {}, rating {}, loved {})",
            track_uri, stats.popularity, stats.rate, stats.loved
        );
        Ok(())
    })
}

/// Scan the collection, then request NEW_FILES scans for changed directories until Ctrl+C
pub fn cmd_watch(rt: &Runtime, ctx: &Context) -> anyhow::Result<()> {
    rt.block_on(async {
        let (scanner, printer) = build_scanner(ctx).await?;
        let roots = scanner.settings().music_uris;
        if roots.is_empty() {
            anyhow::bail!("No collection roots configured");
        }
        if !ctx.config.collection.auto_update {
            warn!(target: "scanner::monitor", "auto_update is disabled in the configuration, monitoring anyway");
        }

        scanner.update(ScanType::NewFiles, roots.clone()).await?;

        let (monitor, rx) = CollectionMonitor::new(&roots)?;
        println!("Monitoring {} collection root(s). Press Ctrl+C to stop.", roots.len());

        let forwarder = {
            let scanner = scanner.clone();
            tokio::task::spawn_blocking(move || {
                let mut pending: BTreeSet<String> = BTreeSet::new();
                loop {
                    match rx.recv_timeout(BATCH_DELAY) {
                        Ok(MonitorEvent::Changed(dir)) => {
                            pending.insert(dir);
                        }
                        Ok(MonitorEvent::Error(e)) => eprintln!("! Monitor error: {e}"),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if !pending.is_empty() {
                                let dirs: Vec<String> = std::mem::take(&mut pending).into_iter().collect();
                                info!(target: "scanner::monitor", dirs = dirs.len(), "Rescanning changed directories");
                                scanner.update(ScanType::NewFiles, dirs);
                            }
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
        };

        tokio::signal::ctrl_c().await?;
        info!(target: "scanner::monitor", "Stopping");
        drop(monitor);
        forwarder.await?;

        scanner.stop();
        scanner.wait().await;
        printer.abort();
        Ok(())
    })
}
