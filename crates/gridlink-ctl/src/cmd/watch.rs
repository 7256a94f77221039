//! `watch`: print a line each time a new grid record lands.

use std::path::PathBuf;

use anyhow::{Context, Result};

use gridlink_core::config::GridlinkConfig;
use gridlink_services::{GridObserver, Observation};

use super::Flags;

pub async fn cmd_watch(mut config: GridlinkConfig, args: &[&str]) -> Result<()> {
    let flags = Flags::parse(args, &["--path", "--interval"])?;
    if let Some(path) = flags.get("--path") {
        config.watch.path = PathBuf::from(path);
    }
    if let Some(interval) = flags.number("--interval")? {
        config.watch.interval_secs = interval;
    }
    config.validate().context("invalid options")?;

    let interval = config.watch_interval();
    let mut observer = GridObserver::new(&config.watch.path);
    println!(
        "[INFO] Watching {} every {:?} (ctrl-c to stop)",
        observer.path().display(),
        interval
    );

    let mut waiting_reported = false;
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        match observer.poll() {
            Observation::Missing => {
                if !waiting_reported {
                    println!("[INFO] No grid yet at {}", observer.path().display());
                    waiting_reported = true;
                }
            }
            Observation::Invalid(reason) => {
                tracing::warn!(path = %observer.path().display(), %reason, "unreadable grid record");
            }
            Observation::Unchanged => {}
            Observation::Changed(summary) => {
                waiting_reported = false;
                println!("{}", summary);
            }
        }
    }

    Ok(())
}
