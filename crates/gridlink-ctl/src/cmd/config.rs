//! `config`: show where settings come from, creating the file if needed.

use anyhow::Result;

use gridlink_core::config::GridlinkConfig;

pub fn cmd_config(config: &GridlinkConfig) -> Result<()> {
    let existed = GridlinkConfig::file_path().exists();
    let path = GridlinkConfig::write_default_if_missing()?;
    if existed {
        println!("[INFO] Config file: {}", path.display());
    } else {
        println!("[INFO] Wrote default config to {}", path.display());
    }

    println!("  name prefix  : {}", config.device.name_prefix);
    println!("  address      : {}", config.address().unwrap_or("(scan)"));
    println!("  max chunk    : {} bytes", config.transfer.max_chunk);
    println!("  grace        : {:?}", config.grace());
    println!("  scan timeout : {:?}", config.discovery_timeout());
    println!("  peer grid    : {}", config.peer.grid_path.display());
    println!("  watch path   : {}", config.watch.path.display());
    println!("  watch every  : {:?}", config.watch_interval());
    Ok(())
}
