//! gridlink-ctl: upload tile grids and watch for received ones.

mod cmd;

use anyhow::Result;

use gridlink_core::config::GridlinkConfig;
use gridlink_core::wire::DEFAULT_MAX_CHUNK;

fn print_usage() {
    println!("Usage: gridlink-ctl <command> [options]");
    println!();
    println!("Commands:");
    println!("  send          Upload a grid to the first matching peer");
    println!("  watch         Print a line for each new grid record");
    println!("  config        Show settings, writing a default config file if none exists");
    println!("  help          Show this message");
    println!();
    println!("send options:");
    println!("  --name <prefix>         Advertised name prefix to match (default: TMbot)");
    println!("  --address <addr>        Connect to this address, skipping the scan");
    println!("  --path <file>           Read the grid JSON from a file");
    println!("  --payload <json>        Grid JSON given inline");
    println!("  --wait <secs>           Keep listening for status after sending (default: 2)");
    println!("  --max-chunk <bytes>     Chunk size and inline threshold (default: {})", DEFAULT_MAX_CHUNK);
    println!("  --scan-timeout <secs>   Give up discovery after this long (default: 10)");
    println!();
    println!("watch options:");
    println!("  --path <file>           Record file to poll");
    println!("  --interval <secs>       Poll interval (default: 1)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = GridlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GridlinkConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["send", rest @ ..] => cmd::send::cmd_send(config, rest).await,
        ["watch", rest @ ..] => cmd::watch::cmd_watch(config, rest).await,
        ["config"] => cmd::config::cmd_config(&config),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
