//! Hexdump - page through a file with the byte cache.
//!
//! This example demonstrates:
//! - Opening an engine session bound to a file
//! - Building a browser and prefetching around the entry point
//! - Reading resident bytes without touching the engine again
//!
//! # Running
//!
//! ```sh
//! cargo run --example hexdump -- /path/to/engine-root /bin/ls
//! ```
//!
//! The engine binary is expected at `<engine-root>/bin/r2`.

use enginepipe::{Browser, Session};
use tracing_subscriber::EnvFilter;

/// Bytes per printed row.
const ROW: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(root), Some(file)) = (args.next(), args.next()) else {
        eprintln!("usage: hexdump <engine-root> <file>");
        std::process::exit(2);
    };
    let file_len = std::fs::metadata(&file).ok().map(|m| m.len());

    let session = Session::builder(root).file(&file).open().await?;
    let browser = Browser::open(session.handle(), file_len).await?;

    let cursor = browser.initial_cursor();
    let prefetcher = browser.byte_prefetcher(1);
    prefetcher.cursor_moved(cursor);
    prefetcher.wait_idle().await;

    let bytes = browser.bytes();
    bytes.ensure_loaded(cursor).await?;
    let start = cursor - cursor % ROW as u64;
    for row in 0..16u64 {
        let addr = start + row * ROW as u64;
        let data = bytes.read(addr, ROW);
        if data.is_empty() {
            break;
        }
        let hex: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = data
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("{addr:08x}  {:<47}  {ascii}", hex.join(" "));
    }

    session.close().await;
    Ok(())
}
