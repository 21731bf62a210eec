//! A ticking daemon driven by sigforge.
//!
//! `cargo run --example ticker -- --foreground` keeps it in the terminal; Ctrl+C stops it and
//! `kill -HUP <pid>` reloads. Without `--foreground` it detaches and logs to `ticker.log` in
//! the current directory, which daemonizing leaves unchanged.

use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use sigforge::{Daemon, Lifecycle};
use tracing_subscriber::EnvFilter;

struct Ticker {
    stopping: AtomicBool,
    reloads: AtomicU64,
    phrases: [&'static str; 3],
}

impl Daemon for Ticker {
    fn start(&self, foreground: bool) -> i32 {
        tracing::info!(pid = std::process::id(), foreground, "ticker started");
        let mut tick = 0usize;
        while !self.stopping.load(Ordering::Acquire) {
            let phrase = self.phrases[tick % self.phrases.len()];
            tracing::info!(tick, reloads = self.reloads.load(Ordering::Relaxed), "{phrase}");
            tick += 1;
            // Short naps so a stop request is noticed quickly.
            for _ in 0..10 {
                if self.stopping.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(Duration::from_millis(300));
            }
        }
        tracing::info!("ticker stopped cleanly");
        0
    }

    fn stop(&self) {
        tracing::info!("stop requested");
        self.stopping.store(true, Ordering::Release);
    }

    fn reconfigure(&self) {
        let reloads = self.reloads.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(reloads, "reconfigure requested");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let foreground = env::args().any(|arg| arg == "--foreground" || arg == "-f");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if foreground {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        // stderr goes to /dev/null once detached.
        let log = OpenOptions::new().create(true).append(true).open("ticker.log")?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(log))
            .init();
    }

    let ticker = Ticker {
        stopping: AtomicBool::new(false),
        reloads: AtomicU64::new(0),
        phrases: ["still here", "hello world", "goodbye world"],
    };

    let outcome = Lifecycle::new()
        .foreground(foreground)
        .notify_systemd(true)
        .run(&ticker)?;

    std::process::exit(outcome.exit_code());
}
