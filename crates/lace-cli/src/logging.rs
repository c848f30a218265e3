//! `--log-level` / `--log-file` wiring (§6). The core itself only emits
//! `tracing` spans and `log` lines; deciding where they land is the CLI's
//! job, same split as the teacher's `cli/src/tracing.rs`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct SharedFile(Arc<Mutex<std::fs::File>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}

/// Installs the global `tracing` subscriber. `log_level` is an `EnvFilter`
/// directive (a bare level like `"debug"`, or a full `target=level` spec);
/// an unparsable value falls back to `"info"` rather than panicking on a
/// user typo. `log_file` redirects output there instead of stderr.
pub fn init(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let shared = SharedFile(Arc::new(Mutex::new(file)));
            builder.with_writer(move || shared.clone()).with_ansi(false).init();
        }
        None => {
            builder.init();
        }
    }
    Ok(())
}
