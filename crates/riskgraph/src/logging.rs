//! Tracing setup for the CLI
//!
//! Logs go to stderr unless `--log-file` names a run log. A run log is
//! appended to across invocations and trimmed from the front once it grows
//! past [`RunLogTrim::threshold`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// First line of a run log whose older entries were dropped
const TRIMMED_MARKER: &[u8] = b"# riskgraph: earlier runs trimmed\n";

/// When and how far a run log is cut back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunLogTrim {
    /// Size in bytes above which the log is trimmed
    pub threshold: u64,
    /// Bytes of the newest entries that survive a trim
    pub keep: u64,
}

impl Default for RunLogTrim {
    fn default() -> Self {
        Self {
            threshold: 5 * 1024 * 1024,
            keep: 1024 * 1024,
        }
    }
}

impl RunLogTrim {
    /// Cut `path` down to its newest whole lines. Returns whether it trimmed.
    ///
    /// A missing log or one under the threshold is left alone.
    pub fn apply(&self, path: &Path) -> io::Result<bool> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if len <= self.threshold {
            return Ok(false);
        }

        let mut tail = Vec::new();
        {
            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(len.saturating_sub(self.keep)))?;
            file.read_to_end(&mut tail)?;
        }
        // the seek usually lands mid-line
        let first_line = tail
            .iter()
            .position(|&b| b == b'\n')
            .map_or(tail.len(), |i| i + 1);

        let mut file = File::create(path)?;
        file.write_all(TRIMMED_MARKER)?;
        file.write_all(&tail[first_line..])?;
        Ok(true)
    }
}

/// `MakeWriter` over the run log shared by every span and event
#[derive(Clone)]
struct RunLog {
    file: Arc<Mutex<File>>,
}

impl RunLog {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

struct RunLogWriter {
    file: Arc<Mutex<File>>,
}

impl RunLogWriter {
    fn file(&self) -> io::Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("run log lock poisoned"))
    }
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// Install the global subscriber, writing to stderr or to `log_file`.
///
/// `level` applies to the CLI crate; the engine logs warnings only unless
/// `RUST_LOG` says otherwise.
pub fn init_logging(log_file: Option<&Path>, level: &str) -> color_eyre::Result<()> {
    let default_filter = format!("riskgraph={level},riskgraph_core=warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .init();
        return Ok(());
    };

    let trimmed = RunLogTrim::default().apply(path);
    let run_log = RunLog::open(path)?;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(run_log)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    match trimmed {
        Ok(true) => tracing::info!(path = %path.display(), "trimmed oversized run log"),
        Ok(false) => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not trim run log"),
    }
    Ok(())
}
