//! Logger initialisation
//!
//! Builds a `tracing-subscriber` registry from [`LoggerSettings`]:
//! an `EnvFilter`, an optional append-mode file layer (full, compact or JSON)
//! and an optional console layer that only emits ANSI colours on a TTY.

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::{FileSettings, LoggerSettings};

/// File output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format '{}'", other),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Fails if the settings are invalid, the log file cannot be opened, or a
/// global subscriber is already installed.
pub fn init_logger(settings: &LoggerSettings) -> anyhow::Result<()> {
    settings.validate()?;

    let filter = EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // The file layer goes first so console ANSI settings cannot leak into span
    // fields written to the file (tokio-rs/tracing#1817).
    if settings.file.enabled {
        layers.push(file_layer(&settings.file)?);
    }

    if settings.console.enabled {
        let use_ansi = settings.console.colored && std::io::stdout().is_terminal();
        layers.push(
            fmt::layer()
                .with_ansi(use_ansi)
                .with_target(true)
                .with_level(true)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}

fn file_layer(settings: &FileSettings) -> anyhow::Result<BoxedLayer> {
    let format: LogFormat = settings.format.parse()?;
    let writer = Mutex::new(open_log_file(settings)?);
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer);

    Ok(match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    })
}

fn open_log_file(settings: &FileSettings) -> anyhow::Result<File> {
    let path = settings.path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(settings.append)
        .truncate(!settings.append)
        .open(&path)?;
    Ok(file)
}
