use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::config::BUILD_NAME;
use crate::probe::FAILURE_SENTINEL_MS;
use crate::sampler::{Sample, Tick};

/// Characters that may not appear anywhere in a log path or name.
const FORBIDDEN_CHARS: [char; 2] = ['\0', '\u{80}'];

/// Checks `text` for characters that are unusable in a log path or file name.
pub fn validate_name(text: &str) -> bool {
    if text.starts_with('*') {
        tracing::warn!(text = %text.escape_debug(), "bad leading character '*'");
        return false;
    }
    if let Some(bad) = text.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        tracing::warn!(
            text = %text.escape_debug(),
            character = %bad.escape_unicode(),
            "bad character"
        );
        return false;
    }
    true
}

pub fn fallback_file_name() -> String {
    format!("{BUILD_NAME}Log.csv")
}

/// Serializes a sample as `timestamp,latency,timeout,size,target`. Failed probes leave the
/// latency field empty.
pub fn to_log_row(sample: &Sample) -> String {
    let latency = sample
        .reply_ms()
        .map(|ms| ms.to_string())
        .unwrap_or_default();
    format!(
        "{},{},{},{},{}",
        sample.timestamp, latency, sample.timeout_ms, sample.payload_size, sample.target
    )
}

/// Appends samples to a CSV log opened once for the whole session.
pub struct Recorder {
    path: PathBuf,
    file: File,
}

impl Recorder {
    /// Opens `<dir>/<name>.csv`, falling back to the default log in the working directory.
    pub async fn open(dir: &str, name: &str) -> Result<Self> {
        Self::open_in(dir, name, Path::new(".")).await
    }

    pub async fn open_in(dir: &str, name: &str, fallback_dir: &Path) -> Result<Self> {
        if !validate_name(dir) {
            bail!("illegal log path {:?}", dir);
        }
        if !validate_name(name) {
            bail!("illegal log file name {:?}", name);
        }

        let path = Path::new(dir).join(format!("{name}.csv"));
        match open_append(&path).await {
            Ok(file) => Ok(Self { path, file }),
            Err(err) => {
                let fallback = fallback_dir.join(fallback_file_name());
                tracing::warn!(
                    path = %path.display(),
                    fallback = %fallback.display(),
                    error = %err,
                    "failed to open log, using fallback"
                );
                let file = open_append(&fallback).await.with_context(|| {
                    format!("failed to open fallback log {}", fallback.display())
                })?;
                Ok(Self {
                    path: fallback,
                    file,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one row for a sample and hands the tick back unchanged. Idle ticks write nothing.
    pub async fn record(&mut self, tick: Tick) -> Result<Tick> {
        if let Tick::Sample(sample) = &tick {
            tracing::debug!(?sample, "recording sample");
            let mut row = to_log_row(sample);
            row.push('\n');
            self.file
                .write_all(row.as_bytes())
                .await
                .with_context(|| format!("failed to write sample to {}", self.path.display()))?;
            self.file
                .flush()
                .await
                .with_context(|| format!("failed to flush {}", self.path.display()))?;
        }
        Ok(tick)
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Parses one log row into a chart point.
pub fn parse_row(row: &str) -> Result<(f64, f64)> {
    let mut fields = row.split(',');
    let timestamp = fields
        .next()
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .ok_or_else(|| anyhow!("missing timestamp"))?;
    let latency = fields
        .next()
        .map(str::trim)
        .ok_or_else(|| anyhow!("missing latency field"))?;

    let timestamp: f64 = timestamp
        .parse()
        .with_context(|| format!("invalid timestamp '{timestamp}'"))?;
    let latency = if latency.is_empty() {
        FAILURE_SENTINEL_MS
    } else {
        latency
            .parse()
            .with_context(|| format!("invalid latency '{latency}'"))?
    };
    Ok((timestamp, latency))
}

/// Reads every row of a log. Any malformed row fails the whole read.
pub async fn read_log(path: impl AsRef<Path>) -> Result<Vec<(f64, f64)>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot access {}", path.display()))?;

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_row(line).with_context(|| {
                format!("could not parse row {} of {}: {line}", index + 1, path.display())
            })
        })
        .collect()
}
