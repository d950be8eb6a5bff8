use pingstats::{
    probe::ProbeOutcome,
    recorder::Recorder,
    sampler::{Sample, Tick},
};
use std::{path::PathBuf, time::Duration};
use tempfile::TempDir;

pub fn sample(timestamp: f64, latency_ms: Option<f64>) -> Sample {
    let outcome = match latency_ms {
        Some(rtt_ms) => ProbeOutcome::Reply { rtt_ms },
        None => ProbeOutcome::Failed,
    };
    Sample::new(timestamp, outcome, Duration::from_millis(3000), 64, "192.0.2.10")
}

/// Records `rows` into a fresh `session.csv` and returns its path.
pub async fn record_log(rows: &[(f64, Option<f64>)]) -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let dir = tmp.path().to_string_lossy().to_string();
    let mut recorder = Recorder::open_in(&dir, "session", tmp.path())
        .await
        .expect("open recorder");
    for (timestamp, latency) in rows {
        recorder
            .record(Tick::Sample(sample(*timestamp, *latency)))
            .await
            .expect("record sample");
    }
    let path = recorder.path().to_path_buf();
    (tmp, path)
}
