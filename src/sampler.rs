use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::probe::{ProbeOutcome, Prober, FAILURE_SENTINEL_MS};

/// Minimum spacing between dispatched probes.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(220);

/// One completed probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch when the probe was dispatched.
    pub timestamp: f64,
    /// Round-trip time, or [`FAILURE_SENTINEL_MS`] when no reply arrived.
    pub latency_ms: f64,
    pub timeout_ms: u64,
    pub payload_size: usize,
    pub target: String,
}

impl Sample {
    pub fn new(
        timestamp: f64,
        outcome: ProbeOutcome,
        timeout: Duration,
        payload_size: usize,
        target: &str,
    ) -> Self {
        Self {
            timestamp,
            latency_ms: outcome.latency_ms(),
            timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
            payload_size,
            target: target.to_string(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.latency_ms != FAILURE_SENTINEL_MS
    }

    /// The latency, or `None` for a failed probe.
    pub fn reply_ms(&self) -> Option<f64> {
        self.succeeded().then_some(self.latency_ms)
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        timestamp_to_datetime(self.timestamp)
    }
}

/// Result of advancing the [`Sampler`].
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Polled before the delay elapsed; nothing was probed.
    Idle,
    Sample(Sample),
}

impl Tick {
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            Tick::Idle => None,
            Tick::Sample(sample) => Some(sample),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Tick::Idle)
    }
}

pub fn unix_now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
}

pub fn timestamp_to_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}

/// Paces a [`Prober`] so that at most one probe is dispatched per delay interval.
///
/// The driver may poll `advance` as often as it likes; early polls return [`Tick::Idle`]
/// without blocking.
pub struct Sampler<P> {
    prober: P,
    delay: Duration,
    last_probe: Option<Instant>,
    sequence: u16,
}

impl<P: Prober> Sampler<P> {
    pub fn new(prober: P, delay: Duration) -> Self {
        Self {
            prober,
            delay,
            last_probe: None,
            sequence: 1,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub async fn advance(&mut self) -> Tick {
        if let Some(last) = self.last_probe {
            if last.elapsed() < self.delay {
                return Tick::Idle;
            }
        }

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let dispatched_at = unix_now();
        let outcome = self.prober.probe(sequence).await;
        self.last_probe = Some(Instant::now());

        Tick::Sample(Sample::new(
            dispatched_at,
            outcome,
            self.prober.timeout(),
            self.prober.payload_size(),
            self.prober.target(),
        ))
    }

    /// Forgets pacing state so the next advance probes immediately.
    pub fn restart(&mut self) {
        self.last_probe = None;
        self.sequence = 1;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProber;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_advance_dispatches_immediately() {
        let prober = ScriptedProber::new([ProbeOutcome::Reply { rtt_ms: 8.0 }]);
        let mut sampler = Sampler::new(prober, DEFAULT_DELAY);
        let tick = sampler.advance().await;
        let sample = tick.sample().expect("first advance probes");
        assert_eq!(sample.latency_ms, 8.0);
        assert_eq!(sample.timeout_ms, 3000);
        assert_eq!(sample.payload_size, 64);
        assert_eq!(sample.target, "192.0.2.1");
    }

    #[tokio::test(start_paused = true)]
    async fn polls_inside_delay_are_idle() {
        let mut sampler = Sampler::new(ScriptedProber::new([]), DEFAULT_DELAY);
        assert!(!sampler.advance().await.is_idle());

        let mut samples = 0;
        let mut idles = 0;
        // 50 polls 20ms apart cover 1s: four more 220ms intervals.
        for _ in 0..50 {
            tokio::time::advance(Duration::from_millis(20)).await;
            match sampler.advance().await {
                Tick::Idle => idles += 1,
                Tick::Sample(_) => samples += 1,
            }
        }
        assert_eq!(samples, 4);
        assert_eq!(idles, 46);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_yields_sentinel() {
        let mut sampler = Sampler::new(ScriptedProber::new([ProbeOutcome::Failed]), DEFAULT_DELAY);
        let tick = sampler.advance().await;
        let sample = tick.sample().expect("sample");
        assert_eq!(sample.latency_ms, FAILURE_SENTINEL_MS);
        assert!(!sample.succeeded());
        assert_eq!(sample.reply_ms(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_counts_from_probe_completion() {
        let mut prober = ScriptedProber::new([]);
        prober.latency = Duration::from_millis(200);
        let mut sampler = Sampler::new(prober, DEFAULT_DELAY);
        assert!(!sampler.advance().await.is_idle());
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(sampler.advance().await.is_idle());
        tokio::time::advance(Duration::from_millis(120)).await;
        assert!(!sampler.advance().await.is_idle());
    }

    #[tokio::test]
    async fn timestamp_marks_dispatch_not_reply() {
        let mut prober = ScriptedProber::new([ProbeOutcome::Failed]);
        prober.latency = Duration::from_millis(50);
        let mut sampler = Sampler::new(prober, DEFAULT_DELAY);

        let before = unix_now();
        let tick = sampler.advance().await;
        let sample = tick.sample().expect("sample");
        assert!(sample.timestamp >= before);
        assert!(sample.timestamp <= sampler.prober().called_at[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_pacing_and_sequence() {
        let mut sampler = Sampler::new(ScriptedProber::new([]), DEFAULT_DELAY);
        sampler.advance().await;
        tokio::time::advance(DEFAULT_DELAY).await;
        sampler.advance().await;
        assert!(sampler.advance().await.is_idle());

        sampler.restart();
        assert!(!sampler.advance().await.is_idle());
        assert_eq!(sampler.prober().sequences, vec![1, 2, 1]);
    }

    #[test]
    fn timestamp_converts_to_datetime() {
        let dt = timestamp_to_datetime(1_496_385_335.5).expect("valid timestamp");
        assert_eq!(dt.timestamp(), 1_496_385_335);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(timestamp_to_datetime(f64::NAN).is_none());
    }
}
