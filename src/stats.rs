use crate::sampler::Sample;

/// Running probe counters for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    probes: u64,
    failures: u64,
    consecutive_failures: u64,
    latency_sum_ms: f64,
    min_ms: Option<f64>,
    max_ms: Option<f64>,
    last_ms: Option<f64>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: &Sample) {
        self.probes += 1;
        match sample.reply_ms() {
            Some(ms) => {
                self.consecutive_failures = 0;
                self.latency_sum_ms += ms;
                self.min_ms = Some(self.min_ms.map_or(ms, |min| min.min(ms)));
                self.max_ms = Some(self.max_ms.map_or(ms, |max| max.max(ms)));
                self.last_ms = Some(ms);
            }
            None => {
                self.failures += 1;
                self.consecutive_failures += 1;
                self.last_ms = None;
            }
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let replies = self.probes - self.failures;
        StatsSnapshot {
            probes: self.probes,
            failures: self.failures,
            loss_ratio: if self.probes == 0 {
                0.0
            } else {
                self.failures as f64 / self.probes as f64
            },
            min_ms: self.min_ms,
            avg_ms: (replies > 0).then(|| self.latency_sum_ms / replies as f64),
            max_ms: self.max_ms,
            last_ms: self.last_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub probes: u64,
    pub failures: u64,
    pub loss_ratio: f64,
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub last_ms: Option<f64>,
}

impl StatsSnapshot {
    /// One-line summary for the chart footer.
    pub fn summary(&self) -> String {
        let fmt_ms = |value: Option<f64>| match value {
            Some(ms) => format!("{ms:.1}"),
            None => "-".to_string(),
        };
        format!(
            "sent {}  lost {} ({:.1}%)  min/avg/max {}/{}/{} ms  last {} ms",
            self.probes,
            self.failures,
            self.loss_ratio * 100.0,
            fmt_ms(self.min_ms),
            fmt_ms(self.avg_ms),
            fmt_ms(self.max_ms),
            fmt_ms(self.last_ms),
        )
    }
}
