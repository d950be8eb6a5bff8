use anyhow::{bail, Context, Result};
use std::collections::VecDeque;

use crate::probe::FAILURE_SENTINEL_MS;
use crate::sampler::Sample;

pub const DEFAULT_CAPACITY: usize = 250;

fn push_bounded(queue: &mut VecDeque<f64>, value: f64, capacity: usize) {
    if queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(value);
}

/// Parses a window capacity from user input, rejecting zero, negatives and fractions.
pub fn parse_capacity(raw: &str) -> Result<usize> {
    let trimmed = raw.trim();
    let value: i64 = trimmed
        .parse()
        .with_context(|| format!("table length must be an integer, got '{trimmed}'"))?;
    if value <= 0 {
        bail!("table length must be at least 1, got {value}");
    }
    usize::try_from(value).with_context(|| format!("table length {value} is too large"))
}

/// The most recent `capacity` chart points. Timestamps and latencies are held in parallel;
/// index `i` of each refers to the same sample.
#[derive(Debug, Clone)]
pub struct Window {
    capacity: usize,
    x: VecDeque<f64>,
    y: VecDeque<f64>,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            x: VecDeque::with_capacity(DEFAULT_CAPACITY),
            y: VecDeque::with_capacity(DEFAULT_CAPACITY),
        }
    }
}

impl Window {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            bail!("table length must be at least 1");
        }
        Ok(Self {
            capacity,
            x: VecDeque::with_capacity(capacity),
            y: VecDeque::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append_x(&mut self, timestamp: f64) {
        push_bounded(&mut self.x, timestamp, self.capacity);
    }

    /// `None` marks a failed probe and is stored as the sentinel.
    pub fn append_y(&mut self, value: Option<f64>) {
        push_bounded(&mut self.y, value.unwrap_or(FAILURE_SENTINEL_MS), self.capacity);
    }

    pub fn get_x(&self) -> &VecDeque<f64> {
        &self.x
    }

    pub fn get_y(&self) -> &VecDeque<f64> {
        &self.y
    }

    pub fn push(&mut self, sample: &Sample) {
        self.append_x(sample.timestamp);
        self.append_y(sample.reply_ms());
    }

    pub fn points(&self) -> Vec<(f64, f64)> {
        self.x.iter().copied().zip(self.y.iter().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use std::time::Duration;

    #[test]
    fn keeps_last_n_values_in_order() {
        for capacity in 1..=8usize {
            let mut window = Window::new(capacity).unwrap();
            let total = capacity * 3 + 1;
            for i in 0..total {
                window.append_x(i as f64);
                window.append_y(Some(i as f64 * 2.0));
            }
            assert_eq!(window.len(), capacity);
            let expected_x: Vec<f64> = ((total - capacity)..total).map(|i| i as f64).collect();
            let expected_y: Vec<f64> = expected_x.iter().map(|x| x * 2.0).collect();
            assert_eq!(window.get_x().iter().copied().collect::<Vec<_>>(), expected_x);
            assert_eq!(window.get_y().iter().copied().collect::<Vec<_>>(), expected_y);
        }
    }

    #[test]
    fn failures_are_encoded_and_oldest_evicted() {
        let mut window = Window::new(2).unwrap();
        for (x, y) in [(1.0, Some(10.5)), (2.0, None), (3.0, Some(12.0))] {
            window.append_x(x);
            window.append_y(y);
        }
        assert_eq!(window.points(), vec![(2.0, -100.0), (3.0, 12.0)]);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(Window::new(0).is_err());
    }

    #[test]
    fn parse_capacity_rejects_bad_input() {
        assert_eq!(parse_capacity("250").unwrap(), 250);
        assert!(parse_capacity("0").is_err());
        assert!(parse_capacity("-3").is_err());
        assert!(parse_capacity("2.5").is_err());
        assert!(parse_capacity("many").is_err());
    }

    #[test]
    fn push_uses_sample_fields() {
        let mut window = Window::default();
        assert_eq!(window.capacity(), DEFAULT_CAPACITY);
        let timeout = Duration::from_secs(3);
        let ok = Sample::new(10.0, ProbeOutcome::Reply { rtt_ms: 4.25 }, timeout, 64, "h");
        let lost = Sample::new(11.0, ProbeOutcome::Failed, timeout, 64, "h");
        window.push(&ok);
        window.push(&lost);
        assert_eq!(window.points(), vec![(10.0, 4.25), (11.0, FAILURE_SENTINEL_MS)]);
        assert!(!window.is_empty());
    }
}
