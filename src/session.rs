use anyhow::Result;
use ratatui::backend::Backend;
use std::future::Future;
use std::time::Duration;
use tokio::{
    signal,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};

use crate::config::AppConfig;
use crate::probe::Prober;
use crate::recorder::Recorder;
use crate::render::LiveRenderer;
use crate::sampler::{Sampler, Tick};
use crate::stats::SessionStats;
use crate::window::Window;

/// One live monitoring run: the sampler feeds the window, stats and (optionally) the log,
/// and the renderer redraws the window on every refresh.
pub struct Session<P, B: Backend> {
    sampler: Sampler<P>,
    window: Window,
    recorder: Option<Recorder>,
    stats: SessionStats,
    renderer: LiveRenderer<B>,
    heartbeat: Duration,
    failure_alert_threshold: u64,
    alerted: bool,
    heartbeats: u64,
}

impl<P: Prober, B: Backend> Session<P, B> {
    pub fn new(
        sampler: Sampler<P>,
        window: Window,
        recorder: Option<Recorder>,
        renderer: LiveRenderer<B>,
        heartbeat: Duration,
        failure_alert_threshold: u64,
    ) -> Self {
        Self {
            sampler,
            window,
            recorder,
            stats: SessionStats::new(),
            renderer,
            heartbeat,
            failure_alert_threshold,
            alerted: false,
            heartbeats: 0,
        }
    }

    /// Builds every collaborator from `config`, opening the log unless `nofile` is set.
    pub async fn open(config: &AppConfig, prober: P, renderer: LiveRenderer<B>) -> Result<Self> {
        let window = Window::new(config.table_length)?;
        let recorder = if config.nofile {
            None
        } else {
            let recorder = Recorder::open(&config.log_directory, &config.log_name).await?;
            tracing::info!(path = %recorder.path().display(), "log file opened");
            Some(recorder)
        };
        Ok(Self::new(
            Sampler::new(prober, config.delay()),
            window,
            recorder,
            renderer,
            config.heartbeat_interval(),
            config.failure_alert_threshold,
        ))
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    pub fn renderer(&self) -> &LiveRenderer<B> {
        &self.renderer
    }

    /// Whether the current failure streak has already raised its alert.
    pub fn alerted(&self) -> bool {
        self.alerted
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    /// Advances the sampler once and routes any sample to the window, stats and log.
    pub async fn step(&mut self) -> Result<Tick> {
        let tick = self.sampler.advance().await;
        if let Tick::Sample(sample) = &tick {
            self.window.push(sample);
            self.stats.record(sample);
            self.check_failure_streak();
        }
        match self.recorder.as_mut() {
            Some(recorder) => recorder.record(tick).await,
            None => Ok(tick),
        }
    }

    fn check_failure_streak(&mut self) {
        let streak = self.stats.consecutive_failures();
        if streak == 0 {
            self.alerted = false;
        } else if self.failure_alert_threshold > 0
            && streak >= self.failure_alert_threshold
            && !self.alerted
        {
            self.alerted = true;
            tracing::warn!(
                target_host = %self.sampler.prober().target(),
                consecutive_failures = streak,
                "target unreachable"
            );
        }
    }

    fn log_heartbeat(&mut self) {
        self.heartbeats += 1;
        let snapshot = self.stats.snapshot();
        tracing::info!(
            target_host = %self.sampler.prober().target(),
            probes = snapshot.probes,
            failures = snapshot.failures,
            loss_percent = snapshot.loss_ratio * 100.0,
            avg_ms = ?snapshot.avg_ms,
            "health heartbeat"
        );
    }

    /// Redraws and steps on every refresh until `close_requested` reports true or SIGINT
    /// arrives.
    pub async fn run<F>(&mut self, close_requested: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        self.run_until(close_requested, signal::ctrl_c()).await
    }

    /// Like [`Session::run`], but stops when `shutdown` completes instead of on SIGINT.
    pub async fn run_until<F, S>(&mut self, mut close_requested: F, shutdown: S) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
        S: Future,
    {
        let mut refresh = interval(self.renderer.refresh());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        tokio::pin!(shutdown);

        tracing::info!(
            target_host = %self.sampler.prober().target(),
            delay_ms = self.sampler.delay().as_millis() as u64,
            capacity = self.window.capacity(),
            "live session starting"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("interrupt received, closing chart");
                    break;
                }
                _ = heartbeat.tick() => self.log_heartbeat(),
                _ = refresh.tick() => {
                    if close_requested()? {
                        tracing::info!("chart closed by operator");
                        break;
                    }
                    let footer = self.stats.snapshot().summary();
                    self.renderer.draw(&self.window, &footer)?;
                    // A probe to an unreachable host holds this arm for up to its timeout.
                    // Shutdown still cuts it short; close keys are read on the next refresh.
                    tokio::select! {
                        result = self.step() => {
                            if let Err(err) = result {
                                tracing::error!(error = %err, "recorder failed");
                            }
                        }
                        _ = &mut shutdown => {
                            tracing::info!("interrupt received during probe, closing chart");
                            break;
                        }
                    }
                }
            }
        }

        self.log_heartbeat();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeOutcome, FAILURE_SENTINEL_MS};
    use crate::render::{buffer_text, CHART_TITLE};
    use crate::sampler::{testing::ScriptedProber, DEFAULT_DELAY};
    use ratatui::backend::TestBackend;
    use tempfile::tempdir;

    fn renderer() -> LiveRenderer<TestBackend> {
        LiveRenderer::new(TestBackend::new(100, 30), Duration::from_millis(200)).unwrap()
    }

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            log_directory: dir.to_string_lossy().to_string(),
            log_name: "session".into(),
            ..AppConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn step_feeds_window_stats_and_log() {
        let tmp = tempdir().expect("tmp");
        let prober =
            ScriptedProber::new([ProbeOutcome::Reply { rtt_ms: 5.0 }, ProbeOutcome::Failed]);
        let mut session = Session::open(&config_in(tmp.path()), prober, renderer())
            .await
            .expect("open");

        assert!(session.step().await.unwrap().sample().is_some());
        assert!(session.step().await.unwrap().is_idle());
        tokio::time::advance(Duration::from_millis(220)).await;
        let tick = session.step().await.unwrap();
        assert_eq!(tick.sample().map(|s| s.latency_ms), Some(FAILURE_SENTINEL_MS));

        let ys: Vec<f64> = session.window().get_y().iter().copied().collect();
        assert_eq!(ys, vec![5.0, FAILURE_SENTINEL_MS]);
        assert_eq!(session.stats().snapshot().failures, 1);

        let content = std::fs::read_to_string(tmp.path().join("session.csv")).expect("read log");
        let latencies: Vec<&str> = content
            .lines()
            .map(|line| line.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(latencies, vec!["5", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn nofile_session_has_no_recorder() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            nofile: true,
            ..config_in(tmp.path())
        };
        let mut session = Session::open(&config, ScriptedProber::new([]), renderer())
            .await
            .expect("open");
        assert!(session.recorder().is_none());
        session.step().await.unwrap();
        assert!(!tmp.path().join("session.csv").exists());
        assert_eq!(session.window().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_redraws_until_closed() {
        let tmp = tempdir().expect("tmp");
        let mut session = Session::open(&config_in(tmp.path()), ScriptedProber::new([]), renderer())
            .await
            .expect("open");

        let mut polls = 0;
        session
            .run(|| {
                polls += 1;
                Ok(polls > 10)
            })
            .await
            .expect("run");

        // Ten 200ms refreshes against a 220ms delay probe on every other refresh.
        assert_eq!(session.window().len(), 5);
        assert_eq!(session.stats().snapshot().probes, 5);
        let rows = std::fs::read_to_string(tmp.path().join("session.csv")).expect("read log");
        assert_eq!(rows.lines().count(), 5);
        assert!(buffer_text(session.renderer().backend()).contains(CHART_TITLE));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_zero_table_length() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            table_length: 0,
            ..config_in(tmp.path())
        };
        assert!(Session::open(&config, ScriptedProber::new([]), renderer()).await.is_err());
    }

    async fn alert_states(threshold: u64, outcomes: Vec<ProbeOutcome>) -> Vec<bool> {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            nofile: true,
            failure_alert_threshold: threshold,
            ..config_in(tmp.path())
        };
        let steps = outcomes.len();
        let mut session = Session::open(&config, ScriptedProber::new(outcomes), renderer())
            .await
            .expect("open");

        let mut states = Vec::new();
        for _ in 0..steps {
            assert!(session.step().await.unwrap().sample().is_some());
            states.push(session.alerted());
            tokio::time::advance(DEFAULT_DELAY).await;
        }
        states
    }

    #[tokio::test(start_paused = true)]
    async fn failure_alert_raised_once_per_streak() {
        let failed = ProbeOutcome::Failed;
        let reply = ProbeOutcome::Reply { rtt_ms: 4.0 };
        let states = alert_states(
            3,
            vec![failed, failed, failed, failed, reply, failed, failed, failed],
        )
        .await;
        assert_eq!(states, vec![false, false, true, true, false, false, false, true]);

        let raised = states.windows(2).filter(|pair| !pair[0] && pair[1]).count();
        assert_eq!(raised, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_threshold_disables_failure_alert() {
        let states = alert_states(0, vec![ProbeOutcome::Failed; 12]).await;
        assert!(states.iter().all(|alerted| !alerted));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_logged_on_schedule_and_at_exit() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            nofile: true,
            heartbeat_seconds: 1,
            refresh_ms: 300,
            ..config_in(tmp.path())
        };
        let renderer =
            LiveRenderer::new(TestBackend::new(100, 30), config.refresh_interval()).unwrap();
        let mut session = Session::open(&config, ScriptedProber::new([]), renderer)
            .await
            .expect("open");

        // The ninth poll lands at 2.4s, after heartbeats at 1s and 2s.
        let mut polls = 0;
        session
            .run(|| {
                polls += 1;
                Ok(polls > 8)
            })
            .await
            .expect("run");
        assert_eq!(session.heartbeats(), 3);
        assert_eq!(session.stats().snapshot().probes, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_slow_probe() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            nofile: true,
            ..config_in(tmp.path())
        };
        let mut prober = ScriptedProber::new([]);
        prober.latency = Duration::from_secs(3);
        let mut session = Session::open(&config, prober, renderer()).await.expect("open");

        let started = Instant::now();
        session
            .run_until(|| Ok(false), tokio::time::sleep(Duration::from_millis(500)))
            .await
            .expect("run");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(session.stats().snapshot().probes, 0);
        assert_eq!(session.window().len(), 0);
    }
}
