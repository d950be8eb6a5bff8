//! Single ICMP echo attempts.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use crate::platform;

/// Latency recorded in place of a failed probe.
pub const FAILURE_SENTINEL_MS: f64 = -100.0;

/// Largest echo payload accepted.
pub const MAX_PAYLOAD_SIZE: usize = 65_500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Reply { rtt_ms: f64 },
    Failed,
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> f64 {
        match self {
            ProbeOutcome::Reply { rtt_ms } => *rtt_ms,
            ProbeOutcome::Failed => FAILURE_SENTINEL_MS,
        }
    }
}

/// One echo attempt per call. Network failures are reported as [`ProbeOutcome::Failed`],
/// never as errors.
#[async_trait]
pub trait Prober {
    async fn probe(&mut self, sequence: u16) -> ProbeOutcome;

    fn target(&self) -> &str;

    fn timeout(&self) -> Duration;

    fn payload_size(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub target: String,
    pub timeout: Duration,
    pub payload_size: usize,
    pub verbose: bool,
}

impl ProbeSettings {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout: Duration::from_millis(3000),
            payload_size: 64,
            verbose: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            bail!("probe target must not be empty");
        }
        if self.timeout.is_zero() {
            bail!("probe timeout must be greater than zero");
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            bail!(
                "payload size {} exceeds the maximum of {} bytes",
                self.payload_size,
                MAX_PAYLOAD_SIZE
            );
        }
        Ok(())
    }
}

/// Resolve hostname to IP address.
pub async fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host(format!("{host}:0"))
        .await
        .with_context(|| format!("failed to resolve {host}"))?;
    match addrs.next() {
        Some(addr) => Ok(addr.ip()),
        None => bail!("no addresses found for {host}"),
    }
}

/// [`Prober`] backed by `surge-ping`.
pub struct IcmpProber {
    settings: ProbeSettings,
    address: IpAddr,
    identifier: PingIdentifier,
    payload: Vec<u8>,
    client: Option<Client>,
    hinted: bool,
}

impl std::fmt::Debug for IcmpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpProber")
            .field("settings", &self.settings)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl IcmpProber {
    pub async fn new(settings: ProbeSettings) -> Result<Self> {
        settings.validate()?;
        let address = resolve_host(&settings.target).await?;
        tracing::info!(target_host = %settings.target, address = %address, "probe target resolved");
        Ok(Self {
            payload: vec![0u8; settings.payload_size],
            settings,
            address,
            identifier: PingIdentifier(rand::random()),
            client: None,
            hinted: false,
        })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    fn client(&mut self) -> Option<&Client> {
        if self.client.is_none() {
            let config = match self.address {
                IpAddr::V4(_) => Config::default(),
                IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
            };
            match Client::new(&config) {
                Ok(client) => self.client = Some(client),
                Err(err) => {
                    tracing::warn!(
                        target_host = %self.settings.target,
                        error = %err,
                        "failed to open ICMP socket"
                    );
                    if err.kind() == std::io::ErrorKind::PermissionDenied && !self.hinted {
                        self.hinted = true;
                        tracing::warn!(
                            guidance = platform::raw_socket_guidance(),
                            "ICMP needs extra privileges"
                        );
                    }
                    return None;
                }
            }
        }
        self.client.as_ref()
    }

    fn report(&self, sequence: u16, outcome: &ProbeOutcome) {
        let target_host = &self.settings.target;
        match (outcome, self.settings.verbose) {
            (ProbeOutcome::Reply { rtt_ms }, true) => {
                tracing::info!(%target_host, sequence, latency_ms = rtt_ms, "echo reply")
            }
            (ProbeOutcome::Reply { rtt_ms }, false) => {
                tracing::debug!(%target_host, sequence, latency_ms = rtt_ms, "echo reply")
            }
            (ProbeOutcome::Failed, true) => {
                tracing::info!(%target_host, sequence, "request timed out")
            }
            (ProbeOutcome::Failed, false) => {
                tracing::debug!(%target_host, sequence, "request timed out")
            }
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&mut self, sequence: u16) -> ProbeOutcome {
        let outcome = match self.client().cloned() {
            None => ProbeOutcome::Failed,
            Some(client) => {
                let mut pinger = client.pinger(self.address, self.identifier).await;
                pinger.timeout(self.settings.timeout);
                match pinger.ping(PingSequence(sequence), &self.payload).await {
                    Ok((_, rtt)) => ProbeOutcome::Reply {
                        rtt_ms: rtt.as_secs_f64() * 1000.0,
                    },
                    Err(err) => {
                        tracing::warn!(
                            target_host = %self.settings.target,
                            sequence,
                            error = %err,
                            "ping probe failed"
                        );
                        ProbeOutcome::Failed
                    }
                }
            }
        };
        self.report(sequence, &outcome);
        outcome
    }

    fn target(&self) -> &str {
        &self.settings.target
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn payload_size(&self) -> usize {
        self.settings.payload_size
    }
}
