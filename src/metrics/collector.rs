//! Metrics collection and registry.

use crate::capture::BitSource;
use crate::service::QrngService;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The registry rejected a metric or failed to encode.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of service state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the last health evaluation passed.
    pub is_healthy: bool,
    /// Current RCT cutoff.
    pub rct_cutoff: usize,
    /// Current AP window.
    pub ap_window: usize,
    /// Current AP cutoff.
    pub ap_cutoff: usize,
    /// Total gate evaluations.
    pub gate_evaluations: u64,
    /// Total failed gate evaluations.
    pub gate_failures: u64,
    /// Successful key derivations.
    pub keys_derived: u64,
    /// Latest Shannon entropy sample.
    pub latest_entropy: Option<f64>,
    /// Latest QBER sample.
    pub latest_qber: Option<f64>,
    /// Total anomaly alerts raised.
    pub anomaly_alerts: u64,
}

/// Prometheus metrics registry for the gate.
pub struct MetricsRegistry {
    registry: Registry,

    // Health gate
    health_status: IntGauge,
    rct_cutoff: IntGauge,
    ap_window: IntGauge,
    ap_cutoff: IntGauge,
    evaluations_total: IntCounter,
    failures_total: IntCounter,

    // Key derivation
    keys_derived_total: IntCounter,

    // Monitoring
    entropy: Gauge,
    qber: Gauge,
    anomaly_alerts_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all gate metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let health_status = IntGauge::new(
            "qrng_gate_health_status",
            "Last health verdict (1=ok, 0=alarm)",
        )?;
        let rct_cutoff = IntGauge::new("qrng_gate_rct_cutoff", "Repetition count test cutoff")?;
        let ap_window = IntGauge::new("qrng_gate_ap_window", "Adaptive proportion test window")?;
        let ap_cutoff = IntGauge::new("qrng_gate_ap_cutoff", "Adaptive proportion test cutoff")?;
        let evaluations_total = IntCounter::new(
            "qrng_gate_evaluations_total",
            "Total health gate evaluations",
        )?;
        let failures_total = IntCounter::new(
            "qrng_gate_failures_total",
            "Total health gate evaluations that raised an alarm",
        )?;

        let keys_derived_total = IntCounter::new(
            "qrng_gate_keys_derived_total",
            "Total successful key derivations",
        )?;

        let entropy = Gauge::new("qrng_gate_entropy", "Latest Shannon entropy per bit")?;
        let qber = Gauge::new("qrng_gate_qber", "Latest quantum bit error rate")?;
        let anomaly_alerts_total = IntCounter::new(
            "qrng_gate_anomaly_alerts_total",
            "Total anomaly alerts raised",
        )?;

        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(rct_cutoff.clone()))?;
        registry.register(Box::new(ap_window.clone()))?;
        registry.register(Box::new(ap_cutoff.clone()))?;
        registry.register(Box::new(evaluations_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(keys_derived_total.clone()))?;
        registry.register(Box::new(entropy.clone()))?;
        registry.register(Box::new(qber.clone()))?;
        registry.register(Box::new(anomaly_alerts_total.clone()))?;

        Ok(Self {
            registry,
            health_status,
            rct_cutoff,
            ap_window,
            ap_cutoff,
            evaluations_total,
            failures_total,
            keys_derived_total,
            entropy,
            qber,
            anomaly_alerts_total,
        })
    }

    /// Updates all metrics from a snapshot of service state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.health_status.set(if snapshot.is_healthy { 1 } else { 0 });
        self.rct_cutoff.set(snapshot.rct_cutoff as i64);
        self.ap_window.set(snapshot.ap_window as i64);
        self.ap_cutoff.set(snapshot.ap_cutoff as i64);

        // Counters only move forward
        advance(&self.evaluations_total, snapshot.gate_evaluations);
        advance(&self.failures_total, snapshot.gate_failures);
        advance(&self.keys_derived_total, snapshot.keys_derived);
        advance(&self.anomaly_alerts_total, snapshot.anomaly_alerts);

        if let Some(entropy) = snapshot.latest_entropy {
            self.entropy.set(entropy);
        }
        if let Some(qber) = snapshot.latest_qber {
            self.qber.set(qber);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the current service state.
    pub fn from_service<S, R>(service: &QrngService<S, R>) -> Self
    where
        S: BitSource,
        R: RngCore + CryptoRng,
    {
        let health = service.health();
        Self {
            is_healthy: health.ok,
            rct_cutoff: health.cutoffs.rct_cutoff,
            ap_window: health.cutoffs.ap_window,
            ap_cutoff: health.cutoffs.ap_cutoff,
            gate_evaluations: service.gate().evaluations(),
            gate_failures: service.gate().failures(),
            keys_derived: service.keys_derived(),
            latest_entropy: service.entropy_history().latest(),
            latest_qber: service.qber_history().latest(),
            anomaly_alerts: service.anomaly_alerts(),
        }
    }
}
