//! Prometheus metrics for the health gate.
//!
//! This module exposes gate and monitor state in Prometheus format. The
//! HTTP exporter is only built with the `metrics` feature.
//!
//! # Metrics Exposed
//!
//! ## Health Gate
//! - `qrng_gate_health_status` - Last verdict (1=ok, 0=alarm)
//! - `qrng_gate_rct_cutoff`, `qrng_gate_ap_window`, `qrng_gate_ap_cutoff` - Active cutoffs
//! - `qrng_gate_evaluations_total` - Gate evaluations
//! - `qrng_gate_failures_total` - Evaluations that raised an alarm
//!
//! ## Key Derivation
//! - `qrng_gate_keys_derived_total` - Successful derivations
//!
//! ## Monitoring
//! - `qrng_gate_entropy` - Latest Shannon entropy sample
//! - `qrng_gate_qber` - Latest QBER sample
//! - `qrng_gate_anomaly_alerts_total` - Alerts raised
//!
//! # Example
//!
//! ```no_run
//! use qrng_gate::metrics::{MetricsRegistry, MetricsSnapshot};
//! use qrng_gate::{FileConfig, QrngService};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let mut service = QrngService::from_config(&FileConfig::default()).unwrap();
//! service.random_bytes(32).unwrap();
//!
//! registry.update(&MetricsSnapshot::from_service(&service));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
