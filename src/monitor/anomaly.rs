//! Threshold and trend alerts over entropy and QBER histories.

use super::history::RollingHistory;
use crate::config::{MonitorConfig, PolicyConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A single anomaly finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Latest entropy is below the threshold.
    LowEntropy {
        /// Latest entropy sample.
        observed: f64,
        /// Configured entropy threshold.
        threshold: f64,
    },
    /// Latest QBER is above the threshold.
    HighQber {
        /// Latest QBER sample.
        observed: f64,
        /// Configured QBER threshold.
        threshold: f64,
    },
    /// Raised alongside [`Alert::HighQber`].
    EavesdroppingSuspected,
    /// Entropy over the trend window is falling.
    DecliningEntropyTrend {
        /// Fitted slope per sample.
        slope: f64,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::LowEntropy {
                observed,
                threshold,
            } => write!(
                f,
                "Low entropy detected: {:.3} (expected >{})",
                observed, threshold
            ),
            Alert::HighQber {
                observed,
                threshold,
            } => write!(
                f,
                "High QBER detected: {:.3} (threshold: {})",
                observed, threshold
            ),
            Alert::EavesdroppingSuspected => {
                f.write_str("Possible eavesdropping attempt or channel noise")
            }
            Alert::DecliningEntropyTrend { .. } => {
                f.write_str("Declining entropy trend - possible hardware degradation")
            }
        }
    }
}

/// Aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    /// No alerts.
    Normal,
    /// At least one alert.
    Alert,
}

/// Aggregate security assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityAssessment {
    /// No alerts.
    Secure,
    /// At least one alert.
    Compromised,
}

/// Result of one anomaly pass.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    /// Alerts in firing order.
    pub alerts: Vec<Alert>,
    /// Aggregate status.
    pub status: MonitorStatus,
    /// Aggregate assessment.
    pub security_assessment: SecurityAssessment,
    /// Latest finite entropy sample, if any.
    pub entropy_level: Option<f64>,
    /// Latest finite QBER sample, if any.
    pub qber_level: Option<f64>,
    /// When the pass ran.
    pub timestamp: DateTime<Utc>,
}

impl AnomalyReport {
    /// Alert texts, in firing order.
    pub fn messages(&self) -> Vec<String> {
        self.alerts.iter().map(ToString::to_string).collect()
    }

    /// Returns true if any alert matches `pred`.
    pub fn has_alert(&self, pred: impl Fn(&Alert) -> bool) -> bool {
        self.alerts.iter().any(pred)
    }
}

/// Least-squares slope of `values` against their index.
///
/// `None` for fewer than two samples or any non-finite sample.
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    Some(num / den)
}

/// Flags threshold breaches and a declining entropy trend.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    entropy_threshold: f64,
    qber_threshold: f64,
    trend_window: usize,
    trend_slope_threshold: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(&PolicyConfig::default(), &MonitorConfig::default())
    }
}

impl AnomalyDetector {
    /// Creates a detector from policy and monitor settings.
    pub fn new(policy: &PolicyConfig, monitor: &MonitorConfig) -> Self {
        Self {
            entropy_threshold: policy.entropy_threshold,
            qber_threshold: policy.qber_threshold,
            trend_window: monitor.trend_window.max(2),
            trend_slope_threshold: monitor.trend_slope_threshold,
        }
    }

    /// Analyzes the rolling histories.
    pub fn detect(&self, entropy: &RollingHistory, qber: &RollingHistory) -> AnomalyReport {
        self.detect_series(&entropy.to_vec(), &qber.to_vec())
    }

    /// Analyzes raw series. Non-finite values are dropped first; bad data
    /// only ever skips a check.
    pub fn detect_series(&self, entropy: &[f64], qber: &[f64]) -> AnomalyReport {
        let ent: Vec<f64> = entropy.iter().copied().filter(|v| v.is_finite()).collect();
        let qbr: Vec<f64> = qber.iter().copied().filter(|v| v.is_finite()).collect();

        let entropy_level = ent.last().copied();
        let qber_level = qbr.last().copied();
        let mut alerts = Vec::new();

        if let Some(latest) = entropy_level {
            if latest < self.entropy_threshold {
                alerts.push(Alert::LowEntropy {
                    observed: latest,
                    threshold: self.entropy_threshold,
                });
            }

            let window = &ent[ent.len().saturating_sub(self.trend_window)..];
            match linear_slope(window) {
                Some(slope) if slope < self.trend_slope_threshold => {
                    alerts.push(Alert::DecliningEntropyTrend { slope });
                }
                Some(_) => {}
                None => tracing::debug!(samples = window.len(), "Trend analysis skipped"),
            }
        }

        if let Some(latest) = qber_level {
            if latest > self.qber_threshold {
                alerts.push(Alert::HighQber {
                    observed: latest,
                    threshold: self.qber_threshold,
                });
                alerts.push(Alert::EavesdroppingSuspected);
            }
        }

        let flagged = !alerts.is_empty();
        if flagged {
            tracing::warn!(alerts = alerts.len(), "Anomalies detected");
        }

        AnomalyReport {
            alerts,
            status: if flagged {
                MonitorStatus::Alert
            } else {
                MonitorStatus::Normal
            },
            security_assessment: if flagged {
                SecurityAssessment::Compromised
            } else {
                SecurityAssessment::Secure
            },
            entropy_level,
            qber_level,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_trend(a: &Alert) -> bool {
        matches!(a, Alert::DecliningEntropyTrend { .. })
    }

    #[test]
    fn test_declining_trend_flagged() {
        let report = AnomalyDetector::default()
            .detect_series(&[0.98, 0.95, 0.91, 0.87, 0.82], &[]);
        assert!(report.has_alert(is_trend));
        assert_eq!(report.status, MonitorStatus::Alert);
    }

    #[test]
    fn test_flat_series_not_flagged() {
        let report = AnomalyDetector::default()
            .detect_series(&[0.95, 0.96, 0.95, 0.96, 0.95], &[0.03]);
        assert!(report.alerts.is_empty());
        assert_eq!(report.status, MonitorStatus::Normal);
        assert_eq!(report.security_assessment, SecurityAssessment::Secure);
    }

    #[test]
    fn test_high_qber_emits_two_alerts() {
        let report = AnomalyDetector::default().detect_series(&[0.97], &[0.02, 0.15]);
        assert_eq!(
            report.messages(),
            vec![
                "High QBER detected: 0.150 (threshold: 0.11)".to_string(),
                "Possible eavesdropping attempt or channel noise".to_string(),
            ]
        );
        assert_eq!(report.security_assessment, SecurityAssessment::Compromised);
    }

    #[test]
    fn test_low_entropy_alert() {
        let report = AnomalyDetector::default().detect_series(&[0.85], &[]);
        assert_eq!(report.messages(), vec!["Low entropy detected: 0.850 (expected >0.9)"]);
        assert_eq!(report.entropy_level, Some(0.85));
        assert_eq!(report.qber_level, None);
    }

    #[test]
    fn test_single_sample_skips_trend() {
        let report = AnomalyDetector::default().detect_series(&[0.95], &[]);
        assert!(!report.has_alert(is_trend));
    }

    #[test]
    fn test_non_finite_values_dropped() {
        let report = AnomalyDetector::default()
            .detect_series(&[0.95, f64::NAN, 0.96, f64::INFINITY], &[f64::NAN]);
        assert!(report.alerts.is_empty());
        assert_eq!(report.entropy_level, Some(0.96));
        assert_eq!(report.qber_level, None);
    }

    #[test]
    fn test_only_last_five_samples_fitted() {
        // Early decline followed by a flat tail.
        let series = [0.99, 0.90, 0.80, 0.95, 0.95, 0.95, 0.95, 0.95];
        let report = AnomalyDetector::default().detect_series(&series, &[]);
        assert!(!report.has_alert(is_trend));
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[1.0]), None);
        assert_eq!(linear_slope(&[1.0, f64::NAN]), None);
        let slope = linear_slope(&[0.0, 0.5, 1.0, 1.5]).unwrap();
        assert!((slope - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_detect_from_histories() {
        let mut entropy = RollingHistory::with_capacity(200);
        let mut qber = RollingHistory::with_capacity(200);
        entropy.extend([0.98, 0.95, 0.91, 0.87, 0.82]);
        qber.push(0.04);

        let report = AnomalyDetector::default().detect(&entropy, &qber);
        assert!(report.has_alert(is_trend));
        assert!(report.has_alert(|a| matches!(a, Alert::LowEntropy { .. })));
    }
}
