//! Rolling entropy/QBER histories and anomaly detection.

mod anomaly;
mod history;

pub use anomaly::{
    linear_slope, Alert, AnomalyDetector, AnomalyReport, MonitorStatus, SecurityAssessment,
};
pub use history::{RollingHistory, DEFAULT_CAPACITY};
