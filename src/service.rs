//! Request-level orchestration.
//!
//! [`QrngService`] owns the bit source, the health gate, the rolling
//! histories, the session key and the CSPRNG used for salts and nonces.
//! Every operation takes `&mut self`, so a gate verdict and the key
//! derivation that depends on it can never interleave with another
//! request. [`SharedService`] adds the lock for multi-threaded hosts.

use crate::analysis::{shannon_entropy, HealthGate, HealthState, RandomnessSummary};
use crate::bits::{BitCounts, BitString};
use crate::capture::{self, BitSource, DatasetKind, DatasetRecord, DatasetRegistry};
use crate::cipher::{self, SealedMessage};
use crate::conditioning::{
    derive_key, DerivedKey, INFO_RNG_BYTES, INFO_SESSION_KEY, MAX_OUTPUT_LEN,
};
use crate::config::{FileConfig, PolicyConfig};
use crate::error::{Error, Result};
use crate::monitor::{AnomalyDetector, AnomalyReport, RollingHistory};
use crate::qkd::{
    inject_noise, BellTestResult, BellVerdict, QkdProtocol, QkdRoundResult, RoundVerdict,
    SecurityAssessor,
};
use chrono::{DateTime, Utc};
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Session keys are AES-256 keys.
pub const SESSION_KEY_LEN: usize = 32;

/// Bits sampled when generating a session key from the source.
pub const SESSION_KEY_BITS: usize = 512;

/// Per-request randomness report.
#[derive(Debug, Clone, Serialize)]
pub struct RngReport {
    /// Sampled bits.
    pub bits: BitString,
    /// Outcome counts.
    pub distribution: BitCounts,
    /// Shannon entropy per bit.
    pub entropy: f64,
    /// Sampling budget.
    pub shots: usize,
    /// Backend name.
    pub source: String,
    /// Health verdict for these bits.
    pub online_health: HealthState,
    /// Balance and run summary.
    pub randomness: RandomnessSummary,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

/// A QKD round with its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct QkdReport {
    /// Round result after any noise.
    pub round: QkdRoundResult,
    /// Noise probability applied.
    pub noise: f64,
    /// Bits flipped by the noise.
    pub flipped_bits: usize,
    /// QBER verdict.
    pub verdict: RoundVerdict,
}

/// Health record plus the latest dataset digests.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    /// Last health verdict.
    pub health: HealthState,
    /// Latest digest per dataset kind.
    pub datasets: DatasetRegistry,
}

/// Gated QRNG pipeline.
pub struct QrngService<S, R> {
    policy: PolicyConfig,
    source: S,
    gate: HealthGate,
    assessor: SecurityAssessor,
    detector: AnomalyDetector,
    entropy_history: RollingHistory,
    qber_history: RollingHistory,
    session_key: Option<DerivedKey>,
    datasets: DatasetRegistry,
    keys_derived: u64,
    anomaly_alerts: u64,
    rng: R,
}

impl QrngService<Box<dyn BitSource + Send>, ChaCha20Rng> {
    /// Builds a service from configuration, seeding the CSPRNG from the OS.
    pub fn from_config(config: &FileConfig) -> Result<Self> {
        config.validate()?;
        let source = capture::build_source(&config.source)?;
        Ok(Self::new(config, source, ChaCha20Rng::from_entropy()))
    }
}

impl<S, R> QrngService<S, R>
where
    S: BitSource,
    R: RngCore + CryptoRng,
{
    /// Creates a service around `source`, drawing salts and nonces from `rng`.
    pub fn new(config: &FileConfig, source: S, rng: R) -> Self {
        let capacity = config.monitor.history_capacity;
        tracing::info!(
            source = source.name(),
            min_entropy_per_bit = config.policy.min_entropy_per_bit,
            qber_threshold = config.policy.qber_threshold,
            "QRNG service initialized"
        );

        Self {
            policy: config.policy.clone(),
            source,
            gate: HealthGate::new(),
            assessor: SecurityAssessor::new(config.policy.qber_threshold),
            detector: AnomalyDetector::new(&config.policy, &config.monitor),
            entropy_history: RollingHistory::with_capacity(capacity),
            qber_history: RollingHistory::with_capacity(capacity),
            session_key: None,
            datasets: DatasetRegistry::new(),
            keys_derived: 0,
            anomaly_alerts: 0,
            rng,
        }
    }

    /// Samples bits and reports their distribution, entropy and health.
    ///
    /// The health verdict is reported, not enforced. The Shannon entropy
    /// is appended to the entropy history.
    pub fn sample_bits(&mut self, num_bits: usize, shots: usize) -> Result<RngReport> {
        if num_bits == 0 {
            return Err(Error::invalid("num_bits must be positive"));
        }

        let sample = self.source.sample(num_bits, shots)?;
        let online_health = self
            .gate
            .evaluate(&sample.bits, self.policy.min_entropy_per_bit)?;
        let entropy = shannon_entropy(&sample.counts);
        self.entropy_history.push(entropy);

        Ok(RngReport {
            randomness: RandomnessSummary::analyze(&sample.bits),
            bits: sample.bits,
            distribution: sample.counts,
            entropy,
            shots: sample.shots,
            source: sample.source,
            online_health,
            timestamp: Utc::now(),
        })
    }

    /// Produces `nbytes` of conditioned output from freshly gated bits.
    ///
    /// The length is checked before the source is sampled.
    pub fn random_bytes(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        if nbytes == 0 || nbytes > MAX_OUTPUT_LEN {
            return Err(Error::invalid(format!(
                "nbytes must be 1..={}, got {}",
                MAX_OUTPUT_LEN, nbytes
            )));
        }

        let nbits = (nbytes * 8).max(8);
        let sample = self.source.sample(nbits, (nbits * 2).max(1024))?;
        let key = self.derive(&sample.bits, nbytes, None, INFO_RNG_BYTES)?;
        Ok(key.as_bytes().to_vec())
    }

    /// Gates `bits` and derives `out_len` bytes from them.
    pub fn derive(
        &mut self,
        bits: &BitString,
        out_len: usize,
        salt: Option<&[u8]>,
        info: &[u8],
    ) -> Result<DerivedKey> {
        if bits.is_empty() {
            return Err(Error::invalid("bitstring is empty"));
        }

        let vetted = self.gate.admit(bits, self.policy.min_entropy_per_bit)?;
        let key = derive_key(vetted, out_len, salt, info, &mut self.rng)?;
        self.keys_derived += 1;
        Ok(key)
    }

    /// Derives and installs a session key from supplied bits.
    ///
    /// On a health alarm the previous session key is kept.
    pub fn set_session_key(&mut self, bits: &BitString) -> Result<()> {
        let key = self.derive(bits, SESSION_KEY_LEN, None, INFO_SESSION_KEY)?;
        self.session_key = Some(key);
        tracing::info!(bits = bits.len(), "Session key established");
        Ok(())
    }

    /// Samples the source and installs a session key from the result.
    pub fn generate_session_key(&mut self) -> Result<()> {
        let sample = self
            .source
            .sample(SESSION_KEY_BITS, (SESSION_KEY_BITS * 2).max(1024))?;
        self.set_session_key(&sample.bits)
    }

    /// Returns true once a session key is installed.
    pub fn has_session_key(&self) -> bool {
        self.session_key.is_some()
    }

    /// Encrypts under the session key.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<SealedMessage> {
        if plaintext.is_empty() {
            return Err(Error::invalid("message is empty"));
        }
        let key = self.session_key.as_ref().ok_or_else(no_session_key)?;
        Ok(cipher::seal(key, plaintext, &mut self.rng)?)
    }

    /// Decrypts under the session key.
    pub fn decrypt(&self, sealed: &SealedMessage) -> Result<Vec<u8>> {
        let key = self.session_key.as_ref().ok_or_else(no_session_key)?;
        Ok(cipher::open(key, sealed)?)
    }

    /// Runs a protocol, optionally degrades the channel, and assesses it.
    ///
    /// The resulting QBER is appended to the QBER history.
    pub fn run_qkd<P>(&mut self, protocol: &mut P, rounds: usize, noise: f64) -> Result<QkdReport>
    where
        P: QkdProtocol + ?Sized,
    {
        if rounds == 0 {
            return Err(Error::invalid("rounds must be positive"));
        }

        let mut round = protocol.run(rounds);
        let flipped_bits = inject_noise(&mut round, noise, &mut self.rng)?;
        let verdict = self.assess_round(&round);

        Ok(QkdReport {
            round,
            noise,
            flipped_bits,
            verdict,
        })
    }

    /// Classifies a round and records its QBER.
    pub fn assess_round(&mut self, round: &QkdRoundResult) -> RoundVerdict {
        self.qber_history.push(round.qber);
        self.assessor.assess_round(round)
    }

    /// Classifies a CHSH Bell test.
    pub fn assess_bell(&self, result: &BellTestResult) -> BellVerdict {
        self.assessor.assess_bell(result)
    }

    /// Appends an entropy sample to the history.
    pub fn record_entropy(&mut self, value: f64) {
        self.entropy_history.push(value);
    }

    /// Appends a QBER sample to the history.
    pub fn record_qber(&mut self, value: f64) {
        self.qber_history.push(value);
    }

    /// Runs the anomaly detector over the current histories.
    pub fn detect_anomalies(&mut self) -> AnomalyReport {
        let report = self
            .detector
            .detect(&self.entropy_history, &self.qber_history);
        self.anomaly_alerts += report.alerts.len() as u64;
        report
    }

    /// Last health verdict.
    pub fn health(&self) -> &HealthState {
        self.gate.state()
    }

    /// The health gate.
    pub fn gate(&self) -> &HealthGate {
        &self.gate
    }

    /// Recorded entropy samples.
    pub fn entropy_history(&self) -> &RollingHistory {
        &self.entropy_history
    }

    /// Recorded QBER samples.
    pub fn qber_history(&self) -> &RollingHistory {
        &self.qber_history
    }

    /// Successful key derivations so far.
    pub fn keys_derived(&self) -> u64 {
        self.keys_derived
    }

    /// Alerts raised across all anomaly passes.
    pub fn anomaly_alerts(&self) -> u64 {
        self.anomaly_alerts
    }

    /// Captures a dataset for offline assessment and records its digest.
    pub fn capture_dataset(
        &mut self,
        kind: DatasetKind,
        samples: usize,
        dir: &Path,
    ) -> Result<DatasetRecord> {
        let record = capture::capture_dataset(&mut self.source, kind, samples, dir)?;
        self.datasets.record(&record);
        Ok(record)
    }

    /// Health record plus recorded dataset digests.
    pub fn dataset_status(&self) -> DatasetStatus {
        DatasetStatus {
            health: self.gate.state().clone(),
            datasets: self.datasets.clone(),
        }
    }
}

fn no_session_key() -> Error {
    Error::invalid("no session key established")
}

/// A [`QrngService`] behind a mutex.
pub struct SharedService<S, R> {
    inner: Arc<Mutex<QrngService<S, R>>>,
}

impl<S, R> Clone for SharedService<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, R> SharedService<S, R> {
    /// Wraps `service` for shared use.
    pub fn new(service: QrngService<S, R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    /// Locks the service.
    ///
    /// A poisoned lock is recovered; the next gate call overwrites the
    /// health state wholesale.
    pub fn lock(&self) -> MutexGuard<'_, QrngService<S, R>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovering poisoned service lock");
            poisoned.into_inner()
        })
    }

    /// Runs `f` with exclusive access to the service.
    pub fn with<T>(&self, f: impl FnOnce(&mut QrngService<S, R>) -> T) -> T {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PatternBitSource, SeededBitSource};
    use crate::qkd::{Correlations, E91Simulator};

    fn service<S: BitSource>(source: S) -> QrngService<S, ChaCha20Rng> {
        QrngService::new(&FileConfig::default(), source, ChaCha20Rng::seed_from_u64(11))
    }

    fn seeded() -> QrngService<SeededBitSource, ChaCha20Rng> {
        service(SeededBitSource::new(42))
    }

    #[test]
    fn test_sample_bits_report() {
        let mut svc = seeded();
        let report = svc.sample_bits(256, 1024).unwrap();
        assert_eq!(report.bits.len(), 256);
        assert_eq!(report.distribution.total(), 256);
        assert!(report.entropy > 0.9);
        assert!(report.online_health.ok);
        assert_eq!(svc.entropy_history().latest(), Some(report.entropy));
    }

    #[test]
    fn test_sample_bits_reports_unhealthy_without_failing() {
        let mut svc = service(PatternBitSource::stuck(false));
        let report = svc.sample_bits(128, 1024).unwrap();
        assert!(!report.online_health.ok);
        assert_eq!(report.entropy, 0.0);
        assert!(!svc.health().ok);
    }

    #[test]
    fn test_zero_bits_rejected() {
        let mut svc = seeded();
        assert!(matches!(svc.sample_bits(0, 1024), Err(Error::InvalidInput(_))));
        assert!(matches!(svc.random_bytes(0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_random_bytes_length() {
        let mut svc = seeded();
        assert_eq!(svc.random_bytes(32).unwrap().len(), 32);
        assert_eq!(svc.keys_derived(), 1);
    }

    #[test]
    fn test_oversize_bytes_rejected_before_sampling() {
        let mut svc = seeded();
        for nbytes in [MAX_OUTPUT_LEN + 1, 10_000, usize::MAX / 4, usize::MAX] {
            assert!(matches!(svc.random_bytes(nbytes), Err(Error::InvalidInput(_))));
        }
        assert_eq!(svc.gate().evaluations(), 0);
        assert!(svc.health().ok);
        assert_eq!(svc.random_bytes(MAX_OUTPUT_LEN).unwrap().len(), MAX_OUTPUT_LEN);
    }

    #[test]
    fn test_oversize_bytes_from_stuck_source_is_invalid_input() {
        let mut svc = service(PatternBitSource::stuck(true));
        assert!(matches!(svc.random_bytes(10_000), Err(Error::InvalidInput(_))));
        assert_eq!(svc.gate().evaluations(), 0);
    }

    #[test]
    fn test_stuck_source_blocks_session_key() {
        let mut svc = service(PatternBitSource::stuck(true));
        let err = svc.generate_session_key().unwrap_err();

        assert!(err.is_health_alarm());
        assert!(!svc.has_session_key());
        assert!(!svc.health().ok);
        assert!(svc.health().reason.starts_with("RCT/AP violation"));
        assert_eq!(svc.keys_derived(), 0);
    }

    #[test]
    fn test_stuck_source_blocks_random_bytes() {
        let mut svc = service(PatternBitSource::stuck(true));
        assert!(matches!(
            svc.random_bytes(16),
            Err(Error::HealthAlarm { .. })
        ));
    }

    #[test]
    fn test_empty_bits_rejected_before_gate() {
        let mut svc = seeded();
        let err = svc.set_session_key(&BitString::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(svc.gate().evaluations(), 0);
    }

    #[test]
    fn test_encrypt_requires_session_key() {
        let mut svc = seeded();
        assert!(matches!(svc.encrypt(b"hello"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_session_roundtrip() {
        let mut svc = seeded();
        svc.generate_session_key().unwrap();

        let sealed = svc.encrypt(b"attack at dawn").unwrap();
        assert_eq!(svc.decrypt(&sealed).unwrap(), b"attack at dawn");
        assert!(matches!(svc.encrypt(b""), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let mut svc = seeded();
        svc.generate_session_key().unwrap();

        let mut sealed = svc.encrypt(b"payload").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(svc.decrypt(&sealed), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_failed_rekey_keeps_previous_key() {
        let mut svc = seeded();
        svc.generate_session_key().unwrap();
        let sealed = svc.encrypt(b"still readable").unwrap();

        let stuck = BitString::from_bools(std::iter::repeat(true).take(256));
        assert!(svc.set_session_key(&stuck).unwrap_err().is_health_alarm());
        assert_eq!(svc.decrypt(&sealed).unwrap(), b"still readable");
    }

    #[test]
    fn test_run_qkd_records_qber() {
        let mut svc = seeded();
        let mut e91 = E91Simulator::new(ChaCha20Rng::seed_from_u64(3));

        let clean = svc.run_qkd(&mut e91, 100, 0.0).unwrap();
        assert!(clean.verdict.secure);
        assert_eq!(clean.flipped_bits, 0);

        let noisy = svc.run_qkd(&mut e91, 100, 0.2).unwrap();
        assert!(!noisy.verdict.secure);
        assert_eq!(svc.qber_history().len(), 2);
        assert_eq!(svc.qber_history().latest(), Some(noisy.round.qber));
    }

    #[test]
    fn test_run_qkd_rejects_bad_noise() {
        let mut svc = seeded();
        let mut e91 = E91Simulator::new(ChaCha20Rng::seed_from_u64(3));
        assert!(matches!(
            svc.run_qkd(&mut e91, 100, -0.1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bell_assessment() {
        let svc = seeded();
        let result = BellTestResult::from_correlations(
            Correlations {
                ab: 0.6,
                ab_prime: -0.6,
                a_prime_b: 0.6,
                a_prime_b_prime: 0.6,
            },
            1024,
        );
        assert!(svc.assess_bell(&result).bell_violation);
    }

    #[test]
    fn test_anomalies_from_recorded_histories() {
        let mut svc = seeded();
        for value in [0.98, 0.95, 0.91, 0.87, 0.82] {
            svc.record_entropy(value);
        }
        svc.record_qber(0.2);

        let report = svc.detect_anomalies();
        assert_eq!(report.alerts.len(), 4);
        assert_eq!(svc.anomaly_alerts(), 4);
    }

    #[test]
    fn test_capture_updates_dataset_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = seeded();

        let record = svc.capture_dataset(DatasetKind::Cond, 64, dir.path()).unwrap();
        let status = svc.dataset_status();
        assert_eq!(
            status.datasets.get(DatasetKind::Cond),
            Some(format!("sha256:{}", record.sha256).as_str())
        );
        assert_eq!(status.datasets.get(DatasetKind::Raw), None);
    }

    #[test]
    fn test_shared_service_serializes_access() {
        let shared = SharedService::new(seeded());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.with(|svc| svc.random_bytes(16).map(|b| b.len())))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 16);
        }
        assert_eq!(shared.lock().keys_derived(), 4);
    }
}
