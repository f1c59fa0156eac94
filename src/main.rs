//! QRNG Gate CLI
//!
//! Command-line interface for sampling, gating and conditioning random
//! bits, assessing simulated QKD sessions and monitoring for anomalies.

use clap::{Parser, Subcommand, ValueEnum};
use qrng_gate::{
    capture::{build_source, BitSource, DatasetKind},
    config::SourceKind,
    conditioning::INFO_DEFAULT,
    metrics::{MetricsRegistry, MetricsSnapshot},
    qkd::{Bb84Simulator, E91Simulator, QkdProtocol},
    wire::{error_response, BytesPayload, SealedPayload},
    BitString, Error, FileConfig, QrngService,
};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type Service = QrngService<Box<dyn BitSource + Send>, ChaCha20Rng>;

#[derive(Parser)]
#[command(name = "qrng-gate")]
#[command(about = "Health-gated key derivation and QKD assessment for random bit sources")]
#[command(version = qrng_gate::VERSION)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the deterministic seeded source (and seed the CSPRNG) for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Protocol {
    E91,
    Bb84,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample bits and report distribution, entropy and health
    Bits {
        #[arg(long, default_value = "256")]
        num_bits: usize,
        #[arg(long, default_value = "1024")]
        shots: usize,
    },

    /// Produce conditioned random bytes from freshly gated bits
    Bytes {
        #[arg(long, default_value = "32")]
        nbytes: usize,
    },

    /// Derive a key from supplied or sampled bits
    Key {
        /// Bitstring of '0'/'1'; sampled from the source when omitted
        #[arg(long)]
        bits: Option<String>,

        #[arg(long, default_value = "512")]
        num_bits: usize,

        #[arg(long, default_value = "32")]
        out_len: usize,

        /// Install a session key and seal this message with it
        #[arg(long)]
        message: Option<String>,
    },

    /// Run a simulated QKD session and assess its QBER
    Qkd {
        #[arg(long, value_enum, default_value = "e91")]
        protocol: Protocol,
        #[arg(long, default_value = "1000")]
        rounds: usize,
        /// Channel noise probability in [0, 1]
        #[arg(long, default_value = "0.0")]
        noise: f64,
    },

    /// Run a simulated CHSH Bell test and assess it
    Bell {
        #[arg(long, default_value = "4096")]
        shots: usize,
    },

    /// Analyze entropy and QBER series for anomalies
    Anomaly {
        /// Comma-separated entropy samples, oldest first
        #[arg(long, value_delimiter = ',')]
        entropy: Vec<f64>,
        /// Comma-separated QBER samples, oldest first
        #[arg(long, value_delimiter = ',')]
        qber: Vec<f64>,
    },

    /// Continuously sample, assess and watch for anomalies
    Monitor {
        /// Stop after this many iterations (runs until Ctrl-C otherwise)
        #[arg(long)]
        count: Option<u64>,
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        #[arg(long, default_value = "1024")]
        num_bits: usize,
    },

    /// Capture a dataset for offline entropy assessment
    Capture {
        #[arg(long, default_value = "raw")]
        kind: DatasetKind,
        #[arg(long, default_value = "100000")]
        samples: usize,
        /// Output directory (overrides `output.capture_dir`)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Sample the source once and print health, datasets and metrics
    Status {
        #[arg(long, default_value = "1024")]
        num_bits: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("QRNG Gate v{}", qrng_gate::VERSION);

    if let Err(e) = run(cli) {
        let (code, body) = error_response(&e);
        warn!(status = code, "{}", e);
        print_json(&body);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<FileConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.source.kind = SourceKind::Seeded;
        config.source.seed = Some(seed);
    }
    Ok(config)
}

fn build_service(cli: &Cli, config: &FileConfig) -> Result<Service, Error> {
    match cli.seed {
        Some(seed) => {
            let source = build_source(&config.source)?;
            Ok(QrngService::new(config, source, ChaCha20Rng::seed_from_u64(seed)))
        }
        None => QrngService::from_config(config),
    }
}

fn protocol_rng(cli: &Cli) -> ChaCha20Rng {
    match cli.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed.wrapping_add(1)),
        None => ChaCha20Rng::from_entropy(),
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = load_config(&cli)?;
    let mut service = build_service(&cli, &config)?;

    match &cli.command {
        Commands::Bits { num_bits, shots } => {
            print_json(&service.sample_bits(*num_bits, *shots)?);
        }

        Commands::Bytes { nbytes } => {
            let bytes = service.random_bytes(*nbytes)?;
            print_json(&BytesPayload::new(&bytes, service.health().clone()));
        }

        Commands::Key {
            bits,
            num_bits,
            out_len,
            message,
        } => {
            let bits = match bits {
                Some(text) => text.parse::<BitString>()?,
                None => service.sample_bits(*num_bits, num_bits.saturating_mul(2))?.bits,
            };

            match message {
                Some(message) => {
                    service.set_session_key(&bits)?;
                    let sealed = service.encrypt(message.as_bytes())?;
                    print_json(&SealedPayload::from(&sealed));
                }
                None => {
                    let key = service.derive(&bits, *out_len, None, INFO_DEFAULT)?;
                    print_json(&serde_json::json!({
                        "length": key.len(),
                        "key_hex": hex::encode(key.as_bytes()),
                        "online_health": service.health(),
                    }));
                }
            }
        }

        Commands::Qkd {
            protocol,
            rounds,
            noise,
        } => {
            let rng = protocol_rng(&cli);
            let mut simulator: Box<dyn QkdProtocol> = match protocol {
                Protocol::E91 => Box::new(E91Simulator::new(rng)),
                Protocol::Bb84 => Box::new(Bb84Simulator::new(rng)),
            };
            let report = service.run_qkd(simulator.as_mut(), *rounds, *noise)?;
            print_json(&report);
        }

        Commands::Bell { shots } => {
            let result = E91Simulator::new(protocol_rng(&cli)).bell_test_chsh(*shots);
            let verdict = service.assess_bell(&result);
            print_json(&serde_json::json!({ "result": result, "verdict": verdict }));
        }

        Commands::Anomaly { entropy, qber } => {
            for &value in entropy {
                service.record_entropy(value);
            }
            for &value in qber {
                service.record_qber(value);
            }
            let report = service.detect_anomalies();
            for message in report.messages() {
                warn!("{}", message);
            }
            print_json(&report);
        }

        Commands::Monitor {
            count,
            interval_ms,
            num_bits,
        } => {
            monitor(
                &mut service,
                &config,
                protocol_rng(&cli),
                *count,
                Duration::from_millis(*interval_ms),
                *num_bits,
            )?;
        }

        Commands::Capture { kind, samples, dir } => {
            let dir = dir.clone().unwrap_or_else(|| config.output.capture_dir.clone());
            let record = service.capture_dataset(*kind, *samples, &dir)?;
            print_json(&record);
            print_json(&service.dataset_status());
        }

        Commands::Status { num_bits } => {
            service.sample_bits(*num_bits, num_bits.saturating_mul(2))?;
            print_json(&service.dataset_status());

            let registry = MetricsRegistry::new()
                .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
            registry.update(&MetricsSnapshot::from_service(&service));
            let text = registry
                .encode()
                .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn monitor(
    service: &mut Service,
    config: &FileConfig,
    rng: ChaCha20Rng,
    count: Option<u64>,
    interval: Duration,
    num_bits: usize,
) -> Result<(), Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::UpstreamUnavailable(format!("failed to set Ctrl-C handler: {}", e)))?;

    let registry =
        MetricsRegistry::new().map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
    let exporter = start_exporter(config, registry)?;

    let mut e91 = E91Simulator::new(rng);
    let rounds = (num_bits / 20).max(1);
    let mut iteration = 0u64;

    info!(interval_ms = interval.as_millis() as u64, "Monitoring started");

    while running.load(Ordering::SeqCst) && count.map_or(true, |c| iteration < c) {
        iteration += 1;

        match service.sample_bits(num_bits, num_bits.saturating_mul(2)) {
            Ok(report) => info!(
                iteration,
                entropy = report.entropy,
                healthy = report.online_health.ok,
                "Sampled"
            ),
            Err(e) => warn!(iteration, "Sampling failed: {}", e),
        }

        let qkd = service.run_qkd(&mut e91, rounds, 0.0)?;
        info!(iteration, qber = qkd.round.qber, secure = qkd.verdict.secure, "QKD round");

        let report = service.detect_anomalies();
        for message in report.messages() {
            warn!(iteration, "{}", message);
        }

        exporter.publish(service);
        std::thread::sleep(interval);
    }

    info!(
        iterations = iteration,
        failures = service.gate().failures(),
        alerts = service.anomaly_alerts(),
        "Monitoring stopped"
    );
    Ok(())
}

/// Publishes metrics to the HTTP exporter when built with `metrics`,
/// otherwise to the log.
struct Exporter {
    registry: Option<MetricsRegistry>,
    #[cfg(feature = "metrics")]
    state: Option<Arc<tokio::sync::RwLock<qrng_gate::metrics::MetricsState>>>,
}

impl Exporter {
    fn publish(&self, service: &Service) {
        let snapshot = MetricsSnapshot::from_service(service);
        self.publish_http(&snapshot, service);

        if let Some(registry) = &self.registry {
            registry.update(&snapshot);
            tracing::debug!(
                evaluations = snapshot.gate_evaluations,
                failures = snapshot.gate_failures,
                "Metrics updated"
            );
        }
    }
}

impl Exporter {
    #[cfg(feature = "metrics")]
    fn publish_http(&self, snapshot: &MetricsSnapshot, service: &Service) {
        if let Some(state) = &self.state {
            state.blocking_write().update(snapshot, service.health());
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn publish_http(&self, _snapshot: &MetricsSnapshot, _service: &Service) {}
}

#[cfg(feature = "metrics")]
fn start_exporter(config: &FileConfig, registry: MetricsRegistry) -> Result<Exporter, Error> {
    use qrng_gate::metrics::{MetricsServer, MetricsServerConfig};

    if config.output.metrics_port == 0 {
        return Ok(Exporter {
            registry: Some(registry),
            state: None,
        });
    }

    let server = MetricsServer::new(
        MetricsServerConfig::with_port(config.output.metrics_port),
        registry,
    );
    let state = server.state();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
    std::thread::spawn(move || {
        if let Err(e) = runtime.block_on(server.run()) {
            warn!("Metrics server stopped: {}", e);
        }
    });

    Ok(Exporter {
        registry: None,
        state: Some(state),
    })
}

#[cfg(not(feature = "metrics"))]
fn start_exporter(_config: &FileConfig, registry: MetricsRegistry) -> Result<Exporter, Error> {
    Ok(Exporter {
        registry: Some(registry),
    })
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => warn!("Failed to serialize output: {}", e),
    }
}
