use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use opentelemetry::KeyValue;
use tidvakt_config::TidvaktConfig;
use tidvakt_engine::Probe;
use tidvakt_simulator::{load_sim_config, SimConfig, SimulatedKernel, StreamDigest};
use tidvakt_telemetry::metrics::{names, MetricsError};
use tidvakt_telemetry::{MetricsSink, PrometheusSink, RecordingSink};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/tidvakt.yaml and TIDVAKT_* variables.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion pipeline against a simulated kernel
    Simulate(SimulateArgs),
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Simulation scenario file (YAML)
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,
    /// How long to run, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub duration_ms: u64,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub cpus: Option<usize>,
    /// Kernel-side drop probability
    #[arg(long)]
    pub loss: Option<f64>,
    /// Use the shared ring buffer adapter
    #[arg(long)]
    pub ring: bool,
    /// Print the Prometheus exposition of the run
    #[arg(long)]
    pub prometheus: bool,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<TidvaktConfig> {
    let config = match path {
        Some(path) => TidvaktConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TidvaktConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

pub fn print_config(config: &TidvaktConfig) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn sim_config(args: &SimulateArgs) -> anyhow::Result<SimConfig> {
    let mut sim = match &args.scenario {
        Some(path) => load_sim_config(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        sim.seed = seed;
    }
    if let Some(cpus) = args.cpus {
        sim.cpus = cpus;
    }
    if let Some(loss) = args.loss {
        sim.loss_probability = loss;
    }
    sim.check()?;
    Ok(sim)
}

/// Forwards every sample to the report sink and the Prometheus registry.
struct TeeSink {
    report: Arc<RecordingSink>,
    prometheus: Option<Arc<PrometheusSink>>,
}

impl MetricsSink for TeeSink {
    fn count(&self, name: &str, value: u64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        self.report.count(name, value, tags)?;
        match &self.prometheus {
            Some(p) => p.count(name, value, tags),
            None => Ok(()),
        }
    }

    fn gauge(&self, name: &str, value: f64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        self.report.gauge(name, value, tags)?;
        match &self.prometheus {
            Some(p) => p.gauge(name, value, tags),
            None => Ok(()),
        }
    }
}

pub async fn simulate(mut config: TidvaktConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let sim = sim_config(&args)?;
    config.ingest.use_ring_buffer |= args.ring;

    let map = config.ingest.events_map.clone();
    let stats = config.monitor.stats_table_for(&map);
    let kernel = SimulatedKernel::new(sim.clone());
    let kernel = Arc::new(if config.ingest.use_ring_buffer {
        kernel.with_ring_map(&map, config.ingest.ring_buffer_size, Some(&stats))
    } else {
        kernel.with_perf_map(&map, Some(&stats))
    });

    let report = Arc::new(RecordingSink::new());
    let prometheus = args.prometheus.then(|| Arc::new(PrometheusSink::new()));
    let sink = Arc::new(TeeSink {
        report: Arc::clone(&report),
        prometheus: prometheus.clone(),
    });
    let digest = Arc::new(StreamDigest::new());
    let namespace = config.telemetry.namespace.clone();

    let probe = Probe::new(config, kernel.clone(), digest.clone(), sink)?;
    let pool = Arc::clone(probe.pool());
    info!(adapter = probe.adapter(), seed = sim.seed, cpus = sim.cpus, "starting simulation");

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(probe.run(shutdown.clone()));
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(args.duration_ms)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    shutdown.cancel();
    run.await??;

    let q = |name| names::qualified(&namespace, name);
    let written = kernel.stats(&stats).map(|t| t.totals()).unwrap_or_default();
    let summary = digest.summary();
    println!("written:            {}", written.count);
    println!("delivered:          {}", summary.delivered);
    println!("inversions:         {}", summary.inversions);
    println!("sorting violations: {}", report.total_count(&q(names::SORTING_ERROR)));
    println!("kernel lost:        {}", written.lost);
    println!("reader lost:        {}", report.total_count(&q(names::LOST_USER)));
    println!("pool:               {}", pool.stats());
    println!("blake3:             {}", summary.hash.to_hex());

    if let Some(prometheus) = prometheus {
        print!("{}", prometheus.gather()?);
    }
    Ok(())
}
