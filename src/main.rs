use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chain::config::parse_peer_list;
use chain::NodeConfig;
use clap::Parser;
use containers::GenesisDoc;
use da::DataAvailabilityClient;
use libp2p::Multiaddr;
use libp2p_identity::Keypair;
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::{Metrics, SharedMetrics};
use networking::gossipsub::config::GossipsubConfig;
use networking::{ConnectionGater, HeaderSyncService, NetworkService, NetworkServiceConfig};
use proposer::{load_or_generate_seed, load_signing_key, Aggregator, Proposer};
use storage::{Datastore, MemoryDatastore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Rollup node: header sync, block production and data availability")]
struct Args {
    /// Node configuration, YAML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Genesis document, YAML or JSON.
    #[arg(long)]
    genesis: PathBuf,

    /// libp2p identity seed, created if missing.
    #[arg(long, default_value = "node.key")]
    node_key: PathBuf,

    /// Block signing seed, created if missing.
    #[arg(long, default_value = "proposer.key")]
    proposer_key: PathBuf,

    #[arg(long)]
    aggregator: bool,

    #[arg(long)]
    listen_address: Option<String>,

    /// Comma separated seed multiaddrs.
    #[arg(long)]
    seeds: Option<String>,

    /// Hex encoded hash of the header to start syncing from.
    #[arg(long)]
    trusted_hash: Option<String>,

    #[arg(long)]
    da_layer: Option<String>,

    /// Backend specific DA configuration, JSON.
    #[arg(long)]
    da_config: Option<String>,

    #[arg(long)]
    metrics: bool,

    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Args {
    /// Config file values with command line overrides applied.
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load_from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => NodeConfig::default(),
        };

        config.aggregator |= self.aggregator;
        if let Some(listen_address) = &self.listen_address {
            config.p2p.listen_address = listen_address.clone();
        }
        if let Some(seeds) = &self.seeds {
            config.p2p.seeds = parse_peer_list(seeds);
        }
        if let Some(trusted_hash) = &self.trusted_hash {
            config.trusted_hash = trusted_hash.clone();
        }
        if let Some(da_layer) = &self.da_layer {
            config.da_layer = da_layer.clone();
        }
        if let Some(da_config) = &self.da_config {
            config.da_config = da_config.clone();
        }
        config.metrics.enabled |= self.metrics;
        if let Some(port) = self.metrics_port {
            config.metrics.port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

fn spawn_metrics_server(config: &NodeConfig, metrics: SharedMetrics, cancel: CancellationToken) -> Result<()> {
    let metrics_address: IpAddr = config
        .metrics
        .address
        .parse()
        .with_context(|| format!("invalid metrics address {}", config.metrics.address))?;
    let server_config = MetricsServerConfig {
        metrics_address,
        metrics_port: config.metrics.port,
    };
    tokio::spawn(async move {
        if let Err(err) = run_metrics_server(server_config, metrics, cancel).await {
            error!(error = ?err, "Metrics server failed");
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.node_config()?;
    let genesis = GenesisDoc::load_from_file(&args.genesis)
        .with_context(|| format!("failed to load genesis from {}", args.genesis.display()))?;
    info!(
        chain_id = %genesis.chain_id,
        initial_height = genesis.initial_height,
        aggregator = config.aggregator,
        "Starting rollup node"
    );

    let cancel = CancellationToken::new();

    let metrics: Option<SharedMetrics> = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
        spawn_metrics_server(&config, metrics.clone(), cancel.clone())?;
        Some(metrics)
    } else {
        None
    };

    let seed = load_or_generate_seed(&args.node_key).context("failed to load node key")?;
    let local_key = Keypair::ed25519_from_bytes(seed).context("invalid node key")?;
    let gater = ConnectionGater::from_config(&config.p2p).context("invalid peer lists")?;
    let listen_address: Multiaddr = config
        .p2p
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address {}", config.p2p.listen_address))?;
    let network_config = NetworkServiceConfig::new(
        GossipsubConfig::new()?,
        listen_address,
        NetworkServiceConfig::parse_seeds(&config.p2p.seeds),
        genesis.chain_id.clone(),
    );
    let mut network = NetworkService::new(network_config, local_key, gater)?;
    info!(peer_id = %network.local_peer_id(), "Network identity");
    let network_handle = network.handle();
    network.bootstrap().await;
    let network_task = tokio::spawn(network.run(cancel.clone()));

    let datastore: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
    let service = Arc::new(
        HeaderSyncService::builder()
            .genesis(genesis.clone())
            .p2p_client(Arc::new(network_handle))
            .datastore(datastore.clone())
            .trusted_hash(config.trusted_hash.clone())
            .block_time(config.block_time())
            .metrics(metrics.clone())
            .cancellation_token(cancel.clone())
            .build()?,
    );
    if let Err(err) = service.start().await {
        cancel.cancel();
        if let Err(stop_err) = service.stop().await {
            warn!(error = %stop_err, "Errors while releasing header sync components");
        }
        return Err(err).context("failed to start header sync service");
    }

    let mut da = DataAvailabilityClient::from_name(&config.da_layer)?
        .with_metrics(metrics.clone())
        .with_cancellation(cancel.clone());
    da.init(config.block_manager.namespace_id, config.da_config.as_bytes(), datastore)
        .context("failed to initialize DA client")?;
    da.start().await.context("failed to start DA client")?;
    let da = Arc::new(da);

    let aggregator_task: Option<JoinHandle<()>> = if config.aggregator {
        let key = load_signing_key(&args.proposer_key).context("failed to load proposer key")?;
        let aggregator = Aggregator::new(
            Proposer::new(key, &genesis),
            service.store(),
            da.clone(),
            service.clone(),
            config.block_time(),
        );
        Some(tokio::spawn(aggregator.run(cancel.clone())))
    } else {
        None
    };

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutting down");
    cancel.cancel();

    if let Some(task) = aggregator_task {
        if let Err(err) = task.await {
            warn!(%err, "Aggregator task ended abnormally");
        }
    }

    let mut failures = Vec::new();
    if let Err(err) = service.stop().await {
        failures.push(format!("header sync: {err}"));
    }
    if let Err(err) = da.stop().await {
        failures.push(format!("data availability: {err}"));
    }
    if let Err(err) = network_task.await {
        failures.push(format!("network: {err}"));
    }

    if failures.is_empty() {
        info!("Shutdown complete");
        Ok(())
    } else {
        anyhow::bail!("shutdown failed: {}", failures.join("; "))
    }
}
