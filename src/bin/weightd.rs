// Weight aggregation node CLI
// Node home setup, an in-process validator network and a weight inspector

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use weight_shift::abci::{SignalProvider, StaticSignalProvider};
use weight_shift::bft::ValidatorRegistry;
use weight_shift::config::{config_path, default_home, NodeConfig};
use weight_shift::crypto::{address_from_pubkey, public_from_seed};
use weight_shift::node::{demo_signals, derive_seed, LocalNet, ValidatorNode};
use weight_shift::storage::{try_open_db, BlockContext};
use weight_shift::weights::{WeightStore, WeightsKeeper};
use weight_shift::ValidatorAddress;

#[derive(Parser)]
#[command(name = "weightd")]
#[command(about = "Validator weight aggregation over vote extensions", long_about = None)]
struct Cli {
    /// Node home directory (default: $HOME/.weight_shift)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and a fresh validator key
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run an in-process validator network for a number of heights
    Simulate {
        #[arg(long, default_value_t = 4)]
        validators: usize,
        #[arg(long, default_value_t = 10)]
        heights: u32,
        /// Voting power given to each validator
        #[arg(long, default_value_t = 10)]
        power: i64,
    },
    /// Print the committed weights of a simulated node
    Show {
        #[arg(long, default_value_t = 0)]
        node: usize,
    },
}

#[derive(Serialize, Deserialize)]
struct ValidatorKeyFile {
    address: String,
    #[serde(with = "hex::serde")]
    pubkey: Vec<u8>,
    #[serde(with = "hex::serde")]
    seed: Vec<u8>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let home = cli.home.unwrap_or_else(default_home);

    match cli.command {
        Commands::Init { force } => init(&home, force),
        Commands::Simulate {
            validators,
            heights,
            power,
        } => simulate(&home, validators, heights, power),
        Commands::Show { node } => show(&home, node),
    }
}

fn init(home: &Path, force: bool) -> Result<()> {
    let cfg_path = config_path(home);
    if cfg_path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", cfg_path.display());
    }

    let config = NodeConfig::default();
    config
        .save(&cfg_path)
        .with_context(|| format!("write config {}", cfg_path.display()))?;

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let key_path = key_path(home);
    let address = write_validator_key(&key_path, &seed)?;

    println!("Initialised node home {}", home.display());
    println!("  config:    {}", cfg_path.display());
    println!("  validator: {}", address);
    Ok(())
}

fn load_config(home: &Path) -> Result<NodeConfig> {
    let config = NodeConfig::load(config_path(home)).context("load config")?;
    let validation = config.validate();
    validation.print_summary();
    if !validation.valid {
        bail!("invalid configuration: {}", validation.errors.join("; "));
    }
    Ok(config)
}

fn simulate(home: &Path, validators: usize, heights: u32, power: i64) -> Result<()> {
    if validators == 0 {
        bail!("need at least one validator");
    }
    let config = load_config(home)?;
    let static_signals = match &config.signals_path {
        Some(path) => Some(
            StaticSignalProvider::load(path)
                .with_context(|| format!("load signals from {}", path))?,
        ),
        None => None,
    };

    let seeds = node_seeds(home, &config.chain_id, validators)?;
    let mut addresses: Vec<ValidatorAddress> = Vec::with_capacity(validators);
    for seed in &seeds {
        let pubkey = public_from_seed(seed).context("derive public key")?;
        addresses.push(address_from_pubkey(&pubkey));
    }

    let registry = ValidatorRegistry::new();
    let mut nodes = Vec::with_capacity(validators);
    for (i, seed) in seeds.iter().enumerate() {
        let db_path = config.db_path(&node_home(home, i));
        fs::create_dir_all(&db_path)
            .with_context(|| format!("create {}", db_path.display()))?;
        let db = try_open_db(&db_path)
            .with_context(|| format!("open database {}", db_path.display()))?;

        let provider: Arc<dyn SignalProvider> = match &static_signals {
            Some(p) => Arc::new(p.clone()),
            None => Arc::new(demo_signals(&addresses, i)),
        };
        let node = ValidatorNode::new(
            *seed,
            db,
            &config.chain_id,
            config.params,
            provider,
            Arc::new(registry.clone()),
        )?;
        registry.register(node.address().clone(), node.pubkey().to_vec(), power);
        nodes.push(node);
    }

    info!(
        "Simulating {} validators for {} heights on chain {}",
        validators, heights, config.chain_id
    );
    let mut net = LocalNet::new(nodes, registry);
    for _ in 0..heights {
        let outcome = net.run_height(Vec::new())?;
        println!(
            "height {:>4}  round {}  proposer {}  extensions {}  weights applied {}",
            outcome.height,
            outcome.round,
            outcome.proposer,
            outcome.extensions_included,
            outcome.weights_applied
        );
    }

    for (i, node) in net.nodes().iter().enumerate() {
        let weights = node.weights()?;
        println!("node{} {}: {}", i, node.address(), serde_json::to_string(&weights)?);
    }
    Ok(())
}

fn show(home: &Path, node: usize) -> Result<()> {
    let config = load_config(home)?;
    let db_path = config.db_path(&node_home(home, node));
    if !db_path.exists() {
        bail!("no database at {}", db_path.display());
    }
    let db = try_open_db(&db_path)?;
    let ctx = BlockContext::new(db, 0, config.chain_id.clone());
    let weights = WeightsKeeper::new().get_all(&ctx)?;
    println!("{}", serde_json::to_string_pretty(&weights)?);
    Ok(())
}

fn key_path(home: &Path) -> PathBuf {
    home.join("validator_key.json")
}

/// Write the key file for `seed` and return the validator address.
fn write_validator_key(path: &Path, seed: &[u8; 32]) -> Result<ValidatorAddress> {
    let pubkey = public_from_seed(seed).context("derive public key")?;
    let address = address_from_pubkey(&pubkey);
    let key = ValidatorKeyFile {
        address: address.to_hex(),
        pubkey,
        seed: seed.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&key)?)
        .with_context(|| format!("write key file {}", path.display()))?;
    set_restrictive_permissions(path);
    Ok(address)
}

fn read_validator_seed(path: &Path) -> Result<[u8; 32]> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("read key file {}", path.display()))?;
    let key: ValidatorKeyFile = serde_json::from_str(&json)
        .with_context(|| format!("parse key file {}", path.display()))?;
    let seed: [u8; 32] = key
        .seed
        .as_slice()
        .try_into()
        .with_context(|| format!("{}: seed must be 32 bytes", path.display()))?;

    let pubkey = public_from_seed(&seed).context("derive public key")?;
    if address_from_pubkey(&pubkey).to_hex() != key.address {
        bail!("{}: address does not match seed", path.display());
    }
    Ok(seed)
}

/// Seeds for a simulated network. Node 0 runs with the home's own validator
/// key when `init` has written one; the rest are derived from the chain id.
fn node_seeds(home: &Path, chain_id: &str, validators: usize) -> Result<Vec<[u8; 32]>> {
    let mut seeds: Vec<[u8; 32]> = (0..validators).map(|i| derive_seed(chain_id, i)).collect();
    let key_path = key_path(home);
    if key_path.exists() {
        if let Some(first) = seeds.first_mut() {
            *first = read_validator_seed(&key_path)?;
            info!("node0 uses validator key {}", key_path.display());
        }
    }
    Ok(seeds)
}

fn node_home(home: &Path, index: usize) -> PathBuf {
    home.join(format!("node{}", index))
}

/// Set file permissions to owner-only (0600) on Unix systems.
fn set_restrictive_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            log::warn!("Failed to set permissions on {}: {}", path.display(), e);
        }
    }
    let _ = path;
}
