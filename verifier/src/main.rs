use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use matcher::{ApproxSettings, MatchConfig};

mod demo;
mod report;

use demo::{DemoOptions, run_demo};

/// Check whether a query vector is already enrolled in an encrypted
/// database, decrypting only the approximate maximum similarity.
#[derive(Parser, Debug)]
struct Cli {
    /// Multiplicative depth budget of the scheme
    #[clap(long, default_value_t = 30)]
    mult_depth: u32,
    /// Number of enrolled vectors to synthesize
    #[clap(long, default_value_t = 50)]
    num_vectors: usize,
    #[clap(long, default_value_t = 512)]
    vec_dim: usize,
    /// Similarities reduced together before the global combination
    #[clap(long, default_value_t = 512)]
    batch_size: usize,
    /// Similarity at or above which the query is a duplicate
    #[clap(long, default_value_t = 0.85)]
    threshold: f64,
    /// Number of key share holders
    #[clap(long, default_value_t = 3)]
    parties: usize,
    /// Number of shares needed to decrypt
    #[clap(long, default_value_t = 2)]
    threshold_t: usize,
    /// Levels kept in reserve before falling back to averaging
    #[clap(long, default_value_t = 3)]
    depth_margin: u32,
    /// Tilt of the fallback toward the older partial result, 0 averages
    #[clap(long, default_value_t = 0.0)]
    fallback_bias: f64,
    /// Seed of the enrolled vectors
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Seed of the query, equal to --seed to query with the first enrolled vector
    #[clap(long, default_value_t = 42)]
    query_seed: u64,
    /// Scratch file holding the encrypted database, removed once done
    #[clap(long, default_value = "encrypted_db.bin")]
    store: PathBuf,
}

impl Cli {
    fn match_config(&self) -> MatchConfig {
        MatchConfig {
            mult_depth: self.mult_depth,
            vec_dim: self.vec_dim,
            batch_size: self.batch_size,
            threshold: self.threshold,
            num_parties: self.parties,
            threshold_t: self.threshold_t,
            depth_margin: self.depth_margin,
            approx: ApproxSettings {
                fallback_bias: self.fallback_bias,
                ..Default::default()
            },
        }
    }

    fn demo_options(&self) -> DemoOptions {
        DemoOptions {
            num_vectors: self.num_vectors,
            seed: self.seed,
            query_seed: self.query_seed,
            store: self.store.clone(),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.match_config();
    config.validate()?;
    info!("Configuration : {:?}", config);

    let report = run_demo(&config, &cli.demo_options()).await?;
    println!("{}", report);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("FATAL ERROR: {:#}", error);
        std::process::exit(1);
    }
}
