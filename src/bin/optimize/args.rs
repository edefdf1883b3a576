//! Command-line arguments and their overrides of the config file

use clap::Parser;

use globopt::config::{Algorithm, Config};
use globopt::{Result, Sense};

#[derive(Parser, Debug)]
#[command(name = "optimize")]
#[command(about = "Particle swarm / genetic algorithm search over a bounded parameter space")]
pub struct Args {
    /// Path to config file
    #[arg(short = 'c', long, default_value = "optimize.toml")]
    pub config: String,

    /// Parameter-space file (overrides config)
    #[arg(short = 'p', long)]
    pub pspace: Option<String>,

    /// Optimizer: pso or ga (overrides config)
    #[arg(short = 'a', long)]
    pub algorithm: Option<String>,

    /// Number of generation updates (overrides config)
    #[arg(short = 'g', long)]
    pub generations: Option<usize>,

    /// Population size (overrides config)
    #[arg(short = 'n', long)]
    pub population: Option<usize>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Test surface to optimize: peaks, sphere, rastrigin
    #[arg(short = 'f', long)]
    pub function: Option<String>,

    /// Maximize instead of minimize
    #[arg(long)]
    pub maximize: bool,

    /// SQLite database for run records (overrides config)
    #[arg(long)]
    pub database: Option<String>,

    /// Directory for per-generation JSON snapshots (overrides config)
    #[arg(short = 'o', long)]
    pub output_dir: Option<String>,

    /// Verbose debug output (per-generation statistics)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// Overlay command-line values on the loaded config.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(p) = &self.pspace {
            config.paths.pspace = p.clone();
        }
        if let Some(a) = &self.algorithm {
            config.run.algorithm = a.parse::<Algorithm>()?;
        }
        if let Some(g) = self.generations {
            config.run.generations = g;
        }
        if let Some(n) = self.population {
            config.run.population_size = n;
        }
        if self.seed.is_some() {
            config.run.seed = self.seed;
        }
        if let Some(f) = &self.function {
            config.run.function = f.clone();
        }
        if self.maximize {
            config.run.sense = Sense::Maximize;
        }
        if self.database.is_some() {
            config.paths.database = self.database.clone();
        }
        if self.output_dir.is_some() {
            config.paths.output_dir = self.output_dir.clone();
        }
        Ok(())
    }
}
