//! Run configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OptError, Result};
use crate::genalg::GaConfig;
use crate::objective::Sense;
use crate::swarm::PsoConfig;
use crate::topology::Topology;

/// Default population size
pub const DEFAULT_POPULATION_SIZE: usize = 20;

/// Default number of generation updates
pub const DEFAULT_GENERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Pso,
    Ga,
}

impl std::str::FromStr for Algorithm {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pso" => Ok(Algorithm::Pso),
            "ga" => Ok(Algorithm::Ga),
            other => Err(OptError::Config(format!(
                "unknown algorithm '{}' (expected 'pso' or 'ga')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub pso: PsoConfig,
    #[serde(default)]
    pub ga: GaConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Absent means seed from entropy
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sense: Sense,
    /// Test surface to optimize
    #[serde(default = "default_function")]
    pub function: String,
    /// Substitute for NaN objective values (default: worst possible value)
    #[serde(default)]
    pub nan_penalty: Option<f32>,
}

fn default_population_size() -> usize {
    DEFAULT_POPULATION_SIZE
}
fn default_generations() -> usize {
    DEFAULT_GENERATIONS
}
fn default_function() -> String {
    "peaks".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            population_size: default_population_size(),
            generations: default_generations(),
            seed: None,
            sense: Sense::default(),
            function: default_function(),
            nan_penalty: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_pspace")]
    pub pspace: String,
    /// SQLite run database; no persistence when absent
    #[serde(default)]
    pub database: Option<String>,
    /// Directory for per-generation JSON snapshots
    #[serde(default)]
    pub output_dir: Option<String>,
}

fn default_pspace() -> String {
    "pspace.txt".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pspace: default_pspace(),
            database: None,
            output_dir: None,
        }
    }
}

impl Config {
    /// Read a config file. A missing file gives the defaults; a file that
    /// does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config file at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cross-field checks that the individual sections cannot do alone.
    pub fn validate(&self) -> Result<()> {
        let n = self.run.population_size;
        if n == 0 {
            return Err(OptError::Config("population_size must be positive".into()));
        }
        if let Some(p) = self.run.nan_penalty {
            if !p.is_finite() {
                return Err(OptError::Config(format!("nan_penalty must be finite, got {}", p)));
            }
        }
        match self.run.algorithm {
            Algorithm::Pso => {
                self.pso.validate()?;
                if let Topology::Toroidal { width } = self.pso.topology {
                    if width == 0 || n % width != 0 {
                        return Err(OptError::Config(format!(
                            "toroidal width {} does not divide population_size {}",
                            width, n
                        )));
                    }
                }
            }
            Algorithm::Ga => {
                self.ga.validate()?;
                if self.ga.elite_count >= n {
                    return Err(OptError::Config(format!(
                        "elite_count {} must be smaller than population_size {}",
                        self.ga.elite_count, n
                    )));
                }
            }
        }
        Ok(())
    }
}
