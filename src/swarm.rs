//! Particle swarm population and its velocity/position update rule.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{OptError, Result};
use crate::grid::Grid;
use crate::objective::Sense;
use crate::pspace::ParameterSpace;
use crate::random::RandomSource;
use crate::topology::Topology;

/// How `omega` scales the update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    /// `omega` weighs the previous velocity only
    #[default]
    Inertia,
    /// `omega` also scales the cognitive and social terms
    Constriction,
}

/// How starting positions are drawn. The shared legacy mode is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitSampling {
    /// Fresh uniform draws for every particle
    #[default]
    PerParticle,
    /// One draw matrix reused by every particle (all start at the same spot)
    Shared,
}

/// Update-rule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    pub control: Control,
    pub omega: f32,
    pub cognitive: f32,
    pub social: f32,
    pub topology: Topology,
    pub init: InitSampling,
}

impl Default for PsoConfig {
    fn default() -> Self {
        Self {
            control: Control::Inertia,
            omega: 0.7298,
            cognitive: 2.05,
            social: 2.05,
            topology: Topology::Full,
            init: InitSampling::PerParticle,
        }
    }
}

impl PsoConfig {
    /// Effective (cognitive, social) coefficients for the control mode.
    pub fn coefficients(&self) -> (f32, f32) {
        match self.control {
            Control::Inertia => (self.cognitive, self.social),
            Control::Constriction => (self.omega * self.cognitive, self.omega * self.social),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("omega", self.omega),
            ("cognitive", self.cognitive),
            ("social", self.social),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(OptError::Config(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, v
                )));
            }
        }
        if let Topology::Toroidal { width: 0 } = self.topology {
            return Err(OptError::Config("toroidal width must be positive".into()));
        }
        Ok(())
    }
}

/// One member of the swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub current: Grid,
    pub velocity: Grid,
    /// Best position visited, `None` until the first evaluation
    pub history: Option<Grid>,
    /// Objective value at `history`
    pub misfit: f32,
}

impl Particle {
    fn at(current: Grid) -> Self {
        let (npts, npar) = current.shape();
        Self {
            current,
            velocity: Grid::zeros(npts, npar),
            history: None,
            misfit: 0.0,
        }
    }
}

pub struct Swarm {
    space: Arc<ParameterSpace>,
    config: PsoConfig,
    sense: Sense,
    particles: Vec<Particle>,
}

impl Swarm {
    pub fn new(space: Arc<ParameterSpace>, config: PsoConfig, sense: Sense) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            space,
            config,
            sense,
            particles: Vec::new(),
        })
    }

    /// Rebuild a swarm from saved particles.
    pub fn from_particles(
        space: Arc<ParameterSpace>,
        config: PsoConfig,
        sense: Sense,
        particles: Vec<Particle>,
    ) -> Result<Self> {
        config.validate()?;
        config.topology.validate(particles.len())?;
        for p in &particles {
            space.check_grid(&p.current)?;
            space.check_grid(&p.velocity)?;
            if let Some(h) = &p.history {
                space.check_grid(h)?;
            }
        }
        Ok(Self {
            space,
            config,
            sense,
            particles,
        })
    }

    /// Place `n` particles uniformly inside the bounds with zero velocity.
    ///
    /// Calling this again (for example after narrowing the space) starts a
    /// fresh stage: personal bests and misfits are forgotten.
    pub fn init_particles<R: RandomSource + ?Sized>(&mut self, n: usize, rng: &mut R) -> Result<()> {
        self.config.topology.validate(n)?;

        let shared = match self.config.init {
            InitSampling::Shared => Some(self.sample_position(rng)?),
            InitSampling::PerParticle => None,
        };
        let mut particles = Vec::with_capacity(n);
        for _ in 0..n {
            let current = match &shared {
                Some(g) => g.clone(),
                None => self.sample_position(rng)?,
            };
            particles.push(Particle::at(current));
        }
        self.particles = particles;

        log::debug!(
            "Initialized {} particle(s) over {}x{} parameter space",
            n,
            self.space.npts(),
            self.space.npar()
        );
        Ok(())
    }

    fn sample_position<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Result<Grid> {
        let values = self
            .space
            .iter()
            .map(|b| rng.uniform_in(b.lower, b.upper))
            .collect();
        Grid::from_vec(self.space.npts(), self.space.npar(), values)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particle(&self, index: usize) -> Result<&Particle> {
        self.particles.get(index).ok_or(OptError::IndexOutOfRange {
            index,
            len: self.particles.len(),
        })
    }

    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    /// Swap in a new (usually narrowed) space. Particles are dropped and must
    /// be re-initialised.
    pub fn set_space(&mut self, space: Arc<ParameterSpace>) {
        self.space = space;
        self.particles.clear();
    }

    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    /// Replace the update settings; rejected if the topology does not fit the
    /// current swarm.
    pub fn set_config(&mut self, config: PsoConfig) -> Result<()> {
        config.validate()?;
        if !self.particles.is_empty() {
            config.topology.validate(self.particles.len())?;
        }
        self.config = config;
        Ok(())
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn misfits(&self) -> Vec<f32> {
        self.particles.iter().map(|p| p.misfit).collect()
    }

    fn particle_mut(&mut self, index: usize) -> Result<&mut Particle> {
        let len = self.particles.len();
        self.particles
            .get_mut(index)
            .ok_or(OptError::IndexOutOfRange { index, len })
    }

    /// Take the current position as personal best unconditionally.
    pub fn record_first_evaluation(&mut self, index: usize, value: f32) -> Result<()> {
        let p = self.particle_mut(index)?;
        p.misfit = value;
        p.history = Some(p.current.clone());
        Ok(())
    }

    /// Replace the personal best if `value` is strictly better. Returns
    /// whether it was replaced.
    pub fn record_if_improved(&mut self, index: usize, value: f32) -> Result<bool> {
        let sense = self.sense;
        let p = self.particle_mut(index)?;
        if p.history.is_none() || sense.better(value, p.misfit) {
            p.misfit = value;
            p.history = Some(p.current.clone());
            return Ok(true);
        }
        Ok(false)
    }

    /// Record an evaluation of the current position.
    pub fn record(&mut self, index: usize, value: f32) -> Result<bool> {
        if self.particle(index)?.history.is_none() {
            self.record_first_evaluation(index, value)?;
            return Ok(true);
        }
        self.record_if_improved(index, value)
    }

    /// Index of the particle whose personal best guides `index`.
    pub fn guide_index(&self, index: usize) -> Result<usize> {
        self.config
            .topology
            .resolve(&self.misfits(), self.sense, index)
    }

    /// Personal best of the guide of `index`.
    pub fn guide(&self, index: usize) -> Result<&Grid> {
        let g = self.guide_index(index)?;
        self.particles[g]
            .history
            .as_ref()
            .ok_or_else(|| self.incomplete())
    }

    /// Best personal best in the swarm: `(index, misfit, position)`.
    pub fn global_best(&self) -> Option<(usize, f32, &Grid)> {
        let misfit: Vec<f32> = self
            .particles
            .iter()
            .map(|p| if p.history.is_some() { p.misfit } else { self.sense.worst() })
            .collect();
        let i = self.sense.best_index(&misfit)?;
        let p = &self.particles[i];
        p.history.as_ref().map(|h| (i, p.misfit, h))
    }

    /// Fitness-weighted mean of one coordinate over all personal bests.
    ///
    /// Weights are `1 / misfit` when minimising and `misfit` when maximising.
    /// When minimising, particles with zero misfit take all the weight.
    pub fn weighted_personal_best(&self, point: usize, param: usize) -> Result<f32> {
        if point >= self.space.npts() {
            return Err(OptError::IndexOutOfRange { index: point, len: self.space.npts() });
        }
        if param >= self.space.npar() {
            return Err(OptError::IndexOutOfRange { index: param, len: self.space.npar() });
        }
        if self.particles.is_empty() {
            return Err(OptError::InvalidState("swarm has no particles".into()));
        }

        let mut pairs = Vec::with_capacity(self.particles.len());
        for p in &self.particles {
            let h = p.history.as_ref().ok_or_else(|| self.incomplete())?;
            pairs.push((p.misfit, h.get(point, param)));
        }

        if self.sense == Sense::Minimize && pairs.iter().any(|(m, _)| *m == 0.0) {
            let exact: Vec<f32> = pairs.iter().filter(|(m, _)| *m == 0.0).map(|(_, x)| *x).collect();
            return Ok(exact.iter().sum::<f32>() / exact.len() as f32);
        }

        let (mut num, mut den) = (0.0f64, 0.0f64);
        for (m, x) in pairs {
            let w = match self.sense {
                Sense::Minimize => 1.0 / m as f64,
                Sense::Maximize => m as f64,
            };
            num += w * x as f64;
            den += w;
        }
        if den == 0.0 || !den.is_finite() {
            return Err(OptError::InvalidState(format!(
                "personal-best weights sum to {}",
                den
            )));
        }
        Ok((num / den) as f32)
    }

    /// Particles without a personal best are only possible before the first
    /// evaluation of a stage, so they are reported against generation 0.
    fn incomplete(&self) -> OptError {
        let missing = self
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.history.is_none())
            .map(|(i, _)| i)
            .collect();
        OptError::EvaluationIncomplete { generation: 0, missing }
    }

    /// Move every particle one step.
    ///
    /// All guides are resolved before any particle moves, so a topology
    /// error leaves the swarm untouched. Draws are consumed per particle,
    /// per point, per parameter: cognitive factor first, then social.
    pub fn update<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.particles.is_empty() {
            return Err(OptError::InvalidState("swarm has no particles".into()));
        }
        if self.particles.iter().any(|p| p.history.is_none()) {
            return Err(self.incomplete());
        }

        let misfit = self.misfits();
        let guides = (0..self.particles.len())
            .map(|i| {
                let g = self.config.topology.resolve(&misfit, self.sense, i)?;
                self.particles[g].history.clone().ok_or_else(|| self.incomplete())
            })
            .collect::<Result<Vec<Grid>>>()?;

        let (c_cog, c_soc) = self.config.coefficients();
        let omega = self.config.omega;
        let space = Arc::clone(&self.space);

        for (p, gbest) in self.particles.iter_mut().zip(&guides) {
            let Some(history) = p.history.as_ref() else {
                continue;
            };
            let history = history.as_slice();
            let gbest = gbest.as_slice();
            let current = p.current.as_mut_slice();
            let velocity = p.velocity.as_mut_slice();

            for (k, bounds) in space.iter().enumerate() {
                let x = current[k];
                let r1 = rng.uniform();
                let r2 = rng.uniform();
                let mut v = omega * velocity[k]
                    + c_cog * r1 * (history[k] - x)
                    + c_soc * r2 * (gbest[k] - x);
                if v.abs() > bounds.step {
                    v = bounds.step.copysign(v);
                }
                velocity[k] = v;
                current[k] = bounds.clamp(x + v);
            }
        }
        Ok(())
    }
}
