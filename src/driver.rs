//! Generation loop: hand candidates out for evaluation, collect the results
//! in any order, pass a barrier, then update the population.
//!
//! ```text
//! Initialized -> Evaluating(0) -> Evaluated(0) -> Updated(0)
//!             -> Evaluating(1) -> ... -> Evaluated(N) -> Terminated
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OptError, Result};
use crate::genalg::Genalg;
use crate::grid::Grid;
use crate::objective::{Objective, Sense};
use crate::random::RandomSource;
use crate::swarm::Swarm;

/// What the driver needs from a swarm or a chromosome pool.
pub trait Population {
    fn len(&self) -> usize;

    fn sense(&self) -> Sense;

    /// Models to evaluate this generation, one per individual.
    fn candidates(&self) -> Result<Vec<Grid>>;

    /// Feed back the objective value of candidate `index`.
    fn record(&mut self, index: usize, value: f32) -> Result<()>;

    /// Produce the next generation. Must leave the population untouched on error.
    fn advance<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Result<()>;

    /// Per-individual value and model kept for the run record.
    fn snapshot(&self) -> Result<(Vec<f32>, Vec<Grid>)>;
}

impl Population for Swarm {
    fn len(&self) -> usize {
        Swarm::len(self)
    }

    fn sense(&self) -> Sense {
        Swarm::sense(self)
    }

    fn candidates(&self) -> Result<Vec<Grid>> {
        Ok(self.particles().iter().map(|p| p.current.clone()).collect())
    }

    fn record(&mut self, index: usize, value: f32) -> Result<()> {
        Swarm::record(self, index, value).map(|_| ())
    }

    fn advance<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.update(rng)
    }

    /// Personal-best misfits and positions.
    fn snapshot(&self) -> Result<(Vec<f32>, Vec<Grid>)> {
        let positions = self
            .particles()
            .iter()
            .map(|p| p.history.clone().unwrap_or_else(|| p.current.clone()))
            .collect();
        Ok((self.misfits(), positions))
    }
}

impl Population for Genalg {
    fn len(&self) -> usize {
        Genalg::len(self)
    }

    fn sense(&self) -> Sense {
        Genalg::sense(self)
    }

    fn candidates(&self) -> Result<Vec<Grid>> {
        self.models()
    }

    fn record(&mut self, index: usize, value: f32) -> Result<()> {
        Genalg::record(self, index, value)
    }

    fn advance<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.update(rng)
    }

    fn snapshot(&self) -> Result<(Vec<f32>, Vec<Grid>)> {
        Ok((self.misfits().to_vec(), self.models()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Initialized,
    /// Candidates handed out, results being collected
    Evaluating(usize),
    /// Barrier passed, results recorded
    Evaluated(usize),
    /// Next generation produced
    Updated(usize),
    Terminated,
}

/// Statistics of the raw objective values of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best: f32,
    pub mean: f32,
    pub worst: f32,
    /// Standard deviation of the finite values
    pub spread: f32,
    pub total_evaluated: usize,
}

/// Best single evaluation seen so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub generation: usize,
    pub index: usize,
    pub misfit: f32,
    pub position: Grid,
}

/// Persisted state of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    #[serde(with = "crate::store::misfit_json")]
    pub misfit: Vec<f32>,
    pub positions: Vec<Grid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Generations that passed the barrier
    pub generations: usize,
    pub total_evaluated: usize,
    pub stopped_early: bool,
    pub best: Option<BestRecord>,
}

pub struct Driver<P, R> {
    population: P,
    rng: R,
    generations: usize,
    nan_penalty: Option<f32>,
    state: DriverState,
    submitted: Vec<Grid>,
    pending: Vec<Option<f32>>,
    history: Vec<GenerationStats>,
    best: Option<BestRecord>,
    total_evaluated: usize,
    stopped_early: bool,
}

impl<P: Population, R: RandomSource> Driver<P, R> {
    /// `generations` is the number of updates: generations `0..=generations`
    /// get evaluated.
    pub fn new(population: P, rng: R, generations: usize) -> Result<Self> {
        if population.len() == 0 {
            return Err(OptError::Config(
                "population must be initialized before driving it".into(),
            ));
        }
        Ok(Self {
            population,
            rng,
            generations,
            nan_penalty: None,
            state: DriverState::Initialized,
            submitted: Vec::new(),
            pending: Vec::new(),
            history: Vec::new(),
            best: None,
            total_evaluated: 0,
            stopped_early: false,
        })
    }

    /// Value substituted for NaN results instead of the worst possible one.
    pub fn with_nan_penalty(mut self, penalty: Option<f32>) -> Self {
        self.nan_penalty = penalty;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn population(&self) -> &P {
        &self.population
    }

    /// Mutable access between generations, e.g. to change update settings.
    pub fn population_mut(&mut self) -> &mut P {
        &mut self.population
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    pub fn best(&self) -> Option<&BestRecord> {
        self.best.as_ref()
    }

    /// True once the last budgeted generation has been evaluated.
    pub fn is_finished(&self) -> bool {
        match self.state {
            DriverState::Evaluated(g) => g >= self.generations,
            DriverState::Terminated => true,
            _ => false,
        }
    }

    /// Open the next generation and return its candidates.
    ///
    /// Asking again while the generation is open returns the same candidates
    /// and keeps results already received.
    pub fn submit(&mut self) -> Result<Vec<Grid>> {
        let generation = match self.state {
            DriverState::Initialized => 0,
            DriverState::Updated(g) => g + 1,
            DriverState::Evaluating(_) => return Ok(self.submitted.clone()),
            other => {
                return Err(OptError::InvalidState(format!("cannot submit from {:?}", other)))
            }
        };

        let candidates = self.population.candidates()?;
        self.pending = vec![None; candidates.len()];
        self.submitted = candidates.clone();
        self.state = DriverState::Evaluating(generation);
        log::debug!(
            "Generation {}: submitted {} candidate(s)",
            generation,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Accept the result of candidate `index`, in any order.
    pub fn receive(&mut self, index: usize, value: f32) -> Result<()> {
        let DriverState::Evaluating(generation) = self.state else {
            return Err(OptError::InvalidState(format!(
                "cannot receive results in {:?}",
                self.state
            )));
        };
        let len = self.pending.len();
        let slot = self
            .pending
            .get_mut(index)
            .ok_or(OptError::IndexOutOfRange { index, len })?;

        let value = if value.is_nan() {
            let replacement = self
                .nan_penalty
                .unwrap_or_else(|| self.population.sense().worst());
            log::warn!(
                "Generation {}: individual {} returned NaN, using {}",
                generation,
                index,
                replacement
            );
            replacement
        } else {
            value
        };

        if let Some(previous) = slot.replace(value) {
            log::warn!(
                "Generation {}: individual {} reported twice ({} then {}), keeping the latest",
                generation,
                index,
                previous,
                value
            );
        }
        Ok(())
    }

    /// Indices still waiting for a result.
    pub fn missing(&self) -> Vec<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Barrier: record all results into the population once every
    /// individual has reported.
    pub fn join(&mut self) -> Result<&GenerationStats> {
        let DriverState::Evaluating(generation) = self.state else {
            return Err(OptError::InvalidState(format!("cannot join from {:?}", self.state)));
        };
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(OptError::EvaluationIncomplete {
                generation,
                missing,
            });
        }

        let values: Vec<f32> = self.pending.iter().flatten().copied().collect();
        for (i, &v) in values.iter().enumerate() {
            self.population.record(i, v)?;
        }
        self.total_evaluated += values.len();

        let sense = self.population.sense();
        if let Some(i) = sense.best_index(&values) {
            let improved = match &self.best {
                None => true,
                Some(b) => sense.better(values[i], b.misfit),
            };
            if improved {
                self.best = Some(BestRecord {
                    generation,
                    index: i,
                    misfit: values[i],
                    position: self.submitted[i].clone(),
                });
            }
        }

        let stats = compute_stats(generation, &values, sense, self.total_evaluated);
        log::debug!(
            "Generation {}: best {:.6} mean {:.6} worst {:.6}",
            generation,
            stats.best,
            stats.mean,
            stats.worst
        );
        self.history.push(stats);
        self.state = DriverState::Evaluated(generation);
        Ok(&self.history[self.history.len() - 1])
    }

    /// Produce the next generation. On error the recorded results stay and
    /// the call can be retried after fixing the population's settings.
    pub fn advance(&mut self) -> Result<()> {
        let generation = match self.state {
            DriverState::Evaluated(g) => g,
            DriverState::Evaluating(g) => {
                let missing = self.missing();
                if missing.is_empty() {
                    return Err(OptError::InvalidState(format!(
                        "generation {} is complete but not joined",
                        g
                    )));
                }
                return Err(OptError::EvaluationIncomplete { generation: g, missing });
            }
            _ => {
                return Err(OptError::InvalidState(format!("cannot advance from {:?}", self.state)))
            }
        };
        if generation >= self.generations {
            return Err(OptError::InvalidState(format!(
                "generation budget of {} exhausted",
                self.generations
            )));
        }
        self.population.advance(&mut self.rng)?;
        self.state = DriverState::Updated(generation);
        Ok(())
    }

    /// Stop the run. Results of an open generation are dropped.
    pub fn terminate(&mut self) -> Result<RunSummary> {
        match self.state {
            DriverState::Terminated => {
                return Err(OptError::InvalidState("run already terminated".into()))
            }
            DriverState::Evaluating(g) => {
                log::warn!("Terminating during generation {}: partial results dropped", g);
            }
            _ => {}
        }
        self.stopped_early = !matches!(self.state, DriverState::Evaluated(g) if g >= self.generations);
        self.state = DriverState::Terminated;
        let summary = self.summary();
        log::info!(
            "Run terminated after {} generation(s), {} evaluation(s)",
            summary.generations,
            summary.total_evaluated
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            generations: self.history.len(),
            total_evaluated: self.total_evaluated,
            stopped_early: self.stopped_early,
            best: self.best.clone(),
        }
    }

    /// Record of the last generation that passed the barrier.
    pub fn snapshot(&self) -> Result<GenerationRecord> {
        let generation = match self.state {
            DriverState::Evaluated(g) => g,
            _ => {
                return Err(OptError::InvalidState(format!(
                    "snapshot needs a freshly evaluated generation, state is {:?}",
                    self.state
                )))
            }
        };
        let (misfit, positions) = self.population.snapshot()?;
        Ok(GenerationRecord {
            generation,
            misfit,
            positions,
        })
    }

    /// Submit, evaluate the batch through `Objective::evaluate_all`, receive
    /// and join.
    pub fn evaluate_generation<O: Objective + ?Sized>(&mut self, objective: &O) -> Result<GenerationStats> {
        let candidates = self.submit()?;
        let results = objective.evaluate_all(&candidates);
        if results.len() != candidates.len() {
            return Err(OptError::DimensionMismatch {
                expected: format!("{} results", candidates.len()),
                found: format!("{} results", results.len()),
            });
        }
        for (i, v) in results.into_iter().enumerate() {
            self.receive(i, v)?;
        }
        self.join().cloned()
    }

    /// Drive the whole run, calling `early_stop` after each barrier.
    pub fn run<O, F>(&mut self, objective: &O, mut early_stop: F) -> Result<RunSummary>
    where
        O: Objective + ?Sized,
        F: FnMut(&GenerationStats) -> bool,
    {
        log::info!(
            "Starting run: {} individual(s), {} generation(s)",
            self.population.len(),
            self.generations
        );
        loop {
            let stats = self.evaluate_generation(objective)?;
            if self.is_finished() || early_stop(&stats) {
                break;
            }
            self.advance()?;
        }
        self.terminate()
    }
}

fn compute_stats(generation: usize, values: &[f32], sense: Sense, total_evaluated: usize) -> GenerationStats {
    let best = sense
        .best_index(values)
        .map(|i| values[i])
        .unwrap_or_else(|| sense.worst());
    let worst = values
        .iter()
        .copied()
        .fold(best, |w, v| if sense.better(w, v) { v } else { w });

    let finite: Vec<f64> = values.iter().filter(|v| v.is_finite()).map(|&v| v as f64).collect();
    let (mean, spread) = if finite.is_empty() {
        (f32::NAN, 0.0)
    } else {
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean as f32, var.sqrt() as f32)
    };

    GenerationStats {
        generation,
        best,
        mean,
        worst,
        spread,
        total_evaluated,
    }
}
