//! Binary-coded genetic algorithm: tournament selection, single-point
//! crossover and bit-flip mutation with elitism.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec::{level_value, Chromosome, GenomeLayout};
use crate::error::{OptError, Result};
use crate::grid::Grid;
use crate::objective::Sense;
use crate::pspace::ParameterSpace;
use crate::random::RandomSource;

/// Operator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub tournament_size: usize,
    pub crossover_rate: f32,
    pub mutation_rate: f32,
    pub elite_count: usize,
    /// MacQueen refinement rounds applied after random initialisation
    pub cvt_iterations: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            tournament_size: 4,
            crossover_rate: 0.5,
            mutation_rate: 0.2,
            elite_count: 0,
            cvt_iterations: 0,
        }
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tournament_size == 0 {
            return Err(OptError::Config("tournament size must be at least 1".into()));
        }
        for (name, p) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(OptError::Config(format!("{} must be within [0, 1], got {}", name, p)));
            }
        }
        Ok(())
    }
}

pub struct Genalg {
    layout: GenomeLayout,
    config: GaConfig,
    sense: Sense,
    chromosomes: Vec<Chromosome>,
    misfit: Vec<f32>,
}

impl Genalg {
    pub fn new(space: Arc<ParameterSpace>, config: GaConfig, sense: Sense) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            layout: GenomeLayout::new(space),
            config,
            sense,
            chromosomes: Vec::new(),
            misfit: Vec::new(),
        })
    }

    /// Random pool of `n` chromosomes, each parameter on a random level,
    /// optionally spread out by `cvt_iterations` rounds of MacQueen's
    /// centroidal Voronoi refinement.
    pub fn init_chromosomes<R: RandomSource + ?Sized>(
        &mut self,
        n: usize,
        cvt_iterations: usize,
        rng: &mut R,
    ) -> Result<()> {
        if n == 0 {
            return Err(OptError::Config("population is empty".into()));
        }
        let mut pool = Vec::with_capacity(n);
        for _ in 0..n {
            pool.push(self.layout.write(&self.random_model(rng)?)?);
        }
        if cvt_iterations > 0 {
            self.refine_cvt(&mut pool, cvt_iterations, rng)?;
        }

        self.chromosomes = pool;
        self.misfit = vec![self.sense.worst(); n];
        log::debug!(
            "Initialized {} chromosome(s) of {} bit(s), {} CVT iteration(s)",
            n,
            self.layout.total_bits(),
            cvt_iterations
        );
        Ok(())
    }

    fn random_model<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Result<Grid> {
        let space = self.layout.space();
        let npar = space.npar();
        let values = space
            .iter()
            .enumerate()
            .map(|(k, b)| {
                let levels = space.levels(k / npar, k % npar);
                if levels > 1 {
                    level_value(rng.index(levels), b.lower, b.upper, levels)
                } else {
                    b.lower
                }
            })
            .collect();
        Grid::from_vec(space.npts(), npar, values)
    }

    fn refine_cvt<R: RandomSource + ?Sized>(
        &self,
        pool: &mut [Chromosome],
        iterations: usize,
        rng: &mut R,
    ) -> Result<()> {
        let space = Arc::clone(self.layout.space());
        let mut hits = vec![1.0f32; pool.len()];

        for _ in 0..iterations {
            let q = self.random_model(rng)?;

            let mut closest = 0;
            let mut closest_d = f32::INFINITY;
            for (i, chromo) in pool.iter().enumerate() {
                let x = self.layout.read(chromo)?;
                let d: f32 = space
                    .iter()
                    .zip(x.as_slice().iter().zip(q.as_slice()))
                    .filter(|(b, _)| b.width() > 0.0)
                    .map(|(b, (xi, qi))| ((xi - qi) / b.width()).powi(2))
                    .sum::<f32>()
                    .sqrt();
                if d < closest_d {
                    closest = i;
                    closest_d = d;
                }
            }

            let mut x = self.layout.read(&pool[closest])?;
            let j = hits[closest];
            for (xi, qi) in x.as_mut_slice().iter_mut().zip(q.as_slice()) {
                *xi = (j * *xi + qi) / (j + 1.0);
            }
            pool[closest] = self.layout.write(&x)?;
            hits[closest] += 1.0;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn layout(&self) -> &GenomeLayout {
        &self.layout
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GaConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn misfits(&self) -> &[f32] {
        &self.misfit
    }

    /// Real-valued model of chromosome `index`.
    pub fn decode(&self, index: usize) -> Result<Grid> {
        let chromo = self.chromosomes.get(index).ok_or(OptError::IndexOutOfRange {
            index,
            len: self.chromosomes.len(),
        })?;
        self.layout.read(chromo)
    }

    pub fn models(&self) -> Result<Vec<Grid>> {
        self.chromosomes.iter().map(|c| self.layout.read(c)).collect()
    }

    /// Store the objective value of chromosome `index` for this generation.
    pub fn record(&mut self, index: usize, value: f32) -> Result<()> {
        let len = self.misfit.len();
        let slot = self
            .misfit
            .get_mut(index)
            .ok_or(OptError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Indices of the `count` best chromosomes, best first. Equal misfits
    /// keep encounter order.
    pub fn elite_indices(&self, count: usize) -> Vec<usize> {
        let mut used = vec![false; self.misfit.len()];
        let mut elites = Vec::with_capacity(count);
        for _ in 0..count.min(self.misfit.len()) {
            let mut best: Option<usize> = None;
            for (i, &m) in self.misfit.iter().enumerate() {
                if used[i] {
                    continue;
                }
                match best {
                    Some(b) if !self.sense.better(m, self.misfit[b]) => {}
                    _ => best = Some(i),
                }
            }
            if let Some(b) = best {
                used[b] = true;
                elites.push(b);
            }
        }
        elites
    }

    /// K-way tournament. Elites fill the first slots, each remaining slot
    /// gets the best of `tournament_size` random draws.
    pub fn tournament<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Vec<Chromosome> {
        let n = self.chromosomes.len();
        let mut selected: Vec<Chromosome> = self
            .elite_indices(self.config.elite_count)
            .into_iter()
            .map(|i| self.chromosomes[i].clone())
            .collect();

        while selected.len() < n {
            let mut best = rng.index(n);
            for _ in 1..self.config.tournament_size {
                let challenger = rng.index(n);
                if self.sense.better(self.misfit[challenger], self.misfit[best]) {
                    best = challenger;
                }
            }
            selected.push(self.chromosomes[best].clone());
        }
        selected
    }

    /// Single-point crossover over consecutive non-elite pairs. An unpaired
    /// last chromosome passes through unchanged.
    pub fn crossover<R: RandomSource + ?Sized>(&self, mut selected: Vec<Chromosome>, rng: &mut R) -> Vec<Chromosome> {
        let len = self.layout.total_bits();
        if len == 0 {
            return selected;
        }
        let nelit = self.config.elite_count.min(selected.len());
        let mut i = nelit;
        while i + 1 < selected.len() {
            if rng.uniform() < self.config.crossover_rate {
                let cut = rng.index(len);
                let (head, tail) = selected.split_at_mut(i + 1);
                head[i][cut..].swap_with_slice(&mut tail[0][cut..]);
            }
            i += 2;
        }
        selected
    }

    /// Flip each non-elite bit with probability `mutation_rate`.
    pub fn mutation<R: RandomSource + ?Sized>(&self, mut crossed: Vec<Chromosome>, rng: &mut R) -> Vec<Chromosome> {
        let nelit = self.config.elite_count.min(crossed.len());
        for chromo in crossed.iter_mut().skip(nelit) {
            for bit in chromo.iter_mut() {
                if rng.uniform() < self.config.mutation_rate {
                    *bit = !*bit;
                }
            }
        }
        crossed
    }

    /// Selection, crossover and mutation, then replace the pool.
    ///
    /// Nothing changes if the configuration does not fit the population.
    pub fn update<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let n = self.chromosomes.len();
        if n == 0 {
            return Err(OptError::InvalidState("chromosome pool is empty".into()));
        }
        if self.config.elite_count > n {
            return Err(OptError::Config(format!(
                "elite count {} exceeds population size {}",
                self.config.elite_count, n
            )));
        }

        let selected = self.tournament(rng);
        let crossed = self.crossover(selected, rng);
        let mutated = self.mutation(crossed, rng);

        self.chromosomes = mutated;
        self.misfit = vec![self.sense.worst(); n];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pspace::Bounds;
    use crate::random::{make_rng, Replay};

    fn bits(s: &str) -> Chromosome {
        s.chars().map(|c| c == '1').collect()
    }

    fn space_8_levels() -> Arc<ParameterSpace> {
        Arc::new(ParameterSpace::uniform(1, 2, Bounds::new(-3.0, 3.0, 8.0)).unwrap())
    }

    fn pool(config: GaConfig, chromos: &[&str], misfit: &[f32], sense: Sense) -> Genalg {
        let mut ga = Genalg::new(space_8_levels(), config, sense).unwrap();
        ga.chromosomes = chromos.iter().map(|c| bits(c)).collect();
        ga.misfit = misfit.to_vec();
        ga
    }

    // ====================
    // Initialisation
    // ====================

    #[test]
    fn test_init_chromosomes_on_levels() {
        let mut ga = Genalg::new(space_8_levels(), GaConfig::default(), Sense::Minimize).unwrap();
        ga.init_chromosomes(12, 0, &mut make_rng(Some(4))).unwrap();
        assert_eq!(ga.len(), 12);
        assert_eq!(ga.layout().gene_lengths(), &[3, 3]);
        for i in 0..ga.len() {
            assert_eq!(ga.chromosomes()[i].len(), 6);
            let m = ga.decode(i).unwrap();
            for &x in m.as_slice() {
                assert!((-3.0..=3.0).contains(&x));
                let level = (x + 3.0) * 7.0 / 6.0;
                assert!((level - level.round()).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_cvt_moves_nearest_toward_candidate() {
        // One parameter whose level index equals its value
        let space = Arc::new(ParameterSpace::uniform(1, 1, Bounds::new(0.0, 7.0, 8.0)).unwrap());
        let mut ga = Genalg::new(space, GaConfig::default(), Sense::Minimize).unwrap();
        // Draws: individual 0 -> level 7, individual 1 -> level 4, candidate -> level 0
        let mut rng = Replay::new(vec![0.99, 0.5, 0.0]);
        ga.init_chromosomes(2, 1, &mut rng).unwrap();
        assert_eq!(ga.decode(0).unwrap().get(0, 0), 7.0);
        assert_eq!(ga.decode(1).unwrap().get(0, 0), 2.0);
    }

    #[test]
    fn test_init_rejects_empty_pool() {
        let mut ga = Genalg::new(space_8_levels(), GaConfig::default(), Sense::Minimize).unwrap();
        assert!(ga.init_chromosomes(0, 0, &mut make_rng(Some(1))).is_err());
    }

    // ====================
    // Operators
    // ====================

    #[test]
    fn test_elite_indices_first_encountered_wins() {
        let ga = pool(
            GaConfig::default(),
            &["000000"; 4],
            &[2.0, 1.0, 1.0, 0.5],
            Sense::Minimize,
        );
        assert_eq!(ga.elite_indices(3), vec![3, 1, 2]);

        // Negative misfits and maximisation need no sentinel
        let ga = pool(
            GaConfig::default(),
            &["000000"; 4],
            &[-2.0, -1.0, -1.0, -5.0],
            Sense::Maximize,
        );
        assert_eq!(ga.elite_indices(4), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_tournament_picks_best_of_draws() {
        let config = GaConfig {
            tournament_size: 2,
            ..GaConfig::default()
        };
        let chromos = ["000000", "111111", "000111", "111000"];
        let misfit = [5.0, 1.0, 3.0, 4.0];

        // Each slot draws indices 0 then 1
        let ga = pool(config.clone(), &chromos, &misfit, Sense::Minimize);
        let selected = ga.tournament(&mut Replay::new(vec![0.0, 0.3]));
        assert!(selected.iter().all(|c| *c == bits("111111")));

        let ga = pool(config, &chromos, &misfit, Sense::Maximize);
        let selected = ga.tournament(&mut Replay::new(vec![0.0, 0.3]));
        assert!(selected.iter().all(|c| *c == bits("000000")));
    }

    #[test]
    fn test_tournament_places_elites_first() {
        let config = GaConfig {
            elite_count: 2,
            ..GaConfig::default()
        };
        let ga = pool(
            config,
            &["000000", "111111", "000111", "111000"],
            &[5.0, 1.0, 0.5, 4.0],
            Sense::Minimize,
        );
        let selected = ga.tournament(&mut make_rng(Some(8)));
        assert_eq!(selected[0], bits("000111"));
        assert_eq!(selected[1], bits("111111"));
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_crossover_swaps_tails_and_skips_odd_leftover() {
        let config = GaConfig {
            crossover_rate: 1.0,
            elite_count: 1,
            ..GaConfig::default()
        };
        let ga = pool(config, &["101010"; 4], &[0.0; 4], Sense::Minimize);
        let selected = vec![bits("101010"), bits("111111"), bits("000000"), bits("110011")];
        // uniform 0.0 < rate, then cut index floor(0.5 * 6) = 3
        let crossed = ga.crossover(selected, &mut Replay::new(vec![0.0, 0.5]));
        assert_eq!(crossed[0], bits("101010"));
        assert_eq!(crossed[1], bits("111000"));
        assert_eq!(crossed[2], bits("000111"));
        assert_eq!(crossed[3], bits("110011"));
    }

    #[test]
    fn test_crossover_rate_zero_copies() {
        let config = GaConfig {
            crossover_rate: 0.0,
            ..GaConfig::default()
        };
        let ga = pool(config, &["000000"; 2], &[0.0; 2], Sense::Minimize);
        let selected = vec![bits("111111"), bits("000000")];
        let crossed = ga.crossover(selected.clone(), &mut make_rng(Some(1)));
        assert_eq!(crossed, selected);
    }

    #[test]
    fn test_mutation_rates() {
        let config = GaConfig {
            mutation_rate: 1.0,
            elite_count: 1,
            ..GaConfig::default()
        };
        let ga = pool(config, &["000000"; 2], &[0.0; 2], Sense::Minimize);
        let mutated = ga.mutation(vec![bits("101010"), bits("101010")], &mut make_rng(Some(1)));
        assert_eq!(mutated[0], bits("101010"));
        assert_eq!(mutated[1], bits("010101"));

        let config = GaConfig {
            mutation_rate: 0.0,
            ..GaConfig::default()
        };
        let ga = pool(config, &["000000"; 2], &[0.0; 2], Sense::Minimize);
        let mutated = ga.mutation(vec![bits("101010")], &mut make_rng(Some(1)));
        assert_eq!(mutated[0], bits("101010"));
    }

    // ====================
    // Generation update
    // ====================

    #[test]
    fn test_elites_survive_update_bit_identical() {
        let config = GaConfig {
            elite_count: 2,
            crossover_rate: 1.0,
            mutation_rate: 0.5,
            ..GaConfig::default()
        };
        let mut ga = Genalg::new(space_8_levels(), config, Sense::Minimize).unwrap();
        let mut rng = make_rng(Some(21));
        ga.init_chromosomes(10, 0, &mut rng).unwrap();

        for _ in 0..20 {
            for i in 0..ga.len() {
                let m = ga.decode(i).unwrap();
                let value = m.get(0, 0).powi(2) + m.get(0, 1).powi(2) + i as f32 * 1e-3;
                ga.record(i, value).unwrap();
            }
            let elites: Vec<Chromosome> = ga
                .elite_indices(2)
                .into_iter()
                .map(|i| ga.chromosomes()[i].clone())
                .collect();
            ga.update(&mut rng).unwrap();
            assert_eq!(&ga.chromosomes()[..2], &elites[..]);
        }
    }

    #[test]
    fn test_update_rejects_too_many_elites() {
        let config = GaConfig {
            elite_count: 5,
            ..GaConfig::default()
        };
        let mut ga = pool(config, &["000000"; 4], &[0.0; 4], Sense::Minimize);
        let before = ga.chromosomes().to_vec();
        assert!(matches!(ga.update(&mut make_rng(Some(1))), Err(OptError::Config(_))));
        assert_eq!(ga.chromosomes(), &before[..]);
    }

    #[test]
    fn test_fixed_parameters_only() {
        let space = Arc::new(ParameterSpace::uniform(1, 2, Bounds::new(1.0, 2.0, 1.0)).unwrap());
        let mut ga = Genalg::new(space, GaConfig::default(), Sense::Minimize).unwrap();
        let mut rng = make_rng(Some(3));
        ga.init_chromosomes(4, 3, &mut rng).unwrap();
        ga.update(&mut rng).unwrap();
        assert!(ga.chromosomes().iter().all(|c| c.is_empty()));
        assert_eq!(ga.decode(0).unwrap().point(0), &[1.0, 1.0]);
    }

    #[test]
    fn test_config_validation() {
        let bad = GaConfig {
            mutation_rate: 1.5,
            ..GaConfig::default()
        };
        assert!(Genalg::new(space_8_levels(), bad, Sense::Minimize).is_err());
        let bad = GaConfig {
            tournament_size: 0,
            ..GaConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
