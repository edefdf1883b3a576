//! Injected randomness for initialisation and update rules.

use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};

/// Source of uniform draws consumed by the swarm and the genetic algorithm.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f32;

    /// Uniform index in `[0, upper)`. `upper` must be non-zero.
    fn index(&mut self, upper: usize) -> usize;

    /// Uniform draw in `[lower, upper]` built from one `uniform()` call.
    fn uniform_in(&mut self, lower: f32, upper: f32) -> f32 {
        let x = lower + self.uniform() * (upper - lower);
        x.min(upper)
    }
}

impl RandomSource for StdRng {
    fn uniform(&mut self) -> f32 {
        self.gen::<f32>()
    }

    fn index(&mut self, upper: usize) -> usize {
        self.gen_range(0..upper)
    }
}

impl RandomSource for ThreadRng {
    fn uniform(&mut self) -> f32 {
        self.gen::<f32>()
    }

    fn index(&mut self, upper: usize) -> usize {
        self.gen_range(0..upper)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn uniform(&mut self) -> f32 {
        (**self).uniform()
    }

    fn index(&mut self, upper: usize) -> usize {
        (**self).index(upper)
    }
}

/// Reproducible generator when a seed is given, entropy-seeded otherwise.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Replays a fixed list of uniform draws, cycling when exhausted.
#[cfg(test)]
pub(crate) struct Replay {
    draws: Vec<f32>,
    pos: usize,
}

#[cfg(test)]
impl Replay {
    pub(crate) fn new(draws: Vec<f32>) -> Self {
        assert!(!draws.is_empty());
        Self { draws, pos: 0 }
    }
}

#[cfg(test)]
impl RandomSource for Replay {
    fn uniform(&mut self) -> f32 {
        let x = self.draws[self.pos % self.draws.len()];
        self.pos += 1;
        x
    }

    fn index(&mut self, upper: usize) -> usize {
        ((self.uniform() * upper as f32) as usize).min(upper - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = make_rng(Some(42));
        let mut b = make_rng(Some(42));
        for _ in 0..16 {
            assert_eq!(a.uniform(), b.uniform());
            assert_eq!(a.index(10), b.index(10));
        }
    }

    #[test]
    fn test_draw_ranges() {
        let mut rng = make_rng(Some(7));
        for _ in 0..1000 {
            let u = rng.uniform();
            assert!((0.0..1.0).contains(&u));
            assert!(rng.index(3) < 3);
            let x = rng.uniform_in(-3.0, 3.0);
            assert!((-3.0..=3.0).contains(&x));
        }
    }

    #[test]
    fn test_replay_cycles() {
        let mut r = Replay::new(vec![0.25, 0.75]);
        assert_eq!(r.uniform(), 0.25);
        assert_eq!(r.uniform(), 0.75);
        assert_eq!(r.uniform(), 0.25);
        assert_eq!(r.index(4), 3);
    }

    #[test]
    fn test_thread_rng_through_mut_ref() {
        fn draw(mut src: impl RandomSource) -> f32 {
            src.uniform()
        }
        let mut rng = rand::thread_rng();
        assert!(draw(&mut rng) < 1.0);
        assert!(draw(&mut rng) >= 0.0);
    }
}
