//! Evaluation boundary: the caller-supplied cost function and the direction
//! in which its values improve.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// Whether smaller or larger objective values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

impl Sense {
    /// Strict comparison: ties are never better, so the incumbent wins.
    pub fn better(self, a: f32, b: f32) -> bool {
        match self {
            Sense::Minimize => a < b,
            Sense::Maximize => a > b,
        }
    }

    /// The value every finite result improves on.
    pub fn worst(self) -> f32 {
        match self {
            Sense::Minimize => f32::INFINITY,
            Sense::Maximize => f32::NEG_INFINITY,
        }
    }

    /// Index of the best value, first occurrence on ties.
    pub fn best_index(self, values: &[f32]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &v) in values.iter().enumerate() {
            match best {
                None => best = Some(i),
                Some(b) if self.better(v, values[b]) => best = Some(i),
                _ => {}
            }
        }
        best
    }
}

/// Cost function over one candidate model.
///
/// Implementations must be `Sync`: a generation is evaluated in parallel and
/// results are reported back by index.
pub trait Objective: Sync {
    fn evaluate(&self, position: &Grid) -> f32;

    /// Evaluate a whole batch; the result is in input order.
    fn evaluate_all(&self, positions: &[Grid]) -> Vec<f32> {
        positions.par_iter().map(|p| self.evaluate(p)).collect()
    }
}

impl<F> Objective for F
where
    F: Fn(&Grid) -> f32 + Sync,
{
    fn evaluate(&self, position: &Grid) -> f32 {
        self(position)
    }
}
