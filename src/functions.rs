//! Analytic test surfaces for exercising the optimizers without a forward
//! model.

use crate::error::{OptError, Result};
use crate::grid::Grid;
use crate::objective::Objective;

/// Bimodal surface on `[-3, 3]^2`.
///
/// Global minimum ~ -6.5511 at (0.2283, -1.6255), local minimum ~ -3.0498 at
/// (-1.3474, 0.2045). Global maximum ~ 8.1062 at (-0.0093, 1.5814).
pub fn peaks(x1: f32, x2: f32) -> f32 {
    let (x1, x2) = (x1 as f64, x2 as f64);
    let a = 3.0 * (1.0 - x1).powi(2) * (-x1 * x1 - (x2 + 1.0).powi(2)).exp();
    let b = 10.0 * (x1 / 5.0 - x1.powi(3) - x2.powi(5)) * (-x1 * x1 - x2 * x2).exp();
    let c = (-(x1 + 1.0).powi(2) - x2 * x2).exp() / 3.0;
    (a - b - c) as f32
}

pub fn sphere(x: &[f32]) -> f32 {
    x.iter().map(|v| v * v).sum()
}

pub fn rastrigin(x: &[f32]) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    10.0 * x.len() as f32 + x.iter().map(|v| v * v - 10.0 * (two_pi * v).cos()).sum::<f32>()
}

/// A named surface evaluated over every value of a model grid.
#[derive(Debug, Clone, Copy)]
pub struct TestFunction {
    pub name: &'static str,
    /// Smallest number of values the surface reads
    pub min_values: usize,
    eval: fn(&[f32]) -> f32,
}

impl Objective for TestFunction {
    fn evaluate(&self, position: &Grid) -> f32 {
        (self.eval)(position.as_slice())
    }
}

fn peaks_slice(x: &[f32]) -> f32 {
    match x {
        [x1, x2, ..] => peaks(*x1, *x2),
        _ => f32::NAN,
    }
}

const FUNCTIONS: &[TestFunction] = &[
    TestFunction { name: "peaks", min_values: 2, eval: peaks_slice },
    TestFunction { name: "sphere", min_values: 1, eval: sphere },
    TestFunction { name: "rastrigin", min_values: 1, eval: rastrigin },
];

pub fn names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.iter().map(|f| f.name)
}

pub fn by_name(name: &str) -> Result<TestFunction> {
    FUNCTIONS
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .copied()
        .ok_or_else(|| {
            OptError::Config(format!(
                "unknown test function '{}' (available: {})",
                name,
                names().collect::<Vec<_>>().join(", ")
            ))
        })
}
