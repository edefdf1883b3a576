//! Binary genome encoding of real-valued parameters.
//!
//! Each parameter is quantised onto `levels` evenly spaced values between its
//! bounds and stored as an unsigned integer, most significant bit first.
//! Parameters with a single level are fixed at their lower bound and take no
//! bits at all.

use std::sync::Arc;

use crate::error::{OptError, Result};
use crate::grid::Grid;
use crate::pspace::ParameterSpace;

/// One bit per entry, `true` for 1.
pub type Chromosome = Vec<bool>;

/// Number of bits needed to index `levels` values (0 for `levels <= 1`).
pub fn bit_length_for(levels: usize) -> usize {
    if levels <= 1 {
        return 0;
    }
    levels.next_power_of_two().trailing_zeros() as usize
}

/// Nearest level index of `value`, clamped to `[0, levels - 1]`.
pub fn level_index(value: f32, lower: f32, upper: f32, levels: usize) -> usize {
    if levels <= 1 || upper <= lower {
        return 0;
    }
    let ix = ((levels - 1) as f32 * (value - lower) / (upper - lower)).round();
    if ix <= 0.0 {
        0
    } else {
        (ix as usize).min(levels - 1)
    }
}

/// Real value of level `index`.
pub fn level_value(index: usize, lower: f32, upper: f32, levels: usize) -> f32 {
    if levels <= 1 {
        return lower;
    }
    lower + index as f32 * (upper - lower) / (levels - 1) as f32
}

pub fn encode(value: f32, lower: f32, upper: f32, levels: usize) -> Chromosome {
    let nbits = bit_length_for(levels);
    let ix = level_index(value, lower, upper, levels);
    (0..nbits).rev().map(|shift| (ix >> shift) & 1 == 1).collect()
}

/// Inverse of [`encode`]. Bit patterns past the last level (possible when
/// `levels` is not a power of two) decode to the upper bound.
pub fn decode(bits: &[bool], lower: f32, upper: f32, levels: usize) -> f32 {
    if levels <= 1 {
        return lower;
    }
    let ix = bits.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize);
    level_value(ix.min(levels - 1), lower, upper, levels)
}

/// Gene lengths and offsets for a whole parameter space.
#[derive(Debug, Clone)]
pub struct GenomeLayout {
    space: Arc<ParameterSpace>,
    lengths: Vec<usize>,
    total: usize,
}

impl GenomeLayout {
    pub fn new(space: Arc<ParameterSpace>) -> Self {
        let mut lengths = Vec::with_capacity(space.npts() * space.npar());
        for point in 0..space.npts() {
            for param in 0..space.npar() {
                lengths.push(bit_length_for(space.levels(point, param)));
            }
        }
        let total = lengths.iter().sum();
        Self {
            space,
            lengths,
            total,
        }
    }

    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    /// Bits per gene in (point, parameter) row-major order.
    pub fn gene_lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn total_bits(&self) -> usize {
        self.total
    }

    /// Encode a model into a chromosome.
    pub fn write(&self, model: &Grid) -> Result<Chromosome> {
        self.space.check_grid(model)?;
        let mut chromo = Vec::with_capacity(self.total);
        let npar = self.space.npar();
        for (k, b) in self.space.iter().enumerate() {
            let levels = self.space.levels(k / npar, k % npar);
            chromo.extend(encode(model.as_slice()[k], b.lower, b.upper, levels));
        }
        Ok(chromo)
    }

    /// Decode a chromosome into a model.
    pub fn read(&self, chromo: &[bool]) -> Result<Grid> {
        if chromo.len() != self.total {
            return Err(OptError::shape(
                format!("{} bits", self.total),
                format!("{} bits", chromo.len()),
            ));
        }
        let npts = self.space.npts();
        let npar = self.space.npar();
        let mut model = Grid::zeros(npts, npar);
        let mut offset = 0;
        for (k, b) in self.space.iter().enumerate() {
            let len = self.lengths[k];
            let levels = self.space.levels(k / npar, k % npar);
            model.as_mut_slice()[k] = decode(&chromo[offset..offset + len], b.lower, b.upper, levels);
            offset += len;
        }
        Ok(model)
    }
}
