//! Dense (points × parameters) matrix holding one candidate model.

use serde::{Deserialize, Serialize};

use crate::error::{OptError, Result};

/// One value per (point, parameter), stored row-major by point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    npts: usize,
    npar: usize,
    data: Vec<f32>,
}

impl Grid {
    pub fn zeros(npts: usize, npar: usize) -> Self {
        Self {
            npts,
            npar,
            data: vec![0.0; npts * npar],
        }
    }

    /// Build from row-major values; `values.len()` must equal `npts * npar`.
    pub fn from_vec(npts: usize, npar: usize, values: Vec<f32>) -> Result<Self> {
        if values.len() != npts * npar {
            return Err(OptError::shape(
                format!("{} values ({}x{})", npts * npar, npts, npar),
                format!("{} values", values.len()),
            ));
        }
        Ok(Self {
            npts,
            npar,
            data: values,
        })
    }

    pub fn npts(&self) -> usize {
        self.npts
    }

    pub fn npar(&self) -> usize {
        self.npar
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.npts, self.npar)
    }

    /// Panics on out-of-range indices, like slice indexing.
    pub fn get(&self, point: usize, param: usize) -> f32 {
        self.data[self.offset(point, param)]
    }

    pub fn set(&mut self, point: usize, param: usize, value: f32) {
        let k = self.offset(point, param);
        self.data[k] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Values of one point, one entry per parameter.
    pub fn point(&self, point: usize) -> &[f32] {
        &self.data[point * self.npar..(point + 1) * self.npar]
    }

    pub fn same_shape(&self, other: &Grid) -> bool {
        self.shape() == other.shape()
    }

    pub(crate) fn check_shape(&self, npts: usize, npar: usize) -> Result<()> {
        if self.shape() != (npts, npar) {
            return Err(OptError::shape(
                format!("{}x{}", npts, npar),
                format!("{}x{}", self.npts, self.npar),
            ));
        }
        Ok(())
    }

    fn offset(&self, point: usize, param: usize) -> usize {
        assert!(point < self.npts && param < self.npar, "grid index ({point}, {param}) out of {}x{}", self.npts, self.npar);
        point * self.npar + param
    }
}
