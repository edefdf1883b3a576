//! Search-domain description: bounds and step/clamp value for every
//! (point, parameter) pair.
//!
//! The text format is one row per spatial point, each row holding
//! `lower upper clamp_or_step` triples concatenated per parameter:
//!
//! ```text
//! # vs_min vs_max vs_clamp   rho_min rho_max rho_clamp
//! 200.0 800.0 60.0           1600.0 2200.0 50.0
//! 250.0 900.0 65.0           1700.0 2300.0 50.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OptError, Result};
use crate::grid::Grid;

/// Bounds of one parameter at one point.
///
/// For the swarm `step` is the velocity clamp; for the genetic algorithm it
/// is the number of discrete levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f32,
    pub upper: f32,
    pub step: f32,
}

impl Bounds {
    pub fn new(lower: f32, upper: f32, step: f32) -> Self {
        Self { lower, upper, step }
    }

    pub fn width(&self) -> f32 {
        self.upper - self.lower
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.lower {
            self.lower
        } else if value > self.upper {
            self.upper
        } else {
            value
        }
    }

    fn validate(&self, point: usize, param: usize) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.step.is_finite()) {
            return Err(OptError::MalformedInput(format!(
                "point {} parameter {}: non-finite value",
                point, param
            )));
        }
        if self.lower > self.upper {
            return Err(OptError::MalformedInput(format!(
                "point {} parameter {}: lower bound {} exceeds upper bound {}",
                point, param, self.lower, self.upper
            )));
        }
        if self.step <= 0.0 {
            return Err(OptError::MalformedInput(format!(
                "point {} parameter {}: step/clamp must be positive, got {}",
                point, param, self.step
            )));
        }
        Ok(())
    }
}

/// Immutable-after-load parameter space, shared read-only by a population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    npts: usize,
    npar: usize,
    bounds: Vec<Bounds>,
}

impl ParameterSpace {
    /// Build from row-major bounds (`npts * npar` entries).
    pub fn from_bounds(npts: usize, npar: usize, bounds: Vec<Bounds>) -> Result<Self> {
        if npts == 0 || npar == 0 {
            return Err(OptError::MalformedInput(format!(
                "parameter space must have at least one point and one parameter, got {}x{}",
                npts, npar
            )));
        }
        if bounds.len() != npts * npar {
            return Err(OptError::shape(
                format!("{} bounds", npts * npar),
                format!("{} bounds", bounds.len()),
            ));
        }
        for (k, b) in bounds.iter().enumerate() {
            b.validate(k / npar, k % npar)?;
        }
        Ok(Self { npts, npar, bounds })
    }

    /// Same bounds for every point and parameter.
    pub fn uniform(npts: usize, npar: usize, bounds: Bounds) -> Result<Self> {
        Self::from_bounds(npts, npar, vec![bounds; npts * npar])
    }

    /// Load a parameter-space file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let space = Self::parse(&text)?;
        log::info!(
            "Loaded parameter space from {}: {} point(s) x {} parameter(s)",
            path.display(),
            space.npts,
            space.npar
        );
        Ok(space)
    }

    /// Parse the whitespace-delimited table format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut ncol: Option<usize> = None;
        let mut rows = 0;
        let mut bounds = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let values = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f32>().map_err(|_| {
                        OptError::MalformedInput(format!(
                            "line {}: '{}' is not a number",
                            lineno + 1,
                            tok
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            match ncol {
                None => {
                    if values.len() % 3 != 0 {
                        return Err(OptError::MalformedInput(format!(
                            "line {}: {} columns is not a multiple of 3",
                            lineno + 1,
                            values.len()
                        )));
                    }
                    ncol = Some(values.len());
                }
                Some(n) if n != values.len() => {
                    return Err(OptError::MalformedInput(format!(
                        "line {}: expected {} columns, found {}",
                        lineno + 1,
                        n,
                        values.len()
                    )));
                }
                Some(_) => {}
            }

            bounds.extend(
                values
                    .chunks_exact(3)
                    .map(|t| Bounds::new(t[0], t[1], t[2])),
            );
            rows += 1;
        }

        let ncol = ncol.ok_or_else(|| OptError::MalformedInput("no parameter rows found".into()))?;
        Self::from_bounds(rows, ncol / 3, bounds)
    }

    pub fn npts(&self) -> usize {
        self.npts
    }

    pub fn npar(&self) -> usize {
        self.npar
    }

    /// Panics on out-of-range indices.
    pub fn bounds(&self, point: usize, param: usize) -> &Bounds {
        assert!(point < self.npts && param < self.npar);
        &self.bounds[point * self.npar + param]
    }

    /// All bounds in row-major (point, parameter) order.
    pub fn iter(&self) -> impl Iterator<Item = &Bounds> {
        self.bounds.iter()
    }

    /// Number of discrete levels when the third column is a GA sampling count.
    pub fn levels(&self, point: usize, param: usize) -> usize {
        let step = self.bounds(point, param).step.round();
        if step < 1.0 {
            0
        } else {
            step as usize
        }
    }

    /// Error unless `grid` has this space's (points, parameters) shape.
    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        grid.check_shape(self.npts, self.npar)
    }

    pub fn contains(&self, grid: &Grid) -> bool {
        grid.shape() == (self.npts, self.npar)
            && grid
                .as_slice()
                .iter()
                .zip(&self.bounds)
                .all(|(v, b)| *v >= b.lower && *v <= b.upper)
    }

    /// Tighten one parameter around `center` between layer-stripping stages.
    ///
    /// New bounds are `center * (1 ± spread)`, clipped to the bounds of the
    /// reference space `within` (usually the space as first loaded).
    pub fn narrow_around(
        &mut self,
        point: usize,
        param: usize,
        center: f32,
        spread: f32,
        within: &ParameterSpace,
    ) -> Result<()> {
        if within.npts != self.npts || within.npar != self.npar {
            return Err(OptError::shape(
                format!("{}x{}", self.npts, self.npar),
                format!("{}x{}", within.npts, within.npar),
            ));
        }
        if point >= self.npts {
            return Err(OptError::IndexOutOfRange { index: point, len: self.npts });
        }
        if param >= self.npar {
            return Err(OptError::IndexOutOfRange { index: param, len: self.npar });
        }
        if !center.is_finite() || !spread.is_finite() || spread < 0.0 {
            return Err(OptError::Config(format!(
                "cannot narrow around center {} with spread {}",
                center, spread
            )));
        }

        let reference = *within.bounds(point, param);
        let a = center * (1.0 - spread);
        let b = center * (1.0 + spread);
        let lower = reference.clamp(a.min(b));
        let upper = reference.clamp(a.max(b));
        let width = upper - lower;
        let step = if width > 0.0 { 0.2 * width } else { reference.step };

        self.bounds[point * self.npar + param] = Bounds::new(lower, upper, step);
        log::debug!(
            "Narrowed point {} parameter {} to [{}, {}] (clamp {})",
            point, param, lower, upper, step
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_one_line() {
        let space = ParameterSpace::parse("-3.0 3.0 0.6 -3.0 3.0 0.6\n").unwrap();
        assert_eq!(space.npts(), 1);
        assert_eq!(space.npar(), 2);
        for b in space.iter() {
            assert_eq!(*b, Bounds::new(-3.0, 3.0, 0.6));
        }
    }

    #[test]
    fn test_parse_multi_line_with_comments() {
        let text = "# lower upper clamp\n\
                    -3.0 3.0 0.6 -3.0 3.0 0.6\n\
                    \n\
                    -3.0 3.0 0.6   -3.0\t3.0 0.6\n\
                    # trailing comment\n\
                    -3.0 3.0 0.6 -3.0 3.0 0.6\n";
        let space = ParameterSpace::parse(text).unwrap();
        assert_eq!((space.npts(), space.npar()), (3, 2));
        assert_eq!(space.bounds(2, 1).upper, 3.0);
    }

    #[test]
    fn test_parse_rejects_non_multiple_of_three() {
        let err = ParameterSpace::parse("-3.0 3.0 0.6 1.0\n").unwrap_err();
        assert!(matches!(err, OptError::MalformedInput(_)));
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let err = ParameterSpace::parse("-3 3 0.6 -3 3 0.6\n-3 3 0.6\n").unwrap_err();
        assert!(matches!(err, OptError::MalformedInput(_)));
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(ParameterSpace::parse("# nothing\n\n").is_err());
        assert!(ParameterSpace::parse("-3 three 0.6\n").is_err());
    }

    #[test]
    fn test_parse_rejects_inverted_bounds_and_zero_clamp() {
        assert!(ParameterSpace::parse("3 -3 0.6\n").is_err());
        assert!(ParameterSpace::parse("-3 3 0\n").is_err());
        // Degenerate interval is allowed
        assert!(ParameterSpace::parse("1 1 1\n").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pspace.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "-3.0 3.0 8 -3.0 3.0 8").unwrap();
        drop(f);

        let space = ParameterSpace::load(&path).unwrap();
        assert_eq!(space.levels(0, 0), 8);
        assert_eq!(space.levels(0, 1), 8);
    }

    #[test]
    fn test_demo_spaces_parse() {
        let pso = ParameterSpace::parse(include_str!("../demos/pspace_peaks.txt")).unwrap();
        assert_eq!(*pso.bounds(0, 1), Bounds::new(-3.0, 3.0, 0.6));
        let ga = ParameterSpace::parse(include_str!("../demos/pspace_peaks_ga.txt")).unwrap();
        assert_eq!(ga.levels(0, 0), 64);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ParameterSpace::load("/nonexistent/pspace.txt").unwrap_err();
        assert!(matches!(err, OptError::Io(_)));
    }

    #[test]
    fn test_contains_and_check_grid() {
        let space = ParameterSpace::uniform(1, 2, Bounds::new(-3.0, 3.0, 0.6)).unwrap();
        let inside = Grid::from_vec(1, 2, vec![0.0, 3.0]).unwrap();
        let outside = Grid::from_vec(1, 2, vec![0.0, 3.5]).unwrap();
        assert!(space.contains(&inside));
        assert!(!space.contains(&outside));
        assert!(space.check_grid(&Grid::zeros(2, 2)).is_err());
    }

    #[test]
    fn test_narrow_around_clips_to_reference() {
        let original = ParameterSpace::uniform(2, 3, Bounds::new(100.0, 500.0, 40.0)).unwrap();
        let mut space = original.clone();

        space.narrow_around(0, 2, 300.0, 0.1, &original).unwrap();
        let b = space.bounds(0, 2);
        assert!((b.lower - 270.0).abs() < 1e-3);
        assert!((b.upper - 330.0).abs() < 1e-3);
        assert!((b.step - 12.0).abs() < 1e-3);

        // Near the upper edge the interval is clipped
        space.narrow_around(1, 2, 480.0, 0.1, &original).unwrap();
        let b = space.bounds(1, 2);
        assert!((b.lower - 432.0).abs() < 1e-3);
        assert_eq!(b.upper, 500.0);

        // Other parameters untouched
        assert_eq!(space.bounds(0, 0), original.bounds(0, 0));
    }

    #[test]
    fn test_narrow_around_collapsed_interval_keeps_reference_clamp() {
        let original = ParameterSpace::uniform(1, 1, Bounds::new(100.0, 500.0, 40.0)).unwrap();
        let mut space = original.clone();
        space.narrow_around(0, 0, 900.0, 0.1, &original).unwrap();
        let b = space.bounds(0, 0);
        assert_eq!((b.lower, b.upper), (500.0, 500.0));
        assert_eq!(b.step, 40.0);
    }

    #[test]
    fn test_narrow_around_rejects_bad_indices() {
        let original = ParameterSpace::uniform(1, 1, Bounds::new(0.0, 1.0, 0.1)).unwrap();
        let mut space = original.clone();
        assert!(matches!(
            space.narrow_around(1, 0, 0.5, 0.1, &original),
            Err(OptError::IndexOutOfRange { .. })
        ));
        let other = ParameterSpace::uniform(2, 1, Bounds::new(0.0, 1.0, 0.1)).unwrap();
        assert!(matches!(
            space.narrow_around(0, 0, 0.5, 0.1, &other),
            Err(OptError::DimensionMismatch { .. })
        ));
    }
}
