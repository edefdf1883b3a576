//! Neighborhood rules deciding which personal best steers each particle.

use serde::{Deserialize, Serialize};

use crate::error::{OptError, Result};
use crate::objective::Sense;

/// Which individuals a particle sees when looking for its guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Topology {
    /// Whole swarm.
    #[default]
    Full,
    /// Self and the two index neighbors, wrapping at the ends.
    Ring,
    /// Self and four neighbors on a torus `width` individuals wide.
    Toroidal { width: usize },
}

impl Topology {
    /// Check the topology can be laid over `n` individuals.
    pub fn validate(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(OptError::Config("population is empty".into()));
        }
        if let Topology::Toroidal { width } = *self {
            if width == 0 || n % width != 0 {
                return Err(OptError::Config(format!(
                    "toroidal width {} does not divide population size {}",
                    width, n
                )));
            }
        }
        Ok(())
    }

    /// Index of the best individual in the neighborhood of `index`.
    ///
    /// Candidates are visited in a fixed order and only a strictly better
    /// value replaces the incumbent.
    pub fn resolve(&self, misfit: &[f32], sense: Sense, index: usize) -> Result<usize> {
        let n = misfit.len();
        self.validate(n)?;
        if index >= n {
            return Err(OptError::IndexOutOfRange { index, len: n });
        }

        let pick = |candidates: &[usize]| {
            let mut best = index;
            for &j in candidates {
                if sense.better(misfit[j], misfit[best]) {
                    best = j;
                }
            }
            best
        };

        let best = match *self {
            Topology::Full => sense.best_index(misfit).unwrap_or(index),
            Topology::Ring => {
                let prev = (index + n - 1) % n;
                let next = (index + 1) % n;
                pick(&[prev, index, next])
            }
            Topology::Toroidal { width } => pick(&toroidal_neighbors(index, n, width)?),
        };
        Ok(best)
    }
}

/// The four torus neighbors of `index`, in the order they are compared.
///
/// The grid is `width` wide and `n / width` tall with `index = row * width + col`;
/// both axes wrap. Fails if `width` does not divide `n` or `index` is past
/// the end.
pub fn toroidal_neighbors(index: usize, n: usize, width: usize) -> Result<[usize; 4]> {
    Topology::Toroidal { width }.validate(n)?;
    if index >= n {
        return Err(OptError::IndexOutOfRange { index, len: n });
    }
    let n1 = width;
    let n2 = n / width;
    let i1 = index % n1;
    let i2 = index / n1;

    let col_prev = if i1 == 0 { i2 * n1 + (n1 - 1) } else { i2 * n1 + i1 - 1 };
    let row_next = if i2 == n2 - 1 { i1 } else { (i2 + 1) * n1 + i1 };
    let col_next = if i1 == n1 - 1 { i2 * n1 } else { i2 * n1 + i1 + 1 };
    let row_prev = if i2 == 0 { (n2 - 1) * n1 + i1 } else { (i2 - 1) * n1 + i1 };

    Ok([col_prev, row_next, col_next, row_prev])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn misfit_with_best_at(n: usize, best: usize) -> Vec<f32> {
        let mut m = vec![1.0; n];
        m[best] = 0.0;
        m
    }

    #[test]
    fn test_full_resolves_to_global_best() {
        let m = misfit_with_best_at(9, 5);
        for i in 0..9 {
            assert_eq!(Topology::Full.resolve(&m, Sense::Minimize, i).unwrap(), 5);
        }
    }

    #[test]
    fn test_toroidal_index_eight_sees_five() {
        let m = misfit_with_best_at(9, 5);
        let topo = Topology::Toroidal { width: 3 };
        assert_eq!(topo.resolve(&m, Sense::Minimize, 8).unwrap(), 5);
        // 0 is not adjacent to 5 on a 3x3 torus
        assert_eq!(topo.resolve(&m, Sense::Minimize, 0).unwrap(), 0);
    }

    #[test]
    fn test_toroidal_neighbors_wrap() {
        let mut nb = toroidal_neighbors(8, 9, 3).unwrap();
        nb.sort();
        assert_eq!(nb, [2, 5, 6, 7]);

        let mut nb = toroidal_neighbors(0, 9, 3).unwrap();
        nb.sort();
        assert_eq!(nb, [1, 2, 3, 6]);

        // Non-square torus: 2 wide, 3 tall
        let mut nb = toroidal_neighbors(1, 6, 2).unwrap();
        nb.sort();
        assert_eq!(nb, [0, 0, 3, 5]);
    }

    #[test]
    fn test_toroidal_neighbors_rejects_bad_grid() {
        assert!(matches!(toroidal_neighbors(0, 9, 0), Err(OptError::Config(_))));
        assert!(matches!(toroidal_neighbors(0, 10, 4), Err(OptError::Config(_))));
        assert!(matches!(
            toroidal_neighbors(9, 9, 3),
            Err(OptError::IndexOutOfRange { index: 9, len: 9 })
        ));
    }

    #[test]
    fn test_toroidal_rejects_non_divisor_width() {
        let m = vec![0.0; 10];
        let err = Topology::Toroidal { width: 4 }.resolve(&m, Sense::Minimize, 0).unwrap_err();
        assert!(matches!(err, OptError::Config(_)));
        assert!(Topology::Toroidal { width: 0 }.validate(4).is_err());
    }

    #[test]
    fn test_ring_wraps_at_ends() {
        let m = misfit_with_best_at(9, 5);
        assert_eq!(Topology::Ring.resolve(&m, Sense::Minimize, 4).unwrap(), 5);
        assert_eq!(Topology::Ring.resolve(&m, Sense::Minimize, 6).unwrap(), 5);
        assert_eq!(Topology::Ring.resolve(&m, Sense::Minimize, 0).unwrap(), 0);

        let m = misfit_with_best_at(9, 0);
        assert_eq!(Topology::Ring.resolve(&m, Sense::Minimize, 8).unwrap(), 0);
    }

    #[test]
    fn test_maximize_and_ties() {
        let m = vec![2.0, 7.0, 7.0, 1.0];
        assert_eq!(Topology::Full.resolve(&m, Sense::Maximize, 3).unwrap(), 1);
        // Tie with self keeps self
        assert_eq!(Topology::Ring.resolve(&m, Sense::Maximize, 2).unwrap(), 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let m = vec![0.0; 3];
        assert!(matches!(
            Topology::Full.resolve(&m, Sense::Minimize, 3),
            Err(OptError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            topology: Topology,
        }
        let w: Wrap = toml::from_str("topology = { kind = \"toroidal\", width = 4 }").unwrap();
        assert_eq!(w.topology, Topology::Toroidal { width: 4 });
        let w: Wrap = toml::from_str("topology = { kind = \"ring\" }").unwrap();
        assert_eq!(w.topology, Topology::Ring);
    }
}
