//! Undirected dependency structure read off the inverse covariance matrix.
//!
//! A zero in the precision matrix means conditional independence given all
//! other variables. Entries whose magnitude exceeds a threshold are taken as
//! edges of an undirected graph.

use crate::gaussian::symmetrize;
use crate::regression::FitError;
use ndarray::Array2;
use ndarray_linalg::Inverse;

/// Inverse of a covariance matrix, symmetrised.
pub fn precision_matrix(covariance: &Array2<f64>) -> Result<Array2<f64>, FitError> {
    let (rows, cols) = covariance.dim();
    if rows != cols {
        return Err(FitError::ShapeMismatch {
            expected: rows,
            rows,
            cols,
        });
    }
    let mut precision = covariance.inv().map_err(FitError::Inversion)?;
    symmetrize(&mut precision);
    Ok(precision)
}

/// Binary adjacency: 1 where `|precision_ij| > threshold` off the diagonal.
/// Both `(i, j)` and `(j, i)` are decided from the same averaged entry, so the
/// output is symmetric even if `precision` is not.
pub fn threshold_adjacency(precision: &Array2<f64>, threshold: f64) -> Array2<u8> {
    let n = precision.nrows().min(precision.ncols());
    let mut adjacency = Array2::<u8>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let value = 0.5 * (precision[[i, j]] + precision[[j, i]]);
            if value.abs() > threshold {
                adjacency[[i, j]] = 1;
                adjacency[[j, i]] = 1;
            }
        }
    }
    adjacency
}

/// The `(i, j)` pairs with `i < j` marked in `adjacency`.
pub fn undirected_edges(adjacency: &Array2<u8>) -> Vec<(usize, usize)> {
    let n = adjacency.nrows();
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .filter(|&(i, j)| adjacency[[i, j]] != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_chain_precision_has_no_end_to_end_edge() {
        // A -> B -> C with unit noise: (A, C) are independent given B.
        let covariance = array![[1.0, 2.0, 1.0], [2.0, 5.0, 2.5], [1.0, 2.5, 2.25]];
        let precision = precision_matrix(&covariance).unwrap();
        assert_abs_diff_eq!(precision[[0, 2]], 0.0, epsilon = 1e-10);

        let adjacency = threshold_adjacency(&precision, 1e-4);
        assert_eq!(adjacency, array![[0u8, 1, 0], [1, 0, 1], [0, 1, 0]]);
        assert_eq!(undirected_edges(&adjacency), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_adjacency_is_symmetric_for_asymmetric_input() {
        let skewed = array![[2.0, 0.00012, 0.3], [0.00006, 1.0, -0.5], [0.3, -0.5, 1.0]];
        let adjacency = threshold_adjacency(&skewed, 1e-4);
        for i in 0..3 {
            assert_eq!(adjacency[[i, i]], 0);
            for j in 0..3 {
                assert_eq!(adjacency[[i, j]], adjacency[[j, i]]);
            }
        }
        // The averaged entry 0.00009 falls below the threshold.
        assert_eq!(adjacency[[0, 1]], 0);
        assert_eq!(adjacency[[1, 2]], 1);
    }

    #[test]
    fn test_singular_covariance_fails() {
        let covariance = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(precision_matrix(&covariance).is_err());
    }
}
