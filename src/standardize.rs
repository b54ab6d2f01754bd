// Per-feature standardization (zero mean, unit population variance)

use crate::error::{PcaError, PcaResult};
use log::{trace, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Rejects empty matrices and matrices containing NaN or infinite values.
pub(crate) fn validate_input(data: ArrayView2<f64>) -> PcaResult<()> {
    let (rows, features) = data.dim();
    if rows == 0 || features == 0 {
        return Err(PcaError::InvalidDimension { requested: 0, max: 0, rows, features });
    }
    if let Some(((row, column), _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(PcaError::NonFiniteInput { row, column });
    }
    Ok(())
}

/// Mean and population standard deviation of every feature of a fitted matrix.
///
/// A feature whose rows are all identical is recorded with a standard deviation of
/// exactly `0.0`; its standardized values are defined as zero, and the inverse
/// transform maps anything in that column back to the feature's mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizationParameters {
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Shape: (n_features). Zero marks a constant feature.
    std: Array1<f64>,
}

impl StandardizationParameters {
    /// Computes per-feature means and population standard deviations (`ddof = 0`).
    ///
    /// # Errors
    /// `InvalidDimension` for a matrix with no rows or no features, `NonFiniteInput` if
    /// any value is NaN or infinite.
    pub fn fit(data: ArrayView2<f64>) -> PcaResult<Self> {
        validate_input(data)?;

        let n_rows = data.nrows() as f64;
        let (mean, std): (Vec<f64>, Vec<f64>) = data
            .axis_iter(Axis(1))
            .map(|column| {
                let first = column[0];
                if column.iter().all(|&v| v == first) {
                    // Exact mean so the inverse transform restores the column bit for bit.
                    (first, 0.0)
                } else {
                    let m = column.sum() / n_rows;
                    let var = column.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / n_rows;
                    (m, var.sqrt())
                }
            })
            .unzip();
        let mean = Array1::from(mean);
        let std = Array1::from(std);

        let n_constant = std.iter().filter(|&&s| s == 0.0).count();
        if n_constant > 0 {
            warn!(
                "{} of {} features are constant; their standardized values are set to zero.",
                n_constant,
                std.len()
            );
        }
        trace!("Fitted standardization over {} features.", std.len());

        Ok(Self { mean, std })
    }

    /// Mean of each feature.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Population standard deviation of each feature (`0.0` for constant features).
    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Whether feature `j` was constant in the fitted data.
    pub fn is_constant(&self, j: usize) -> bool {
        self.std.get(j).map_or(false, |&s| s == 0.0)
    }

    /// `(x - mean) / std`, with constant features mapped to zero.
    ///
    /// # Errors
    /// `FeatureMismatch` if `data` does not have the fitted number of columns.
    pub fn transform(&self, data: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        self.check_features(data.ncols())?;
        let mut scaled = data.to_owned();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            Zip::from(row.view_mut())
                .and(&self.mean)
                .and(&self.std)
                .for_each(|v, &m, &s| {
                    *v = if s == 0.0 { 0.0 } else { (*v - m) / s };
                });
        }
        Ok(scaled)
    }

    /// `x_scaled * std + mean`.
    ///
    /// # Errors
    /// `FeatureMismatch` if `scaled` does not have the fitted number of columns.
    pub fn inverse_transform(&self, scaled: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        self.check_features(scaled.ncols())?;
        let mut restored = scaled.to_owned();
        restored *= &self.std;
        restored += &self.mean;
        Ok(restored)
    }

    fn check_features(&self, found: usize) -> PcaResult<()> {
        if found != self.n_features() {
            return Err(PcaError::FeatureMismatch { expected: self.n_features(), found });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_std() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]];
        let params = StandardizationParameters::fit(x.view()).unwrap();
        assert_abs_diff_eq!(params.mean()[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(params.mean()[1], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(params.std()[0], 5.0f64.sqrt(), epsilon = 1e-12);

        let scaled = params.transform(x.view()).unwrap();
        for column in scaled.columns() {
            let mean = column.mean().unwrap();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_feature_scales_to_exact_zeros() {
        let x = array![[0.1, 1.0], [0.1, 2.0], [0.1, 4.0]];
        let params = StandardizationParameters::fit(x.view()).unwrap();
        assert!(params.is_constant(0));
        assert!(!params.is_constant(1));
        assert_eq!(params.std()[0], 0.0);

        let scaled = params.transform(x.view()).unwrap();
        assert!(scaled.column(0).iter().all(|&v| v == 0.0));

        let restored = params.inverse_transform(scaled.view()).unwrap();
        assert!(restored.column(0).iter().all(|&v| v == x[[0, 0]]));
        for (a, b) in restored.column(1).iter().zip(x.column(1).iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_empty_and_non_finite_input() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(
            StandardizationParameters::fit(empty.view()),
            Err(PcaError::InvalidDimension { requested: 0, max: 0, rows: 0, features: 3 })
        );
        let featureless = Array2::<f64>::zeros((4, 0));
        assert!(matches!(
            StandardizationParameters::fit(featureless.view()),
            Err(PcaError::InvalidDimension { max: 0, rows: 4, features: 0, .. })
        ));

        let with_nan = array![[1.0, 2.0], [f64::NAN, 3.0]];
        assert_eq!(
            StandardizationParameters::fit(with_nan.view()),
            Err(PcaError::NonFiniteInput { row: 1, column: 0 })
        );
    }

    #[test]
    fn transform_checks_feature_count() {
        let params = StandardizationParameters::fit(array![[1.0, 2.0], [2.0, 1.0]].view()).unwrap();
        let wrong = array![[1.0, 2.0, 3.0]];
        assert_eq!(
            params.transform(wrong.view()),
            Err(PcaError::FeatureMismatch { expected: 2, found: 3 })
        );
    }
}
