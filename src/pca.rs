// Principal component analysis (PCA) on standardized features

use crate::error::{PcaError, PcaResult};
use crate::linalg_backends::{BackendEigh, BackendSVD, LinAlgBackendProvider};
use crate::standardize::{validate_input, StandardizationParameters};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Ordered principal directions of a fitted model and the variance each one captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentBasis {
    /// Unit-length, mutually orthogonal directions in standardized feature space,
    /// one per column, ordered by descending variance.
    /// Shape: (n_features, n_components)
    rotation: Array2<f64>,
    /// Variance along each direction (eigenvalues of the covariance of the
    /// standardized data, `n - 1` denominator).
    /// Shape: (n_components)
    explained_variance: Array1<f64>,
    /// Fraction of the total variance along each direction.
    /// Shape: (n_components)
    explained_variance_ratio: Array1<f64>,
}

impl ComponentBasis {
    pub fn n_components(&self) -> usize {
        self.rotation.ncols()
    }

    pub fn n_features(&self) -> usize {
        self.rotation.nrows()
    }

    /// Shape: (n_features, n_components)
    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }
}

/// An immutable fitted PCA model: the standardization learned from the training
/// matrix together with the retained component basis.
///
/// Every transform takes the model explicitly, so there is no "unfitted" state to
/// guard against. Refitting produces a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    standardization: StandardizationParameters,
    basis: ComponentBasis,
    n_samples: usize,
}

impl FittedModel {
    pub fn standardization(&self) -> &StandardizationParameters {
        &self.standardization
    }

    pub fn components(&self) -> &ComponentBasis {
        &self.basis
    }

    /// Resolved number of retained components.
    pub fn n_components(&self) -> usize {
        self.basis.n_components()
    }

    pub fn n_features(&self) -> usize {
        self.basis.n_features()
    }

    /// Number of rows in the matrix the model was fitted on.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        self.basis.explained_variance()
    }

    /// Explained-variance ratios, non-increasing, summing to at most 1.
    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        self.basis.explained_variance_ratio()
    }

    /// Running sum of [`explained_variance_ratio`](Self::explained_variance_ratio).
    pub fn cumulative_explained_variance_ratio(&self) -> Array1<f64> {
        let mut running = 0.0;
        self.explained_variance_ratio().mapv(|r| {
            running += r;
            running
        })
    }

    /// Contribution of each original feature to each component.
    /// Shape: (n_features, n_components)
    pub fn loadings(&self) -> Array2<f64> {
        self.basis.rotation.clone()
    }

    /// Standardizes `data` with the fitted parameters and projects it onto the basis.
    ///
    /// # Errors
    /// `FeatureMismatch` if `data` has a different number of columns than the
    /// training matrix, `NonFiniteInput` if it contains NaN or infinite values.
    pub fn transform(&self, data: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        if data.ncols() != self.n_features() {
            return Err(PcaError::FeatureMismatch { expected: self.n_features(), found: data.ncols() });
        }
        if data.nrows() == 0 {
            return Ok(Array2::zeros((0, self.n_components())));
        }
        validate_input(data)?;
        let scaled = self.standardization.transform(data)?;
        Ok(scaled.dot(&self.basis.rotation))
    }

    /// Maps a projection back to the original (unstandardized) feature space.
    ///
    /// The projection is rotated back through the basis and the standardization is
    /// undone: `x[i][j] = x_scaled_hat[i][j] * std[j] + mean[j]`. Constant
    /// features come back as their mean.
    ///
    /// # Errors
    /// `DimensionMismatch` if `projection` does not have `n_components` columns.
    pub fn inverse_transform(&self, projection: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        if projection.ncols() != self.n_components() {
            return Err(PcaError::DimensionMismatch {
                expected: self.n_components(),
                found: projection.ncols(),
            });
        }
        let scaled_hat = projection.dot(&self.basis.rotation.t());
        self.standardization.inverse_transform(scaled_hat.view())
    }
}

/// Resolves the requested component count against `min(rows, features)`.
/// An empty matrix has no valid count.
fn resolve_n_components(requested: Option<usize>, rows: usize, features: usize) -> PcaResult<usize> {
    let max = rows.min(features);
    match requested {
        None if max > 0 => Ok(max),
        None => Err(PcaError::InvalidDimension { requested: 0, max, rows, features }),
        Some(k) if k >= 1 && k <= max => Ok(k),
        Some(k) => Err(PcaError::InvalidDimension { requested: k, max, rows, features }),
    }
}

/// Orients every column so that its largest-magnitude coefficient is positive.
fn flip_signs(rotation: &mut Array2<f64>) {
    for mut column in rotation.columns_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}

/// Divides each retained variance by the variance of the full spectrum.
///
/// The sum of the result never exceeds 1, under either summation order.
fn variance_ratios(explained_variance: &Array1<f64>, total_variance: f64) -> Array1<f64> {
    let mut ratios = explained_variance.mapv(|v| (v / total_variance).min(1.0));
    // Rounding in the divisions can leave the sum a few ulps above 1.
    while ratios.sum() > 1.0 || ratios.iter().sum::<f64>() > 1.0 {
        ratios.mapv_inplace(|r| r * (1.0 - f64::EPSILON));
    }
    ratios
}

/// Fits standardization and PCA with the backend selected at compile time.
///
/// See [`fit_with_backend`].
pub fn fit(data: ArrayView2<f64>, n_components: Option<usize>) -> PcaResult<FittedModel> {
    fit_with_backend(&LinAlgBackendProvider::new(), data, n_components)
}

/// Fits the model and returns it together with the projection of the training data.
pub fn fit_transform(data: ArrayView2<f64>, n_components: Option<usize>) -> PcaResult<(FittedModel, Array2<f64>)> {
    let model = fit(data, n_components)?;
    let projection = model.transform(data)?;
    Ok((model, projection))
}

/// Fits standardization and PCA to `data` (rows are samples, columns are features).
///
/// 1. Every feature is centered and divided by its population standard deviation;
///    constant features become all zeros.
/// 2. If `n_features <= n_samples` the (n_features x n_features) covariance matrix
///    of the standardized data is eigendecomposed. Otherwise the thin SVD of the
///    standardized matrix is used, which yields the same directions without forming
///    the wider covariance.
/// 3. The top `n_components` directions are kept (all `min(rows, features)` when
///    `None`), sorted by descending variance, and oriented so that their
///    largest-magnitude coefficient is positive.
///
/// Explained-variance ratios are relative to the sum of the full spectrum of the
/// decomposition, so they sum to 1 (within rounding, never above) when every
/// component is kept and the data is not entirely constant. When the total
/// variance is zero every ratio is 0.
///
/// # Errors
/// - `InvalidDimension` if `data` has no rows or no features, or if
///   `n_components` is outside `1..=min(rows, features)`.
/// - `NonFiniteInput` if `data` contains NaN or infinite values.
/// - `Decomposition` if the backend fails.
pub fn fit_with_backend<B>(backend: &B, data: ArrayView2<f64>, n_components: Option<usize>) -> PcaResult<FittedModel>
where
    B: BackendEigh + BackendSVD,
{
    let start_time = Instant::now();
    let (n_samples, n_features) = data.dim();
    let k = resolve_n_components(n_components, n_samples, n_features)?;
    validate_input(data)?;

    let standardization = StandardizationParameters::fit(data)?;
    let scaled = standardization.transform(data)?;

    let denominator = n_samples.saturating_sub(1).max(1) as f64;

    let (mut rotation, explained_variance, total_variance) = if n_features <= n_samples {
        debug!("Covariance path: eigendecomposing a {}x{} covariance matrix.", n_features, n_features);
        let mut cov_matrix = scaled.t().dot(&scaled);
        cov_matrix /= denominator;

        let eig = backend
            .eigh_upper(&cov_matrix)
            .map_err(|e| PcaError::Decomposition(format!("Eigen decomposition of covariance matrix failed: {}", e)))?;

        let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
        // Stable sort: ties keep the backend's order.
        order.sort_by(|&a, &b| {
            eig.eigenvalues[b]
                .partial_cmp(&eig.eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut rotation = Array2::<f64>::zeros((n_features, k));
        let mut variances = Array1::<f64>::zeros(k);
        for (slot, &idx) in order.iter().take(k).enumerate() {
            let column = eig.eigenvectors.column(idx);
            let norm = column.dot(&column).sqrt();
            if norm > 0.0 {
                rotation.column_mut(slot).assign(&column.mapv(|v| v / norm));
            }
            variances[slot] = eig.eigenvalues[idx].max(0.0);
        }
        let total = eig.eigenvalues.iter().map(|&v| v.max(0.0)).sum::<f64>();
        (rotation, variances, total)
    } else {
        debug!("SVD path: {} features exceed {} samples.", n_features, n_samples);
        let svd = backend
            .svd_into(scaled, false, true)
            .map_err(|e| PcaError::Decomposition(format!("SVD of standardized matrix failed: {}", e)))?;
        let vt = svd
            .vt
            .ok_or_else(|| PcaError::Decomposition("SVD did not return right singular vectors.".to_string()))?;

        let rotation = vt.slice(s![..k, ..]).t().to_owned();
        let spectrum = svd.s.mapv(|sv| sv * sv / denominator);
        let total = spectrum.sum();
        (rotation, spectrum.slice(s![..k]).to_owned(), total)
    };

    flip_signs(&mut rotation);

    let explained_variance_ratio = if total_variance > 0.0 {
        variance_ratios(&explained_variance, total_variance)
    } else {
        warn!("Standardized data has zero total variance; all explained-variance ratios are 0.");
        Array1::zeros(k)
    };

    info!(
        "Fitted PCA on a {}x{} matrix: kept {} components explaining {:.4} of the variance in {:?}",
        n_samples,
        n_features,
        k,
        explained_variance_ratio.sum(),
        start_time.elapsed()
    );

    Ok(FittedModel {
        standardization,
        basis: ComponentBasis { rotation, explained_variance, explained_variance_ratio },
        n_samples,
    })
}

/// Stateful engine holding at most one fitted model at a time.
///
/// Each call to [`fit_transform`](Self::fit_transform) replaces the previous
/// model. Queries issued before any successful fit return `PcaError::NotFitted`.
/// For code that can carry the model around, the free functions [`fit`] and
/// [`fit_transform`] together with [`FittedModel`] avoid that state entirely.
#[derive(Debug, Default, Clone)]
pub struct PcaEngine {
    model: Option<FittedModel>,
}

impl PcaEngine {
    /// Creates an engine with no fitted model.
    ///
    /// # Examples
    ///
    /// ```
    /// use pca_projection::PcaEngine;
    /// let engine = PcaEngine::new();
    /// assert!(!engine.is_fitted());
    /// ```
    pub fn new() -> Self {
        Self { model: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// The current model, if one has been fitted.
    pub fn model(&self) -> Option<&FittedModel> {
        self.model.as_ref()
    }

    /// Fits the engine to `data` and returns its projection, shape (rows, n_components).
    ///
    /// A failed fit leaves any previous model in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use pca_projection::PcaEngine;
    ///
    /// let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
    /// let mut engine = PcaEngine::new();
    /// let projection = engine.fit_transform(data.view(), Some(2)).unwrap();
    /// assert_eq!(projection.dim(), (3, 2));
    /// ```
    pub fn fit_transform(&mut self, data: ArrayView2<f64>, n_components: Option<usize>) -> PcaResult<Array2<f64>> {
        let (model, projection) = fit_transform(data, n_components)?;
        self.model = Some(model);
        Ok(projection)
    }

    fn fitted(&self) -> PcaResult<&FittedModel> {
        self.model.as_ref().ok_or(PcaError::NotFitted)
    }

    pub fn get_explained_variance_ratio(&self) -> PcaResult<&Array1<f64>> {
        Ok(self.fitted()?.explained_variance_ratio())
    }

    pub fn get_n_components(&self) -> PcaResult<usize> {
        Ok(self.fitted()?.n_components())
    }

    pub fn transform(&self, data: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        self.fitted()?.transform(data)
    }

    pub fn inverse_transform(&self, projection: ArrayView2<f64>) -> PcaResult<Array2<f64>> {
        self.fitted()?.inverse_transform(projection)
    }
}

/// Sum of squared deviations of `a`'s columns from orthonormality, for tests.
#[cfg(test)]
pub(crate) fn orthonormality_error(a: &Array2<f64>) -> f64 {
    let gram = a.t().dot(a);
    let identity = Array2::<f64>::eye(a.ncols());
    (&gram - &identity).mapv(|v| v * v).sum()
}
