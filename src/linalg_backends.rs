// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::error::Error;

// --- Trait Definitions ---

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues, in the order the backend produced them (ascending for LAPACK).
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Symmetric eigendecomposition (LAPACK's DSYEVD family).
/// Implementers may assume `matrix` is symmetric and read only its upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, Box<dyn Error + Send + Sync>>;
}

/// Output of a thin Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    /// Singular values in descending order.
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

/// Thin Singular Value Decomposition: for an (n x d) matrix, `u` is (n x k),
/// `s` has length k and `vt` is (k x d) with k = min(n, d).
pub trait BackendSVD {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput, Box<dyn Error + Send + Sync>>;
}

// --- ndarray-linalg (LAPACK) backend ---
use ndarray::s;
use ndarray_linalg::{Eigh as NdLinalgEigh, SVDInto as NdLinalgSVDInto, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
    Box::new(e)
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, Box<dyn Error + Send + Sync>> {
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput, Box<dyn Error + Send + Sync>> {
        let k = matrix.nrows().min(matrix.ncols());
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        // LAPACK hands back the full factors; keep the leading k.
        Ok(SVDOutput {
            u: u.map(|full_u| full_u.slice(s![.., ..k]).to_owned()),
            s,
            vt: vt.map(|full_vt| full_vt.slice(s![..k, ..]).to_owned()),
        })
    }
}

// --- faer backend ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, BackendSVD, EighOutput, SVDOutput};
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::{ColRef, MatRef};
    use ndarray::{Array1, Array2};
    use std::error::Error;

    fn to_dyn_error_faer(msg: String) -> Box<dyn Error + Send + Sync> {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        Array2::from_shape_fn((faer_mat.nrows(), faer_mat.ncols()), |(i, j)| faer_mat[(i, j)])
    }

    fn faer_col_to_ndarray_vec(faer_col: ColRef<'_, f64>) -> Array1<f64> {
        Array1::from_shape_fn(faer_col.nrows(), |i| faer_col[i])
    }

    /// Copies into row-major order when needed so faer can view the buffer directly.
    fn with_faer_view<R>(matrix: &Array2<f64>, f: impl FnOnce(MatRef<'_, f64>) -> R) -> Result<R, Box<dyn Error + Send + Sync>> {
        let (nrows, ncols) = matrix.dim();
        let standard = matrix.as_standard_layout();
        let slice = standard.as_slice().ok_or_else(|| {
            to_dyn_error_faer(format!("Failed to get a contiguous slice from a ({}x{}) matrix", nrows, ncols))
        })?;
        Ok(f(MatRef::from_row_major_slice(slice, nrows, ncols)))
    }

    impl BackendEigh for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, Box<dyn Error + Send + Sync>> {
            if matrix.nrows() != matrix.ncols() {
                return Err(to_dyn_error_faer("Matrix must be square for eigendecomposition.".to_string()));
            }
            if matrix.is_empty() {
                return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
            }
            with_faer_view(matrix, |view| {
                let eig = view
                    .self_adjoint_eigen(faer::Side::Upper)
                    .map_err(|e| to_dyn_error_faer(format!("Faer eigendecomposition failed: {:?}", e)))?;
                Ok(EighOutput {
                    eigenvalues: faer_col_to_ndarray_vec(eig.S().column_vector()),
                    eigenvectors: faer_mat_to_ndarray(eig.U()),
                })
            })?
        }
    }

    impl BackendSVD for FaerLinAlgBackend {
        fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput, Box<dyn Error + Send + Sync>> {
            let (nrows, ncols) = matrix.dim();
            if matrix.is_empty() {
                let k_dim = nrows.min(ncols);
                return Ok(SVDOutput {
                    u: if compute_u { Some(Array2::zeros((nrows, k_dim))) } else { None },
                    s: Array1::zeros(k_dim),
                    vt: if compute_v { Some(Array2::zeros((k_dim, ncols))) } else { None },
                });
            }
            with_faer_view(&matrix, |view| {
                let svd = FaerSolverSvd::new_thin(view)
                    .map_err(|e| to_dyn_error_faer(format!("Faer SVD computation failed: {:?}", e)))?;
                let s = faer_col_to_ndarray_vec(svd.S().column_vector());
                let u = if compute_u { Some(faer_mat_to_ndarray(svd.U())) } else { None };
                let vt = if compute_v { Some(faer_mat_to_ndarray(svd.V()).t().into_owned()) } else { None };
                Ok(SVDOutput { u, s, vt })
            })?
        }
    }
}

// --- Provider dispatch ---

/// Dispatches to the linear algebra backend selected by compile-time feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider;

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BackendEigh for LinAlgBackendProvider {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, Box<dyn Error + Send + Sync>> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}

impl BackendSVD for LinAlgBackendProvider {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput, Box<dyn Error + Send + Sync>> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn eigh_recovers_diagonal_spectrum() {
        let m = array![[3.0, 0.0], [0.0, 1.0]];
        let out = LinAlgBackendProvider::new().eigh_upper(&m).unwrap();
        let mut vals = out.eigenvalues.to_vec();
        vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_abs_diff_eq!(vals[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vals[1], 3.0, epsilon = 1e-12);
        assert_eq!(out.eigenvectors.dim(), (2, 2));
    }

    #[test]
    fn thin_svd_shapes_for_wide_matrix() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = LinAlgBackendProvider::new().svd_into(m.clone(), true, true).unwrap();
        let u = out.u.unwrap();
        let vt = out.vt.unwrap();
        assert_eq!(u.dim(), (2, 2));
        assert_eq!(out.s.len(), 2);
        assert_eq!(vt.dim(), (2, 3));
        assert!(out.s[0] >= out.s[1]);

        let reconstructed = u.dot(&Array2::from_diag(&out.s)).dot(&vt);
        for (a, b) in reconstructed.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }
}
