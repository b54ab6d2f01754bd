// Principal component analysis (PCA) projections of selected table columns

#![doc = include_str!("../README.md")]

pub mod error;
pub mod linalg_backends;
pub mod pca;
pub mod session;
pub mod standardize;
pub mod table;


pub use error::{PcaError, PcaResult};
pub use pca::{fit, fit_transform, fit_with_backend, ComponentBasis, FittedModel, PcaEngine};
pub use session::{ProjectionResult, ProjectionSession, SessionConfig, StalePolicy};
pub use standardize::StandardizationParameters;
pub use table::{component_names, Column, DataTable, EncodedLabels, Labels, ResultTable, LABEL_COLUMN_NAME};
