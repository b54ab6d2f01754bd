use thiserror::Error;

/// Errors raised by the transform engine and the projection session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PcaError {
    /// Also raised for an empty matrix, where `max` is 0 and no count is valid.
    #[error("Requested {requested} components for a ({rows}, {features}) matrix; valid counts are 1..={max}.")]
    InvalidDimension {
        requested: usize,
        max: usize,
        rows: usize,
        features: usize,
    },

    #[error("The model has not been fitted. Call fit_transform first.")]
    NotFitted,

    #[error("Projection has {found} columns but the model was fitted with {expected} components.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Input data has {found} features but the model was fitted on {expected}.")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("Input matrix contains NaN or infinite values (first at row {row}, column {column}).")]
    NonFiniteInput { row: usize, column: usize },

    #[error("No data source is bound or no columns are selected.")]
    NoData,

    #[error("PCA has not been run yet.")]
    NotRun,

    #[error("The selection changed since the last run; the cached projection is stale.")]
    StaleResult,

    #[error("Column '{0}' does not exist in the data source.")]
    UnknownColumn(String),

    #[error("Column '{0}' is not numeric and cannot be used as a PCA input.")]
    NonNumericColumn(String),

    #[error("Column '{0}' is the label column and cannot also be a PCA input.")]
    LabelInSelection(String),

    #[error("Column '{0}' appears more than once.")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {found} rows but the table has {expected}.")]
    RaggedColumns {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Linear algebra backend failed: {0}")]
    Decomposition(String),
}

pub type PcaResult<T> = Result<T, PcaError>;
