// Projection session: binds a column selection of a data table to the PCA engine

use crate::error::{PcaError, PcaResult};
use crate::pca::{fit_transform, FittedModel};
use crate::table::{component_names, DataTable, Labels, ResultTable};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// What result queries do when the selection changed after the last run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StalePolicy {
    /// Fail with `PcaError::StaleResult`.
    #[default]
    Error,
    /// Rerun PCA with the current selection before answering.
    Recompute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub stale_policy: StalePolicy,
    /// Component count requested before any explicit `set_n_components` / `run_pca`.
    /// Zero is raised to 1 when the session is created.
    pub default_components: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_policy: StalePolicy::Error,
            default_components: 2,
        }
    }
}

/// Output of a successful [`ProjectionSession::run_pca`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    /// Shape: (rows, n_components)
    pub projection: Array2<f64>,
    pub explained_variance_ratio: Array1<f64>,
    pub n_components: usize,
    /// Row-aligned with `projection` when a label column is set.
    pub labels: Option<Labels>,
}

/// Identity of the inputs a projection was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    sorted_columns: Vec<String>,
    label_column: Option<String>,
    n_components: usize,
    source_generation: u64,
}

#[derive(Debug, Clone)]
struct CachedRun {
    key: CacheKey,
    /// Selection in the order the matrix was built.
    columns: Vec<String>,
    model: FittedModel,
    result: ProjectionResult,
}

/// Owns a data source, a column selection and an optional label column, and
/// serves PCA results that are guaranteed to match the current selection.
///
/// Each successful `run_pca` is cached under the key
/// `(sorted columns, label column, n_components, source generation)`. Running
/// again with an unchanged key returns the cached result. Result queries compare
/// the cached key with the current one and, on mismatch, either fail with
/// `StaleResult` or recompute, according to [`StalePolicy`].
///
/// The selected columns and the label column are kept disjoint.
#[derive(Debug, Clone)]
pub struct ProjectionSession {
    config: SessionConfig,
    source: Option<DataTable>,
    source_generation: u64,
    selected_columns: Vec<String>,
    label_column: Option<String>,
    n_components: usize,
    cached: Option<CachedRun>,
}

impl Default for ProjectionSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ProjectionSession {
    pub fn new(mut config: SessionConfig) -> Self {
        if config.default_components == 0 {
            warn!("SessionConfig::default_components is 0; using 1 component instead.");
            config.default_components = 1;
        }
        let n_components = config.default_components;
        Self {
            config,
            source: None,
            source_generation: 0,
            selected_columns: Vec::new(),
            label_column: None,
            n_components,
            cached: None,
        }
    }

    /// Creates a session already bound to `source`.
    pub fn with_source(source: DataTable, config: SessionConfig) -> Self {
        let mut session = Self::new(config);
        session.set_source(source);
        session
    }

    /// Binds a new data source. Results computed from the previous source become stale.
    pub fn set_source(&mut self, source: DataTable) {
        debug!("Binding data source with {} rows and {} columns.", source.n_rows(), source.n_columns());
        self.source = Some(source);
        self.source_generation += 1;
    }

    pub fn source(&self) -> Option<&DataTable> {
        self.source.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn selected_columns(&self) -> &[String] {
        &self.selected_columns
    }

    pub fn label_column(&self) -> Option<&str> {
        self.label_column.as_deref()
    }

    /// Component count the next run or stale recompute will use.
    pub fn requested_components(&self) -> usize {
        self.n_components
    }

    /// Records the selection to analyse. Nothing is computed.
    ///
    /// # Errors
    /// `DuplicateColumn` if a column is listed twice, `LabelInSelection` if the
    /// label column is also listed as an input. The previous selection is kept on error.
    pub fn load_data<S: Into<String>>(&mut self, columns: Vec<S>, label_column: Option<S>) -> PcaResult<()> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let label_column: Option<String> = label_column.map(Into::into);

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(PcaError::DuplicateColumn(column.clone()));
            }
        }
        if let Some(label) = &label_column {
            if seen.contains(label.as_str()) {
                return Err(PcaError::LabelInSelection(label.clone()));
            }
        }

        self.selected_columns = columns;
        self.label_column = label_column;
        Ok(())
    }

    /// Adds `column` to the selection, or removes it if already selected.
    /// Returns whether the column is selected afterwards.
    ///
    /// # Errors
    /// `LabelInSelection` if `column` is the current label column.
    pub fn toggle_column(&mut self, column: &str) -> PcaResult<bool> {
        if self.label_column.as_deref() == Some(column) {
            return Err(PcaError::LabelInSelection(column.to_string()));
        }
        if let Some(pos) = self.selected_columns.iter().position(|c| c == column) {
            self.selected_columns.remove(pos);
            Ok(false)
        } else {
            self.selected_columns.push(column.to_string());
            Ok(true)
        }
    }

    /// Sets or clears the label column. A column chosen as the label leaves the
    /// selection; clearing the label does not put it back.
    pub fn set_label_column<S: Into<String>>(&mut self, label_column: Option<S>) {
        let label_column: Option<String> = label_column.map(Into::into);
        if let Some(label) = &label_column {
            self.selected_columns.retain(|c| c != label);
        }
        self.label_column = label_column;
    }

    /// Records the dimensionality that result queries must match.
    pub fn set_n_components(&mut self, n_components: usize) {
        self.n_components = n_components;
    }

    fn current_key(&self) -> CacheKey {
        let mut sorted_columns = self.selected_columns.clone();
        sorted_columns.sort();
        CacheKey {
            sorted_columns,
            label_column: self.label_column.clone(),
            n_components: self.n_components,
            source_generation: self.source_generation,
        }
    }

    /// Whether a cached result exists but no longer matches the selection.
    pub fn is_stale(&self) -> bool {
        self.cached.as_ref().map_or(false, |run| run.key != self.current_key())
    }

    /// Runs PCA on the selected columns with `n_components` components.
    ///
    /// Returns the cached result if nothing changed since the last successful run.
    ///
    /// # Errors
    /// - `NoData` if no source is bound, the source has no rows, or no columns are selected.
    /// - `UnknownColumn` / `NonNumericColumn` for a bad selection or label column.
    /// - `InvalidDimension` if `n_components` is outside `1..=min(rows, selected columns)`.
    /// - Any other engine error from [`fit_transform`].
    pub fn run_pca(&mut self, n_components: usize) -> PcaResult<ProjectionResult> {
        self.n_components = n_components;
        self.ensure_current()?;
        self.cached
            .as_ref()
            .map(|run| run.result.clone())
            .ok_or(PcaError::NotRun)
    }

    /// Brings the cache in line with the current key, computing if needed.
    fn ensure_current(&mut self) -> PcaResult<()> {
        let source = match &self.source {
            Some(source) if source.n_rows() > 0 && !self.selected_columns.is_empty() => source,
            _ => return Err(PcaError::NoData),
        };

        let key = self.current_key();
        if self.cached.as_ref().map_or(false, |run| run.key == key) {
            debug!("Selection unchanged; serving cached projection.");
            return Ok(());
        }

        let start_time = Instant::now();
        let matrix = source.numeric_matrix(&self.selected_columns)?;
        let labels = self
            .label_column
            .as_deref()
            .map(|label| source.labels(label))
            .transpose()?;
        let (model, projection) = fit_transform(matrix.view(), Some(self.n_components))?;

        let result = ProjectionResult {
            projection,
            explained_variance_ratio: model.explained_variance_ratio().clone(),
            n_components: model.n_components(),
            labels,
        };
        info!(
            "Computed {}-component projection of {} rows over {} columns in {:?}",
            result.n_components,
            matrix.nrows(),
            matrix.ncols(),
            start_time.elapsed()
        );

        self.cached = Some(CachedRun {
            key,
            columns: self.selected_columns.clone(),
            model,
            result,
        });
        Ok(())
    }

    /// The cached run, after applying the stale policy.
    fn current_run(&mut self) -> PcaResult<&CachedRun> {
        if self.cached.is_none() {
            return Err(PcaError::NotRun);
        }
        if self.is_stale() {
            match self.config.stale_policy {
                StalePolicy::Error => {
                    debug!("Rejecting query: cached projection is stale.");
                    return Err(PcaError::StaleResult);
                }
                StalePolicy::Recompute => {
                    debug!("Cached projection is stale; recomputing.");
                    self.ensure_current()?;
                }
            }
        }
        self.cached.as_ref().ok_or(PcaError::NotRun)
    }

    /// The last projection as a table with columns `PC1..PCn` and, when a label
    /// column is set, a trailing `label` column.
    pub fn get_pca_dataframe(&mut self) -> PcaResult<ResultTable> {
        let run = self.current_run()?;
        Ok(ResultTable::new(
            component_names(run.result.n_components),
            None,
            run.result.projection.clone(),
            run.result.labels.clone(),
        ))
    }

    /// Loadings indexed by selected column, with columns `PC1..PCn`.
    pub fn get_loadings(&mut self) -> PcaResult<ResultTable> {
        let run = self.current_run()?;
        Ok(ResultTable::new(
            component_names(run.model.n_components()),
            Some(run.columns.clone()),
            run.model.loadings(),
            None,
        ))
    }

    /// The last projection mapped back to the selected columns' original scale.
    pub fn reconstruct_original_data(&mut self) -> PcaResult<ResultTable> {
        let run = self.current_run()?;
        let reconstructed = run.model.inverse_transform(run.result.projection.view())?;
        Ok(ResultTable::new(run.columns.clone(), None, reconstructed, None))
    }

    pub fn explained_variance_ratio(&mut self) -> PcaResult<Array1<f64>> {
        Ok(self.current_run()?.result.explained_variance_ratio.clone())
    }

    pub fn n_components(&mut self) -> PcaResult<usize> {
        Ok(self.current_run()?.result.n_components)
    }

    /// The fitted model behind the last projection.
    pub fn model(&mut self) -> PcaResult<&FittedModel> {
        Ok(&self.current_run()?.model)
    }
}
