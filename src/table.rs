// Named-column tables: the data source bound to a session, label vectors, and result tables

use crate::error::{PcaError, PcaResult};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Name of the label column appended to projection tables.
pub const LABEL_COLUMN_NAME: &str = "label";

/// A single column of a [`DataTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }
}

/// A rectangular data source with uniquely named, equally long columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl DataTable {
    /// Builds a table from `(name, column)` pairs, keeping their order.
    ///
    /// # Errors
    /// `DuplicateColumn` if a name repeats, `RaggedColumns` if the columns differ in length.
    pub fn new(columns: Vec<(String, Column)>) -> PcaResult<Self> {
        let n_rows = columns.first().map_or(0, |(_, c)| c.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for (name, column) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(PcaError::DuplicateColumn(name.clone()));
            }
            if column.len() != n_rows {
                return Err(PcaError::RaggedColumns {
                    column: name.clone(),
                    expected: n_rows,
                    found: column.len(),
                });
            }
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self { names, columns, n_rows })
    }

    /// Builds an all-numeric table from a (rows x names.len()) matrix.
    pub fn from_matrix<S: Into<String>>(names: Vec<S>, data: &Array2<f64>) -> PcaResult<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() != data.ncols() {
            return Err(PcaError::FeatureMismatch { expected: names.len(), found: data.ncols() });
        }
        let columns = names
            .into_iter()
            .zip(data.columns())
            .map(|(name, column)| (name, Column::Numeric(column.to_vec())))
            .collect();
        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Names of the numeric columns, in table order.
    pub fn numeric_column_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .zip(&self.columns)
            .filter(|(_, c)| c.is_numeric())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Extracts the listed columns, in the given order, as a (rows x names.len()) matrix.
    ///
    /// # Errors
    /// `UnknownColumn` or `NonNumericColumn` for the first offending name.
    pub fn numeric_matrix(&self, names: &[String]) -> PcaResult<Array2<f64>> {
        let mut matrix = Array2::<f64>::zeros((self.n_rows, names.len()));
        for (j, name) in names.iter().enumerate() {
            match self.column(name) {
                None => return Err(PcaError::UnknownColumn(name.clone())),
                Some(Column::Categorical(_)) => return Err(PcaError::NonNumericColumn(name.clone())),
                Some(Column::Numeric(values)) => {
                    matrix.column_mut(j).assign(&ArrayView1::from(values.as_slice()));
                }
            }
        }
        Ok(matrix)
    }

    /// Copies column `name` out as a row-aligned label vector.
    pub fn labels(&self, name: &str) -> PcaResult<Labels> {
        match self.column(name) {
            None => Err(PcaError::UnknownColumn(name.to_string())),
            Some(Column::Numeric(values)) => Ok(Labels::Numeric(values.clone())),
            Some(Column::Categorical(values)) => Ok(Labels::Categorical(values.clone())),
        }
    }
}

/// Per-row labels taken from the label column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Labels {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// Categorical labels mapped to integer codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedLabels {
    /// Distinct labels in sorted order; `codes[i]` indexes into this.
    pub classes: Vec<String>,
    pub codes: Vec<usize>,
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Numeric(values) => values.len(),
            Labels::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Labels::Numeric(_))
    }

    /// Encodes categorical labels as indices into their sorted distinct values.
    /// Returns `None` for numeric labels, which are used as they are.
    pub fn encode(&self) -> Option<EncodedLabels> {
        let Labels::Categorical(values) = self else {
            return None;
        };
        let classes: Vec<String> = values.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let codes = values
            .iter()
            .filter_map(|v| classes.binary_search(v).ok())
            .collect();
        Some(EncodedLabels { classes, codes })
    }

    /// One number per row for colour mapping: numeric labels as-is, categorical
    /// labels as their encoded class index.
    pub fn color_values(&self) -> Vec<f64> {
        match self {
            Labels::Numeric(values) => values.clone(),
            Labels::Categorical(_) => self
                .encode()
                .map(|e| e.codes.into_iter().map(|c| c as f64).collect())
                .unwrap_or_default(),
        }
    }
}

/// A numeric result table with named columns, an optional row index and an
/// optional trailing label column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    index: Option<Vec<String>>,
    values: Array2<f64>,
    labels: Option<Labels>,
}

impl ResultTable {
    pub(crate) fn new(columns: Vec<String>, index: Option<Vec<String>>, values: Array2<f64>, labels: Option<Labels>) -> Self {
        debug_assert_eq!(columns.len(), values.ncols());
        debug_assert!(index.as_ref().map_or(true, |ix| ix.len() == values.nrows()));
        debug_assert!(labels.as_ref().map_or(true, |l| l.len() == values.nrows()));
        Self { columns, index, values, labels }
    }

    /// Names of the numeric columns, followed by `"label"` when labels are present.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if self.labels.is_some() {
            names.push(LABEL_COLUMN_NAME);
        }
        names
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Row identifiers, for tables indexed by feature name.
    pub fn index(&self) -> Option<&[String]> {
        self.index.as_deref()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    /// Numeric column by name.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }

    /// Row by index label, for indexed tables.
    pub fn row(&self, key: &str) -> Option<ArrayView1<'_, f64>> {
        self.index
            .as_ref()?
            .iter()
            .position(|k| k == key)
            .map(|i| self.values.row(i))
    }
}

/// `PC1..PCn`.
pub fn component_names(n_components: usize) -> Vec<String> {
    (1..=n_components).map(|i| format!("PC{}", i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_table() -> DataTable {
        DataTable::new(vec![
            ("a".to_string(), Column::Numeric(vec![1.0, 2.0, 3.0])),
            ("species".to_string(), Column::Categorical(vec!["b".into(), "a".into(), "b".into()])),
            ("c".to_string(), Column::Numeric(vec![4.0, 5.0, 6.0])),
        ])
        .unwrap()
    }

    #[test]
    fn numeric_matrix_follows_requested_order() {
        let table = sample_table();
        let m = table.numeric_matrix(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(m, array![[4.0, 1.0], [5.0, 2.0], [6.0, 3.0]]);
        assert_eq!(table.numeric_column_names(), vec!["a", "c"]);
        assert!(!table.column("a").unwrap().is_empty());
        assert_eq!(table.column("species").unwrap().len(), 3);
    }

    #[test]
    fn numeric_matrix_rejects_unknown_and_categorical_columns() {
        let table = sample_table();
        assert_eq!(
            table.numeric_matrix(&["zz".to_string()]).unwrap_err(),
            PcaError::UnknownColumn("zz".to_string())
        );
        assert_eq!(
            table.numeric_matrix(&["species".to_string()]).unwrap_err(),
            PcaError::NonNumericColumn("species".to_string())
        );
    }

    #[test]
    fn construction_rejects_duplicates_and_ragged_columns() {
        let dup = DataTable::new(vec![
            ("x".to_string(), Column::Numeric(vec![1.0])),
            ("x".to_string(), Column::Numeric(vec![2.0])),
        ]);
        assert_eq!(dup.unwrap_err(), PcaError::DuplicateColumn("x".to_string()));

        let ragged = DataTable::new(vec![
            ("x".to_string(), Column::Numeric(vec![1.0, 2.0])),
            ("y".to_string(), Column::Numeric(vec![2.0])),
        ]);
        assert_eq!(
            ragged.unwrap_err(),
            PcaError::RaggedColumns { column: "y".to_string(), expected: 2, found: 1 }
        );
    }

    #[test]
    fn categorical_labels_encode_to_sorted_classes() {
        let labels = sample_table().labels("species").unwrap();
        let encoded = labels.encode().unwrap();
        assert_eq!(encoded.classes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(encoded.codes, vec![1, 0, 1]);
        assert_eq!(labels.color_values(), vec![1.0, 0.0, 1.0]);

        assert!(!labels.is_empty());
        let numeric = Labels::Numeric(vec![0.5, 2.0]);
        assert!(!numeric.is_empty());
        assert!(numeric.encode().is_none());
        assert_eq!(numeric.color_values(), vec![0.5, 2.0]);
    }

    #[test]
    fn result_table_exposes_label_column_last() {
        let table = ResultTable::new(
            component_names(2),
            None,
            array![[1.0, 2.0], [3.0, 4.0]],
            Some(Labels::Numeric(vec![0.0, 1.0])),
        );
        assert_eq!(table.column_names(), vec!["PC1", "PC2", "label"]);
        assert_eq!(table.column("PC2").unwrap().to_vec(), vec![2.0, 4.0]);
        assert!(table.column("label").is_none());
        assert!(table.row("anything").is_none());
    }
}
