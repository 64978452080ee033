//! # Data Loading, Preparation and Splitting
//!
//! This module is the only place that touches user-provided tables. It reads a
//! delimited file with a header row, validates the requested columns (present,
//! numeric, complete, finite) and hands the numeric core a dense `ndarray`
//! matrix with named columns.
//!
//! - Strict Schema: every column the analysis names must be present. Extra
//!   columns are ignored.
//! - User-Centric Errors: failures are assumed to be user-input errors and
//!   `DataError` says which column or row is at fault.
//! - Preparation is value-in, value-out: dropping outlier rows and appending
//!   derived columns each return a new [`Table`].

use crate::config::DerivedColumn;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, ShapeBuilder};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The table has only {found} rows, but at least {required} are needed.")]
    InsufficientRows { found: usize, required: usize },
    #[error("Outlier row {row} does not exist; the table has {n_rows} rows (rows are numbered from 1).")]
    OutlierOutOfRange { row: usize, n_rows: usize },
    #[error("Column '{0}' already exists and cannot be derived again.")]
    DuplicateColumn(String),
    #[error("The split proportion must lie strictly between 0 and 1, got {0}.")]
    InvalidSplitProportion(f64),
    #[error("A split of {n_rows} rows at proportion {proportion} leaves an empty training or test set.")]
    EmptySplit { n_rows: usize, proportion: f64 },
    #[error("Table values do not match the column names: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

/// A dense numeric table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    values: Array2<f64>,
}

impl Table {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, DataError> {
        if names.len() != values.ncols() {
            return Err(DataError::ShapeError(ndarray::ShapeError::from_kind(
                ndarray::ErrorKind::IncompatibleShape,
            )));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, DataError> {
        Ok(self.values.column(self.column_index(name)?))
    }

    /// A new table holding `names` in the given order.
    pub fn select_columns(&self, names: &[String]) -> Result<Table, DataError> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;
        Table::new(names.to_vec(), self.values.select(Axis(1), &indices))
    }

    /// A new table holding the rows at the given 0-based indices.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Removes rows given by 1-based row numbers.
    pub fn drop_rows(&self, one_based_rows: &[usize]) -> Result<Table, DataError> {
        let n_rows = self.nrows();
        let mut dropped = BTreeSet::new();
        for &row in one_based_rows {
            if row == 0 || row > n_rows {
                return Err(DataError::OutlierOutOfRange { row, n_rows });
            }
            dropped.insert(row - 1);
        }
        let kept: Vec<usize> = (0..n_rows).filter(|i| !dropped.contains(i)).collect();
        Ok(self.select_rows(&kept))
    }

    /// Appends `derived.scale * source + derived.offset` as a new column.
    pub fn with_derived(&self, derived: &DerivedColumn) -> Result<Table, DataError> {
        if self.names.iter().any(|n| n == &derived.name) {
            return Err(DataError::DuplicateColumn(derived.name.clone()));
        }
        let column: Array1<f64> = self
            .column(&derived.source)?
            .mapv(|v| derived.scale * v + derived.offset);

        let mut values = Array2::zeros((self.nrows(), self.ncols() + 1));
        values
            .slice_mut(ndarray::s![.., ..self.ncols()])
            .assign(&self.values);
        values.column_mut(self.ncols()).assign(&column);

        let mut names = self.names.clone();
        names.push(derived.name.clone());
        Ok(Table { names, values })
    }
}

/// Reads `columns` from a delimited file with a header row.
pub fn load_table(path: &str, separator: u8, columns: &[String]) -> Result<Table, DataError> {
    internal::load_columns(path, separator, columns)
}

/// Drops the outlier rows and appends every derived column, in that order.
pub fn prepare(
    raw: &Table,
    outlier_rows: &[usize],
    derived: &[DerivedColumn],
) -> Result<Table, DataError> {
    let mut table = raw.drop_rows(outlier_rows)?;
    for column in derived {
        table = table.with_derived(column)?;
    }
    log::info!(
        "Prepared table: {} rows after dropping {} outliers, {} derived columns added.",
        table.nrows(),
        raw.nrows() - table.nrows(),
        derived.len()
    );
    Ok(table)
}

/// Disjoint row indices for training and testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffles `0..n_rows` once with a seeded generator and takes the first
/// `floor(n_rows * proportion)` indices for training, the rest for testing.
/// Both index lists are returned in ascending order.
pub fn split_indices(
    n_rows: usize,
    proportion: f64,
    seed: u64,
) -> Result<TrainTestSplit, DataError> {
    if !(proportion > 0.0 && proportion < 1.0) {
        return Err(DataError::InvalidSplitProportion(proportion));
    }
    // The small nudge keeps products such as 250 * 0.6 from flooring to 149.
    let n_train = ((n_rows as f64) * proportion + 1e-9).floor() as usize;
    if n_train == 0 || n_train >= n_rows {
        return Err(DataError::EmptySplit { n_rows, proportion });
    }

    let mut permutation: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let mut train = permutation[..n_train].to_vec();
    let mut test = permutation[n_train..].to_vec();
    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

/// Internal module for the polars-facing loading logic.
mod internal {
    use super::*;

    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let wrong_type = || DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        };

        let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
        if casted.null_count() > 0 {
            return Err(wrong_type());
        }

        let values: Vec<f64> = casted.f64()?.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    pub(super) fn load_columns(
        path: &str,
        separator: u8,
        columns: &[String],
    ) -> Result<Table, DataError> {
        log::info!("Loading data from '{path}'");

        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        if df.height() == 0 {
            return Err(DataError::InsufficientRows {
                found: 0,
                required: 1,
            });
        }

        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for name in columns {
            if !present.contains(name) {
                return Err(DataError::ColumnNotFound(name.clone()));
            }
        }

        let n = df.height();
        let mut buffer = Vec::with_capacity(n * columns.len());
        for name in columns {
            let mut column = extract_numeric_column(&df, name)?;
            buffer.append(&mut column);
        }
        let values = Array2::from_shape_vec((n, columns.len()).f(), buffer)?;

        log::info!(
            "Loaded {} rows; all {} required columns are numeric, complete and finite.",
            n,
            columns.len()
        );
        Table::new(columns.to_vec(), values)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    /// A robust helper to create a temporary CSV file for testing.
    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn cols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn small_table() -> Table {
        Table::new(
            cols(&["Weight", "Height"]),
            array![[150.0, 70.0], [200.0, 72.0], [180.0, 29.5], [160.0, 68.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_load_table_selects_requested_columns_in_order() {
        let content = "Density,BodyFat,Age,Weight\n1.07,12.3,23,154.25\n1.08,6.1,22,173.25\n1.04,25.3,22,154.0";
        let file = create_test_csv(content).unwrap();
        let table = load_table(
            file.path().to_str().unwrap(),
            b',',
            &cols(&["Weight", "BodyFat"]),
        )
        .unwrap();
        assert_eq!(table.names(), &cols(&["Weight", "BodyFat"])[..]);
        assert_eq!(table.nrows(), 3);
        assert_abs_diff_eq!(table.values()[[0, 0]], 154.25, epsilon = 1e-12);
        assert_abs_diff_eq!(table.values()[[2, 1]], 25.3, epsilon = 1e-12);
    }

    #[test]
    fn test_tab_separated_input() {
        let content = "a\tb\n1\t2\n3\t4";
        let file = create_test_csv(content).unwrap();
        let table = load_table(file.path().to_str().unwrap(), b'\t', &cols(&["b", "a"])).unwrap();
        assert_eq!(table.column("b").unwrap().to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_error_column_not_found() {
        let file = create_test_csv("a,b\n1,2\n3,4").unwrap();
        match load_table(file.path().to_str().unwrap(), b',', &cols(&["a", "c"])) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "c"),
            other => panic!("Expected ColumnNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_error_missing_values() {
        let file = create_test_csv("a,b\n1,2\n,4\n5,6").unwrap();
        match load_table(file.path().to_str().unwrap(), b',', &cols(&["a", "b"])) {
            Err(DataError::MissingValuesFound(col)) => assert_eq!(col, "a"),
            other => panic!("Expected MissingValuesFound, got {:?}", other),
        }
    }

    #[test]
    fn test_error_wrong_type() {
        let file = create_test_csv("a,b\n1,2\nnot_a_number,4\n5,6").unwrap();
        match load_table(file.path().to_str().unwrap(), b',', &cols(&["a"])) {
            Err(DataError::ColumnWrongType {
                column_name,
                expected_type,
                ..
            }) => {
                assert_eq!(column_name, "a");
                assert_eq!(expected_type, "f64 (numeric)");
            }
            other => panic!("Expected ColumnWrongType, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_rows_uses_one_based_numbers() {
        let table = small_table().drop_rows(&[3]).unwrap();
        assert_eq!(table.nrows(), 3);
        assert_eq!(table.column("Height").unwrap().to_vec(), vec![70.0, 72.0, 68.0]);
        match small_table().drop_rows(&[5]) {
            Err(DataError::OutlierOutOfRange { row, n_rows }) => {
                assert_eq!(row, 5);
                assert_eq!(n_rows, 4);
            }
            other => panic!("Expected OutlierOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_appends_derived_columns_once() {
        let derived = vec![
            DerivedColumn::affine("Wkg", "Weight", 0.45359237),
            DerivedColumn::affine("Hcm", "Height", 2.54),
        ];
        let prepared = prepare(&small_table(), &[3], &derived).unwrap();
        assert_eq!(prepared.names(), &cols(&["Weight", "Height", "Wkg", "Hcm"])[..]);
        assert_abs_diff_eq!(prepared.column("Wkg").unwrap()[0], 150.0 * 0.45359237, epsilon = 1e-12);
        assert_abs_diff_eq!(prepared.column("Hcm").unwrap()[2], 68.0 * 2.54, epsilon = 1e-12);

        match prepared.with_derived(&derived[0]) {
            Err(DataError::DuplicateColumn(name)) => assert_eq!(name, "Wkg"),
            other => panic!("Expected DuplicateColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_split_sizes_are_exact_and_disjoint() {
        let split = split_indices(250, 0.6, 2024).unwrap();
        assert_eq!(split.train.len(), 150);
        assert_eq!(split.test.len(), 100);

        let train: HashSet<usize> = split.train.iter().copied().collect();
        let test: HashSet<usize> = split.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        let union: HashSet<usize> = train.union(&test).copied().collect();
        assert_eq!(union, (0..250).collect::<HashSet<_>>());
    }

    #[test]
    fn test_split_is_reproducible_per_seed() {
        let a = split_indices(100, 0.5, 7).unwrap();
        let b = split_indices(100, 0.5, 7).unwrap();
        let c = split_indices(100, 0.5, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_split_proportions() {
        assert!(matches!(
            split_indices(10, 0.0, 1),
            Err(DataError::InvalidSplitProportion(_))
        ));
        assert!(matches!(
            split_indices(10, 1.5, 1),
            Err(DataError::InvalidSplitProportion(_))
        ));
        assert!(matches!(
            split_indices(3, 0.1, 1),
            Err(DataError::EmptySplit { .. })
        ));
    }
}
