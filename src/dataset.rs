//! Tabular numeric datasets: records as rows, named fields as columns.
//!
//! Fields are either regular (transformed) or special (role-tagged, passed
//! through unchanged). Missing values are `f64::NAN`; nominal fields hold
//! category indices.

use std::collections::HashSet;

use ndarray::{concatenate, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Numeric,
    /// Category indices; never valid as a regular field of a fit.
    Nominal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    Regular,
    /// A special role such as `"id"` or `"label"`.
    Special(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub role: FieldRole,
    pub value_type: ValueType,
}

impl Field {
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Regular,
            value_type: ValueType::Numeric,
        }
    }

    pub fn special(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Special(role.into()),
            value_type: ValueType::Numeric,
        }
    }

    pub fn nominal(mut self) -> Self {
        self.value_type = ValueType::Nominal;
        self
    }

    pub fn is_regular(&self) -> bool {
        self.role == FieldRole::Regular
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    fields: Vec<Field>,
    /// Shape: (n_records, n_fields)
    values: Array2<f64>,
}

impl Dataset {
    /// Builds a dataset, checking that every column has a field and that
    /// field names are unique.
    pub fn new(fields: Vec<Field>, values: Array2<f64>) -> Result<Self> {
        if fields.len() != values.ncols() {
            return Err(DecompositionError::precondition(format!(
                "{} fields declared but value matrix has {} columns",
                fields.len(),
                values.ncols()
            )));
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DecompositionError::precondition(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields, values })
    }

    /// All-regular numeric dataset from a matrix and its column names.
    pub fn from_numeric<S: AsRef<str>>(names: &[S], values: Array2<f64>) -> Result<Self> {
        let fields = names.iter().map(|n| Field::regular(n.as_ref())).collect();
        Self::new(fields, values)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_records(&self) -> usize {
        self.values.nrows()
    }

    pub fn records(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> {
        self.values.rows().into_iter()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.field_index(name).map(|j| self.values.column(j))
    }

    pub fn value(&self, record: usize, name: &str) -> Option<f64> {
        let j = self.field_index(name)?;
        self.values.get((record, j)).copied()
    }

    pub fn regular_field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_regular())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Regular values prepared for fitting: requires at least one record and
    /// one regular field, numeric regular fields only, and no missing values.
    ///
    /// Returns the regular field names with their values, shape
    /// (n_records, n_regular).
    pub fn training_matrix(&self) -> Result<(Vec<String>, Array2<f64>)> {
        let names = self.regular_field_names();
        if names.is_empty() {
            return Err(DecompositionError::precondition("dataset has no regular fields"));
        }
        if self.n_records() == 0 {
            return Err(DecompositionError::precondition("dataset has no records"));
        }
        let matrix = self.select_checked(&names)?;
        Ok((names, matrix))
    }

    /// Regular values laid out in the order of `expected` (the fields a model
    /// was trained on). A different regular field count or an unknown field
    /// is a shape mismatch.
    pub fn matrix_for(&self, expected: &[String]) -> Result<Array2<f64>> {
        let present = self.regular_field_names();
        if present.len() != expected.len() {
            return Err(DecompositionError::ShapeMismatch {
                expected: expected.len(),
                found: present.len(),
                detail: String::new(),
            });
        }
        let present: HashSet<&str> = present.iter().map(String::as_str).collect();
        if let Some(missing) = expected.iter().find(|name| !present.contains(name.as_str())) {
            return Err(DecompositionError::ShapeMismatch {
                expected: expected.len(),
                found: present.len(),
                detail: format!("; regular field '{}' is missing", missing),
            });
        }
        self.select_checked(expected)
    }

    fn select_checked(&self, names: &[String]) -> Result<Array2<f64>> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let j = self
                .field_index(name)
                .ok_or_else(|| DecompositionError::precondition(format!("unknown field '{}'", name)))?;
            if self.fields[j].value_type != ValueType::Numeric {
                return Err(DecompositionError::precondition(format!(
                    "regular field '{}' is not numeric",
                    name
                )));
            }
            if self.values.column(j).iter().any(|v| v.is_nan()) {
                return Err(DecompositionError::precondition(format!(
                    "regular field '{}' contains missing values",
                    name
                )));
            }
            indices.push(j);
        }
        Ok(self.values.select(Axis(1), &indices))
    }

    /// Output dataset: special fields always kept, original regular fields
    /// kept only if `keep_original`, then one numeric regular field per
    /// column of `generated`, named `{prefix}_{i}` from 1.
    pub fn with_generated_fields(&self, prefix: &str, generated: Array2<f64>, keep_original: bool) -> Result<Dataset> {
        if generated.nrows() != self.n_records() {
            return Err(DecompositionError::precondition(format!(
                "generated values have {} rows for {} records",
                generated.nrows(),
                self.n_records()
            )));
        }
        let kept: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| keep_original || !f.is_regular())
            .map(|(j, _)| j)
            .collect();
        let mut fields: Vec<Field> = kept.iter().map(|&j| self.fields[j].clone()).collect();
        fields.extend((1..=generated.ncols()).map(|i| Field::regular(generated_field_name(prefix, i))));
        let kept_values = self.values.select(Axis(1), &kept);
        let values = concatenate(Axis(1), &[kept_values.view(), generated.view()])
            .map_err(|e| DecompositionError::precondition(format!("cannot assemble output: {}", e)))?;
        Dataset::new(fields, values)
    }
}

/// `pc_1`, `ic_2`, … (1-indexed).
pub fn generated_field_name(prefix: &str, index: usize) -> String {
    format!("{}_{}", prefix, index)
}
