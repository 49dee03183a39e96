//! Field predicates used to select tables and variables.

use crate::catalog::{Catalog, TableMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A predicate on one descriptor field.
///
/// A JSON array is a set-membership test; any other value is an exact match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    /// The field must equal one of the listed values.
    AnyOf(Vec<Value>),
    /// The field must equal this value.
    Exact(Value),
}

impl Predicate {
    /// Tests a field value against the predicate.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::AnyOf(options) => options.iter().any(|option| values_equal(option, value)),
            Self::Exact(expected) => values_equal(expected, value),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Self::AnyOf(options) => options.clone(),
            Self::Exact(value) => vec![value.clone()],
        }
    }
}

/// Field name to predicate; every predicate must hold.
pub type FieldFilter = BTreeMap<String, Predicate>;

/// Returns true if every predicate in `filter` holds for the looked-up fields.
///
/// A field the descriptor does not have never matches.
pub fn matches<F>(filter: &FieldFilter, field: F) -> bool
where
    F: Fn(&str) -> Option<Value>,
{
    filter
        .iter()
        .all(|(name, predicate)| field(name).is_some_and(|value| predicate.matches(&value)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Selects tables matching `filter`; `None` selects every table.
pub fn select_tables<'a>(catalog: &'a Catalog, filter: Option<&FieldFilter>) -> Vec<&'a TableMeta> {
    catalog
        .tables()
        .filter(|table| filter.map_or(true, |filter| matches(filter, |name| table.field(name))))
        .collect()
}

/// Which native variables a request extracts directly.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSelection {
    /// No variable filter: every variable.
    All,
    /// Variables matching the filter.
    Matching(FieldFilter),
    /// Only transform types were requested.
    Nothing,
}

/// A variable filter split into native and transform-eligible parts.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSelection {
    /// Native variables to extract.
    pub native: NativeSelection,
    /// Requested transform type ids, in request order.
    pub transforms: Vec<String>,
    /// The non-`type` predicates, applied to transform input variables.
    pub transform_filter: FieldFilter,
}

impl VariableSelection {
    /// Splits the `type` predicate of `filter` by the catalog's transform vocabulary.
    pub fn split(filter: Option<&FieldFilter>, catalog: &Catalog) -> Self {
        let Some(filter) = filter else {
            return Self {
                native: NativeSelection::All,
                transforms: Vec::new(),
                transform_filter: FieldFilter::new(),
            };
        };

        let mut rest = filter.clone();
        let Some(type_predicate) = rest.remove("type") else {
            return Self {
                native: NativeSelection::Matching(filter.clone()),
                transforms: Vec::new(),
                transform_filter: rest,
            };
        };

        let mut transforms: Vec<String> = Vec::new();
        let mut native_types = Vec::new();
        for value in type_predicate.values() {
            match value.as_str() {
                Some(id) if catalog.is_transform_type(id) => {
                    if !transforms.iter().any(|t| t == id) {
                        transforms.push(id.to_string());
                    }
                }
                _ => native_types.push(value),
            }
        }

        let native = if native_types.is_empty() {
            NativeSelection::Nothing
        } else {
            let mut native_filter = rest.clone();
            native_filter.insert("type".to_string(), Predicate::AnyOf(native_types));
            NativeSelection::Matching(native_filter)
        };
        Self {
            native,
            transforms,
            transform_filter: rest,
        }
    }

    /// Column indices of the native variables selected in `table`.
    pub fn native_indices(&self, table: &TableMeta) -> Vec<usize> {
        match &self.native {
            NativeSelection::All => (0..table.variables.len()).collect(),
            NativeSelection::Nothing => Vec::new(),
            NativeSelection::Matching(filter) => table
                .variables
                .iter()
                .enumerate()
                .filter(|(_, variable)| matches(filter, |name| variable.field(name)))
                .map(|(index, _)| index)
                .collect(),
        }
    }
}
