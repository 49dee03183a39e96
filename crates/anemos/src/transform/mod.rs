//! Derived variable types computed from native variables.
//!
//! # Architecture
//!
//! The catalog declares which variable types are transforms and which native
//! types each one reads. A [`TransformRegistry`] maps those ids to
//! implementations of [`Transform`]:
//!
//! ```text
//! request type "turbinePower"
//!   → catalog.transforms["turbinePower"].variables = ["vels"]
//!   → per table: native variables grouped by (altitude, statistic)
//!   → per complete group: registry["turbinePower"].apply(..) → Series
//! ```
//!
//! Groups missing a required native type are skipped. Adding a transform
//! means registering another implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = TransformRegistry::with_defaults();
//! registry.register(Box::new(MyTransform));
//! let derived = registry.evaluate(&catalog, &cache, &tables, &selection, params)?;
//! ```

pub mod turbine;

pub use turbine::TurbinePower;

use crate::cache::TableCache;
use crate::catalog::filter::{matches, FieldFilter, VariableSelection};
use crate::catalog::{Catalog, TableMeta};
use crate::error::{AnemosError, Result};
use crate::series::{Series, SeriesMeta};
use crate::storage::frame::TableFrame;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Native variables of one table sharing altitude and statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableGroup {
    /// Shared altitude.
    pub altitude: f64,
    /// Shared statistic.
    pub statistic: String,
    /// Column index per variable type; the first variable of a type wins.
    pub columns: BTreeMap<String, usize>,
}

impl VariableGroup {
    /// Groups the variables of `table` whose type is in `types` and that pass `filter`.
    ///
    /// Groups are returned in order of first appearance.
    pub fn collect(table: &TableMeta, types: &[String], filter: &FieldFilter) -> Vec<Self> {
        let mut groups: Vec<Self> = Vec::new();
        for (index, variable) in table.variables.iter().enumerate() {
            if !types.contains(&variable.variable_type)
                || !matches(filter, |name| variable.field(name))
            {
                continue;
            }
            let position = groups.iter().position(|group| {
                group.altitude.to_bits() == variable.altitude.to_bits()
                    && group.statistic == variable.statistic
            });
            let group = match position {
                Some(position) => &mut groups[position],
                None => {
                    groups.push(Self {
                        altitude: variable.altitude,
                        statistic: variable.statistic.clone(),
                        columns: BTreeMap::new(),
                    });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };
            group
                .columns
                .entry(variable.variable_type.clone())
                .or_insert(index);
        }
        groups
    }

    /// Returns true if the group has every type in `types`.
    pub fn is_complete(&self, types: &[String]) -> bool {
        types.iter().all(|t| self.columns.contains_key(t))
    }
}

/// Everything a transform may read for one variable group.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    /// The catalog, for vocabularies such as turbine models.
    pub catalog: &'a Catalog,
    /// The table being transformed.
    pub table: &'a TableMeta,
    /// The table's cached rows.
    pub frame: &'a TableFrame,
    /// The variable group.
    pub group: &'a VariableGroup,
}

impl<'a> TransformInput<'a> {
    /// The group's column for `variable_type`.
    pub fn column(&self, variable_type: &str) -> Result<&'a [f64]> {
        self.group
            .columns
            .get(variable_type)
            .and_then(|&index| self.frame.column(index))
            .map(|column| &column[..])
            .ok_or_else(|| {
                AnemosError::Transform(format!(
                    "table `{}` has no `{}` variable at altitude {} ({})",
                    self.table.code, variable_type, self.group.altitude, self.group.statistic
                ))
            })
    }
}

/// A derived variable type.
pub trait Transform: Send + Sync {
    /// Transform id, matching a key of the catalog's transform vocabulary.
    fn id(&self) -> &str;

    /// Computes one value per row of `input.frame`.
    fn apply(&self, input: &TransformInput<'_>, params: Option<&Value>) -> Result<Vec<f64>>;
}

/// Transform implementations keyed by id.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn Transform>>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.transforms.keys().collect();
        ids.sort();
        f.debug_struct("TransformRegistry").field("ids", &ids).finish()
    }
}

impl TransformRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in transforms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TurbinePower));
        registry
    }

    /// Adds or replaces an implementation.
    pub fn register(&mut self, transform: Box<dyn Transform>) {
        self.transforms.insert(transform.id().to_string(), transform);
    }

    /// Returns true if `id` has an implementation.
    pub fn contains(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    /// Evaluates every requested transform over `tables`.
    ///
    /// `params` holds per-transform parameters keyed by transform id.
    pub fn evaluate(
        &self,
        catalog: &Catalog,
        cache: &TableCache,
        tables: &[&TableMeta],
        selection: &VariableSelection,
        params: Option<&Map<String, Value>>,
    ) -> Result<Vec<Series>> {
        let mut derived = Vec::new();
        for id in &selection.transforms {
            let definition = catalog.transform(id).ok_or_else(|| AnemosError::NotFound {
                kind: "transform",
                code: id.clone(),
            })?;
            let transform = self.transforms.get(id).ok_or_else(|| {
                AnemosError::Transform(format!("no implementation registered for `{}`", id))
            })?;
            let params = params.and_then(|params| params.get(id));

            for table in tables {
                let frame = cache.frame(&table.code)?;
                if frame.is_empty() {
                    continue;
                }
                let groups =
                    VariableGroup::collect(table, &definition.variables, &selection.transform_filter);
                for group in groups.iter().filter(|g| g.is_complete(&definition.variables)) {
                    let input = TransformInput {
                        catalog,
                        table,
                        frame,
                        group,
                    };
                    let values = transform.apply(&input, params)?;
                    if values.len() != frame.len() {
                        return Err(AnemosError::Transform(format!(
                            "`{}` produced {} values for {} rows",
                            id,
                            values.len(),
                            frame.len()
                        )));
                    }
                    let meta = SeriesMeta {
                        table_code: table.code.clone(),
                        table_name: table.name.clone(),
                        variable_type: id.clone(),
                        variable_statistic: group.statistic.clone(),
                        variable_altitude: group.altitude,
                        first_timestamp: None,
                        last_timestamp: None,
                    };
                    derived.push(Series::from_shared(
                        meta,
                        frame.timestamps().clone(),
                        values.into(),
                    ));
                }
            }
        }
        Ok(derived)
    }
}
