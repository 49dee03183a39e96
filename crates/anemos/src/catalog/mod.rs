//! In-memory metadata for tables, variables and controlled vocabularies.
//!
//! The catalog is seeded once at database creation with the global
//! vocabularies (statistics, variable types, transform definitions and
//! turbine models) and then gains or loses table descriptors as tables are
//! created and removed.

pub mod filter;

use crate::error::{AnemosError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One measured quantity within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMeta {
    /// Code, unique within the table.
    pub code: String,
    /// Physical quantity tag, e.g. `vels`.
    #[serde(rename = "type")]
    pub variable_type: String,
    /// Aggregation kind of the raw stream, e.g. `mean`.
    pub statistic: String,
    /// Sensor height in metres.
    #[serde(default)]
    pub altitude: f64,
    /// Additional descriptor fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl VariableMeta {
    /// Creates a variable descriptor.
    pub fn new(
        code: impl Into<String>,
        variable_type: impl Into<String>,
        statistic: impl Into<String>,
        altitude: f64,
    ) -> Self {
        Self {
            code: code.into(),
            variable_type: variable_type.into(),
            statistic: statistic.into(),
            altitude,
            extra: BTreeMap::new(),
        }
    }

    /// Returns a descriptor field by name, for filtering.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "code" => Some(Value::from(self.code.as_str())),
            "type" => Some(Value::from(self.variable_type.as_str())),
            "statistic" => Some(Value::from(self.statistic.as_str())),
            "altitude" => Some(Value::from(self.altitude)),
            _ => self.extra.get(name).cloned(),
        }
    }
}

/// Descriptor of one station table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Globally unique table code.
    pub code: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Elevation in metres.
    pub elevation: f64,
    /// Variables in stored column order.
    #[serde(default)]
    pub variables: Vec<VariableMeta>,
    /// Additional descriptor fields, e.g. `info`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TableMeta {
    /// Creates a table descriptor without variables.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: f64,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            latitude,
            longitude,
            elevation,
            variables: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Appends a variable.
    pub fn with_variable(mut self, variable: VariableMeta) -> Self {
        self.variables.push(variable);
        self
    }

    /// Sets an additional descriptor field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parses and validates a descriptor from JSON.
    ///
    /// Missing required fields (`code`, `latitude`, `longitude`,
    /// `elevation`) are reported as schema errors.
    pub fn from_value(value: Value) -> Result<Self> {
        let meta: Self =
            serde_json::from_value(value).map_err(|err| AnemosError::Schema(err.to_string()))?;
        meta.validate()?;
        Ok(meta)
    }

    /// Checks the descriptor invariants.
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() {
            return Err(AnemosError::Schema("field `code` is empty".to_string()));
        }
        for (index, variable) in self.variables.iter().enumerate() {
            if self.variables[..index].iter().any(|v| v.code == variable.code) {
                return Err(AnemosError::Schema(format!(
                    "duplicate variable code `{}` in table `{}`",
                    variable.code, self.code
                )));
            }
        }
        Ok(())
    }

    /// Returns a descriptor field by name, for filtering.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "code" => Some(Value::from(self.code.as_str())),
            "name" => Some(Value::from(self.name.as_str())),
            "latitude" => Some(Value::from(self.latitude)),
            "longitude" => Some(Value::from(self.longitude)),
            "elevation" => Some(Value::from(self.elevation)),
            _ => self.extra.get(name).cloned(),
        }
    }

    /// Looks up a nested extra field, e.g. `["info", "location", "meanAirDensity"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.extra.get(*first)?;
        for key in rest {
            current = current.get(*key)?;
        }
        Some(current)
    }

    /// Column index of the variable with `code`.
    pub fn variable_index(&self, code: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.code == code)
    }
}

/// Declaration of a transform-eligible variable type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformDefinition {
    /// Native variable types the transform reads.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Power curve sampled at increasing wind speeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurbineCurve {
    /// Wind speeds (m/s), increasing.
    pub velocity: Vec<f64>,
    /// Power output at each speed.
    pub power: Vec<f64>,
}

/// A wind turbine model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurbineModel {
    /// Air density the curve was measured at (kg/m³).
    pub reference_density: f64,
    /// Rated power, in curve units.
    pub rated_power: f64,
    /// Power curve.
    pub curve: TurbineCurve,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Global vocabularies supplied when a database is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    /// Statistic codes and their descriptions.
    #[serde(default)]
    pub statistics: BTreeMap<String, Value>,
    /// Variable type codes and their descriptions.
    #[serde(default)]
    pub variable_types: BTreeMap<String, Value>,
    /// Transform-eligible variable types keyed by transform id.
    #[serde(default)]
    pub transforms: BTreeMap<String, TransformDefinition>,
    /// Turbine models keyed by model id.
    #[serde(default)]
    pub turbine_models: BTreeMap<String, TurbineModel>,
    /// Additional database-level fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Root descriptor persisted at `<root>/metadata.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CatalogDescriptor {
    #[serde(flatten)]
    pub seed: CatalogSeed,
    #[serde(default)]
    pub tables: Vec<String>,
}

/// Table and vocabulary metadata for a whole database.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    seed: CatalogSeed,
    tables: BTreeMap<String, TableMeta>,
}

impl Catalog {
    /// Creates a catalog with no tables.
    pub fn new(seed: CatalogSeed) -> Self {
        Self {
            seed,
            tables: BTreeMap::new(),
        }
    }

    /// Global vocabularies.
    pub fn seed(&self) -> &CatalogSeed {
        &self.seed
    }

    /// Looks up a table descriptor.
    pub fn table(&self, code: &str) -> Result<&TableMeta> {
        self.tables
            .get(code)
            .ok_or_else(|| AnemosError::table_not_found(code))
    }

    /// Returns true if a table with `code` exists.
    pub fn contains(&self, code: &str) -> bool {
        self.tables.contains_key(code)
    }

    /// All table descriptors ordered by code.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.values()
    }

    /// All table codes in order.
    pub fn table_codes(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Returns true if `variable_type` is routed to a transform.
    pub fn is_transform_type(&self, variable_type: &str) -> bool {
        self.seed.transforms.contains_key(variable_type)
    }

    /// Transform declaration for `id`.
    pub fn transform(&self, id: &str) -> Option<&TransformDefinition> {
        self.seed.transforms.get(id)
    }

    /// Looks up a turbine model.
    pub fn turbine_model(&self, id: &str) -> Result<&TurbineModel> {
        self.seed
            .turbine_models
            .get(id)
            .ok_or_else(|| AnemosError::NotFound {
                kind: "turbine model",
                code: id.to_string(),
            })
    }

    /// Full metadata as JSON: the seed plus every table descriptor.
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(&self.seed)?;
        if let Value::Object(map) = &mut value {
            map.insert("tables".to_string(), serde_json::to_value(&self.tables)?);
        }
        Ok(value)
    }

    pub(crate) fn insert_table(&mut self, meta: TableMeta) {
        self.tables.insert(meta.code.clone(), meta);
    }

    pub(crate) fn remove_table(&mut self, code: &str) -> Option<TableMeta> {
        self.tables.remove(code)
    }

    pub(crate) fn descriptor(&self, tables: Vec<String>) -> CatalogDescriptor {
        CatalogDescriptor {
            seed: self.seed.clone(),
            tables,
        }
    }
}
