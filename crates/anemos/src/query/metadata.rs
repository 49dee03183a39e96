//! Catalog inspection requests.

use crate::catalog::{Catalog, TableMeta};
use crate::error::{AnemosError, Result};
use crate::query::request::MetaDataQuery;
use serde_json::Value;
use std::collections::BTreeSet;

/// Answers a metadata request from the catalog.
pub fn answer(catalog: &Catalog, query: &MetaDataQuery) -> Result<Value> {
    let value = match query {
        MetaDataQuery::AllMetaData => catalog.to_value()?,
        MetaDataQuery::TableMetaData { table_code } => {
            serde_json::to_value(catalog.table(table_code)?)?
        }
        MetaDataQuery::TableCodes => serde_json::to_value(catalog.table_codes())?,
        MetaDataQuery::VariableTypeUnion { table_codes } => {
            serde_json::to_value(variable_types(catalog, table_codes, Combine::Union)?)?
        }
        MetaDataQuery::VariableTypeIntersection { table_codes } => {
            serde_json::to_value(variable_types(catalog, table_codes, Combine::Intersection)?)?
        }
        MetaDataQuery::VariableAltitudeUnion {
            table_codes,
            variable_type,
            variable_statistic,
        } => serde_json::to_value(altitudes(
            catalog,
            table_codes,
            variable_type,
            variable_statistic,
            Combine::Union,
        )?)?,
        MetaDataQuery::VariableAltitudeIntersection {
            table_codes,
            variable_type,
            variable_statistic,
        } => serde_json::to_value(altitudes(
            catalog,
            table_codes,
            variable_type,
            variable_statistic,
            Combine::Intersection,
        )?)?,
    };
    Ok(value)
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    Union,
    Intersection,
}

fn tables<'a>(catalog: &'a Catalog, codes: &[String]) -> Result<Vec<&'a TableMeta>> {
    if codes.is_empty() {
        return Err(AnemosError::InvalidRequest(
            "tableCodes must not be empty".to_string(),
        ));
    }
    codes.iter().map(|code| catalog.table(code)).collect()
}

fn combine<T: Ord + Clone>(sets: Vec<BTreeSet<T>>, how: Combine) -> BTreeSet<T> {
    let mut sets = sets.into_iter();
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    sets.fold(first, |acc, set| match how {
        Combine::Union => acc.union(&set).cloned().collect(),
        Combine::Intersection => acc.intersection(&set).cloned().collect(),
    })
}

fn variable_types(catalog: &Catalog, codes: &[String], how: Combine) -> Result<Vec<String>> {
    let sets = tables(catalog, codes)?
        .into_iter()
        .map(|table| {
            table
                .variables
                .iter()
                .map(|variable| variable.variable_type.clone())
                .collect::<BTreeSet<_>>()
        })
        .collect();
    Ok(combine(sets, how).into_iter().collect())
}

/// Altitudes are compared by bit pattern so they can live in ordered sets.
fn altitudes(
    catalog: &Catalog,
    codes: &[String],
    variable_type: &str,
    statistic: &str,
    how: Combine,
) -> Result<Vec<f64>> {
    let sets = tables(catalog, codes)?
        .into_iter()
        .map(|table| {
            table
                .variables
                .iter()
                .filter(|v| v.variable_type == variable_type && v.statistic == statistic)
                .map(|v| v.altitude.to_bits())
                .collect::<BTreeSet<_>>()
        })
        .collect();
    let mut altitudes: Vec<f64> = combine(sets, how).into_iter().map(f64::from_bits).collect();
    altitudes.sort_by(f64::total_cmp);
    Ok(altitudes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSeed, VariableMeta};
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new(CatalogSeed::default());
        catalog.insert_table(
            TableMeta::new("T2", "North", 1.0, 2.0, 100.0)
                .with_variable(VariableMeta::new("a", "vels", "mean", 80.0))
                .with_variable(VariableMeta::new("b", "vels", "mean", 40.0))
                .with_variable(VariableMeta::new("c", "temp", "mean", 2.0)),
        );
        catalog.insert_table(
            TableMeta::new("T1", "South", 3.0, 4.0, 10.0)
                .with_variable(VariableMeta::new("a", "vels", "mean", 40.0))
                .with_variable(VariableMeta::new("b", "dirv", "mean", 40.0)),
        );
        catalog
    }

    fn ask(query: MetaDataQuery) -> Value {
        answer(&catalog(), &query).unwrap()
    }

    #[test]
    fn test_table_codes_sorted() {
        assert_eq!(ask(MetaDataQuery::TableCodes), json!(["T1", "T2"]));
    }

    #[test]
    fn test_variable_type_sets() {
        let codes = vec!["T1".to_string(), "T2".to_string()];
        assert_eq!(
            ask(MetaDataQuery::VariableTypeUnion {
                table_codes: codes.clone()
            }),
            json!(["dirv", "temp", "vels"])
        );
        assert_eq!(
            ask(MetaDataQuery::VariableTypeIntersection { table_codes: codes }),
            json!(["vels"])
        );
    }

    #[test]
    fn test_altitude_sets() {
        let codes = vec!["T1".to_string(), "T2".to_string()];
        let union = MetaDataQuery::VariableAltitudeUnion {
            table_codes: codes.clone(),
            variable_type: "vels".to_string(),
            variable_statistic: "mean".to_string(),
        };
        assert_eq!(ask(union), json!([40.0, 80.0]));
        let intersection = MetaDataQuery::VariableAltitudeIntersection {
            table_codes: codes,
            variable_type: "vels".to_string(),
            variable_statistic: "mean".to_string(),
        };
        assert_eq!(ask(intersection), json!([40.0]));
    }

    #[test]
    fn test_unknown_table() {
        let err = answer(
            &catalog(),
            &MetaDataQuery::TableMetaData {
                table_code: "T9".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "notFoundError");
    }

    #[test]
    fn test_table_metadata() {
        let value = ask(MetaDataQuery::TableMetaData {
            table_code: "T1".to_string(),
        });
        assert_eq!(value["name"], json!("South"));
        assert_eq!(value["variables"][1]["type"], json!("dirv"));
    }
}
