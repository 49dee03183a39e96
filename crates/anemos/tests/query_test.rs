//! End-to-end request tests: JSON request in, JSON answer out.

use alopex_anemos::{
    CatalogSeed, Database, Engine, EngineConfig, Request, Row, SyncMode, TableMeta, VariableMeta,
    MISSING,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn config() -> EngineConfig {
    EngineConfig::default().with_sync_mode(SyncMode::None)
}

fn single(code: &str, variable_type: &str) -> TableMeta {
    TableMeta::new(code, format!("Station {}", code), 40.0, -3.0, 600.0)
        .with_variable(VariableMeta::new("v0", variable_type, "mean", 80.0))
}

fn rows(points: &[(i64, f64)]) -> Vec<Row> {
    points.iter().map(|&(t, v)| Row::new(t, vec![v])).collect()
}

fn ask(db: &Database, request: Value) -> Value {
    let request: Request = serde_json::from_value(request).unwrap();
    db.request(&request).to_json().unwrap()
}

fn database(dir: &TempDir, seed: CatalogSeed) -> Database {
    Database::create(seed, dir.path(), config()).unwrap()
}

#[test]
fn test_histogram_request() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    let points: Vec<(i64, f64)> = [1.0, 2.0, 2.0, 3.0, 4.0]
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as i64 * 60, v))
        .collect();
    db.create_table(single("T1", "vels"), rows(&points)).unwrap();

    let answer = ask(
        &db,
        json!({
            "type": "data",
            "computation": {"name": "histogram", "bins": 2, "min": 1, "max": 4}
        }),
    );
    assert!(answer.get("error").is_none());
    assert_eq!(
        answer["result"][0]["data"],
        json!([
            {"edges": [1.0, 2.5], "value": 3.0},
            {"edges": [2.5, 4.0], "value": 2.0}
        ])
    );
    assert_eq!(answer["result"][0]["metaData"]["tableCode"], json!("T1"));
}

#[test]
fn test_daily_cycle_has_every_hour() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    db.create_table(
        single("T1", "temp"),
        rows(&[(0, 10.0), (6 * 3600, 16.0), (12 * 3600, 22.0)]),
    )
    .unwrap();

    let answer = ask(
        &db,
        json!({
            "type": "data",
            "computation": {"name": "dailyCycle", "statistic": {"name": "mean"}}
        }),
    );
    let cycle = answer["result"][0]["data"].as_array().unwrap();
    assert_eq!(cycle.len(), 24);
    for (hour, entry) in cycle.iter().enumerate() {
        assert_eq!(entry[0], json!(hour));
        match hour {
            0 => assert_eq!(entry[1], json!(10.0)),
            6 => assert_eq!(entry[1], json!(16.0)),
            12 => assert_eq!(entry[1], json!(22.0)),
            _ => assert!(entry[1].is_null(), "hour {} should be missing", hour),
        }
    }
}

#[test]
fn test_hourly_resampling_with_minimum_fraction() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    let points: Vec<(i64, f64)> = (0..12)
        .map(|i| (i * 600, if i == 2 { MISSING } else { i as f64 }))
        .collect();
    db.create_table(single("T1", "vels"), rows(&points)).unwrap();

    let request = |fraction: f64| {
        json!({
            "type": "data",
            "table": {"code": "T1"},
            "resampling": {
                "interval": {"type": "fixed", "code": "H"},
                "statistic": {"name": "mean"},
                "minimumFraction": fraction
            }
        })
    };

    let strict = ask(&db, request(1.0));
    assert_eq!(strict["interval"], json!({"units": 1, "code": "H"}));
    assert_eq!(strict["result"][0]["data"], json!([[0, null], [3600, 8.5]]));
    assert_eq!(strict["result"][0]["metaData"]["firstTimestamp"], json!(0));
    assert_eq!(strict["result"][0]["metaData"]["lastTimestamp"], json!(3600));

    let lenient = ask(&db, request(0.5));
    assert_eq!(lenient["result"][0]["data"], json!([[0, 2.6], [3600, 8.5]]));
}

#[test]
fn test_time_filters() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    let points: Vec<(i64, f64)> = (0..48).map(|h| (h * 3600, h as f64)).collect();
    db.create_table(single("T1", "temp"), rows(&points)).unwrap();

    let answer = ask(
        &db,
        json!({
            "type": "data",
            "time": {"lowerBound": "1970-01-02", "hours": [0, 1]}
        }),
    );
    assert_eq!(answer["result"][0]["data"], json!([[86400, 24.0], [90000, 25.0]]));

    let inverted = ask(
        &db,
        json!({
            "type": "data",
            "time": {"lowerBound": 90000, "upperBound": 3600}
        }),
    );
    assert_eq!(inverted["error"]["kind"], json!("rangeError"));
}

#[test]
fn test_turbine_power_transform() {
    let dir = TempDir::new().unwrap();
    let seed: CatalogSeed = serde_json::from_value(json!({
        "transforms": {"turbinePower": {"variables": ["vels"]}},
        "turbineModels": {
            "T100": {
                "referenceDensity": 1.225,
                "ratedPower": 100.0,
                "curve": {"velocity": [0.0, 5.0, 10.0, 15.0], "power": [0.0, 20.0, 100.0, 100.0]}
            }
        }
    }))
    .unwrap();
    let mut db = database(&dir, seed);
    db.create_table(single("T1", "vels"), rows(&[(0, 7.5), (600, MISSING), (1200, 20.0)]))
        .unwrap();

    let request = |params: Value| {
        json!({
            "type": "data",
            "variable": {"type": "turbinePower"},
            "transform": {"turbinePower": params}
        })
    };

    let answer = ask(&db, request(json!({"turbineModel": "T100", "density": 1.225})));
    let series = &answer["result"][0];
    assert_eq!(series["metaData"]["variableType"], json!("turbinePower"));
    assert_eq!(series["metaData"]["variableAltitude"], json!(80.0));
    assert_eq!(series["data"], json!([[0, 60.0], [600, 0.0], [1200, 100.0]]));
    assert_eq!(answer["result"].as_array().unwrap().len(), 1);

    let unknown = ask(&db, request(json!({"turbineModel": "X"})));
    assert_eq!(unknown["error"]["kind"], json!("notFoundError"));
    assert!(unknown["result"].is_null());
}

#[test]
fn test_metadata_requests() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    db.create_table(single("T2", "vels"), Vec::new()).unwrap();
    db.create_table(
        single("T1", "vels").with_variable(VariableMeta::new("t2", "temp", "mean", 2.0)),
        Vec::new(),
    )
    .unwrap();

    let codes = ask(&db, json!({"type": "metaData", "name": "tableCodes"}));
    assert_eq!(codes["result"], json!(["T1", "T2"]));

    let union = ask(
        &db,
        json!({"type": "metaData", "name": "variableTypeUnion", "tableCodes": ["T1", "T2"]}),
    );
    assert_eq!(union["result"], json!(["temp", "vels"]));

    let intersection = ask(
        &db,
        json!({"type": "metaData", "name": "variableTypeIntersection", "tableCodes": ["T1", "T2"]}),
    );
    assert_eq!(intersection["result"], json!(["vels"]));

    let missing = ask(
        &db,
        json!({"type": "metaData", "name": "tableMetaData", "tableCode": "T9"}),
    );
    assert_eq!(missing["error"]["kind"], json!("notFoundError"));
}

#[test]
fn test_errors_travel_in_the_answer() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::create_database(CatalogSeed::default(), dir.path(), config()).unwrap();
    engine
        .create_table(single("T1", "vels"), rows(&[(0, 1.0), (600, 2.0)]))
        .unwrap();

    let bad_statistic = engine
        .request_json(
            r#"{"type": "data", "resampling": {"interval": {"type": "fixed", "code": "H"}, "statistic": {"name": "mode"}}}"#,
        )
        .to_json()
        .unwrap();
    assert_eq!(bad_statistic["error"]["kind"], json!("invalidRequest"));
    assert!(bad_statistic["result"].is_null());

    let bad_expression = engine
        .request_json(r#"{"type": "data", "computation": {"name": "genericExpression", "expression": "x +"}}"#)
        .to_json()
        .unwrap();
    assert_eq!(bad_expression["error"]["kind"], json!("expressionError"));

    let unparsable = engine.request_json("not json");
    assert_eq!(unparsable.error.unwrap().kind, "invalidRequest");

    let ok = engine
        .request_json(r#"{"type": "data", "computation": {"name": "genericExpression", "expression": "x * 2"}}"#)
        .to_json()
        .unwrap();
    assert_eq!(ok["result"][0]["data"], json!([[0, 2.0], [600, 4.0]]));
}

#[test]
fn test_no_matching_tables_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let db = database(&dir, CatalogSeed::default());
    let answer = ask(&db, json!({"type": "data", "table": {"code": "nowhere"}}));
    assert!(answer.get("error").is_none());
    assert_eq!(answer["result"], json!([]));
    assert!(answer["interval"].is_null());
}

#[test]
fn test_hostile_inputs_answer_with_errors() {
    let dir = TempDir::new().unwrap();
    let mut db = database(&dir, CatalogSeed::default());
    db.create_table(single("T1", "vels"), rows(&[(0, 1.0), (600, 2.0)]))
        .unwrap();

    let expression = |text: String| {
        json!({"type": "data", "computation": {"name": "genericExpression", "expression": text}})
    };
    for text in [format!("{}x", "-".repeat(100_000)), "(".repeat(100_000)] {
        let answer = ask(&db, expression(text));
        assert_eq!(answer["error"]["kind"], json!("expressionError"));
        assert!(answer["result"].is_null());
    }

    let adaptive = |time: Value, points: Value| {
        json!({
            "type": "data",
            "time": time,
            "resampling": {
                "interval": {"type": "adaptive", "seriesLength": points},
                "statistic": {"name": "mean"}
            }
        })
    };
    let cases = [
        (json!({"lowerBound": -9_223_372_036_854_775_807i64}), json!(10), "rangeError"),
        (json!({"upperBound": i64::MAX}), json!(10), "rangeError"),
        (json!({"lowerBound": i64::MIN, "upperBound": i64::MAX}), json!(10), "rangeError"),
        (json!({}), json!(0), "invalidRequest"),
    ];
    for (time, points, kind) in cases {
        let answer = ask(&db, adaptive(time.clone(), points));
        assert_eq!(answer["error"]["kind"], json!(kind), "time {}", time);
        assert!(answer["interval"].is_null());
    }

    let wide = ask(
        &db,
        json!({
            "type": "data",
            "time": {"lowerBound": -8_000_000_000_000i64},
            "resampling": {
                "interval": {"type": "fixed", "code": "H"},
                "statistic": {"name": "mean"}
            }
        }),
    );
    assert_eq!(wide["error"]["kind"], json!("rangeError"));

    let huge = ask(&db, adaptive(json!({}), json!(u64::MAX)));
    assert!(huge.get("error").is_none(), "{}", huge);
    assert_eq!(huge["interval"], json!({"units": 10, "code": "Min"}));
}
