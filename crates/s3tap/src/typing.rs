//! Column type inference and value coercion
//!
//! Every sampled value classifies as the narrowest datatype it parses as;
//! a column's type is the widest classification seen across the sample,
//! along the total order boolean < integer < number < date-time < string.
//! Empty strings never constrain a column. Inference is a bounded-sample
//! heuristic; coercion at sync time tolerates values that fall outside the
//! inferred type by passing the raw string through.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use s3tap_common::{Result, TapError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::config::TableSpec;

/// Column datatype lattice.
///
/// Variant order is the widening order; `Ord` gives the least upper bound
/// of any two types via `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Datatype {
    Boolean,
    Integer,
    Number,
    DateTime,
    String,
}

impl Datatype {
    /// JSON-schema type name
    pub fn json_type(self) -> &'static str {
        match self {
            Datatype::Boolean => "boolean",
            Datatype::Integer => "integer",
            Datatype::Number => "number",
            Datatype::DateTime | Datatype::String => "string",
        }
    }
}

/// Narrowest datatype a raw value parses as.
pub fn classify(raw: &str) -> Datatype {
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
        Datatype::Boolean
    } else if raw.parse::<i64>().is_ok() {
        Datatype::Integer
    } else if raw.parse::<f64>().is_ok() {
        Datatype::Number
    } else if parse_datetime(raw).is_some() {
        Datatype::DateTime
    } else {
        Datatype::String
    }
}

/// Parse the date-time shapes the tap accepts.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight));
    }

    None
}

/// One column of an inferred schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub datatype: Datatype,
    /// Key-property columns are required/non-null
    pub required: bool,
}

/// Column types for one stream, in first-seen column order.
///
/// Built once during discovery and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredSchema {
    columns: Vec<ColumnSchema>,
}

impl InferredSchema {
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Render as a JSON-schema object document.
    ///
    /// Every column is nullable; date-time columns carry the `date-time`
    /// format; key properties are listed under `required`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for column in &self.columns {
            let mut shape = Map::new();
            shape.insert(
                "type".to_string(),
                json!(["null", column.datatype.json_type()]),
            );
            if column.datatype == Datatype::DateTime {
                shape.insert("format".to_string(), json!("date-time"));
            }
            properties.insert(column.name.clone(), Value::Object(shape));
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));

        let required: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.name.as_str())
            .collect();
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }

        Value::Object(schema)
    }

    /// Rebuild the typed schema from a catalog's JSON-schema document.
    ///
    /// Property order in the document is the discovered column order.
    pub fn from_json_schema(schema: &Value, key_properties: &[String]) -> Result<Self> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                TapError::Config("catalog schema has no 'properties' object".to_string())
            })?;

        let mut columns = Vec::with_capacity(properties.len());
        for (name, shape) in properties {
            let types = shape.get("type").ok_or_else(|| {
                TapError::Config(format!("catalog column '{}' has no type", name))
            })?;

            let type_name = match types {
                Value::String(single) => single.as_str(),
                Value::Array(options) => options
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|t| *t != "null")
                    .ok_or_else(|| {
                        TapError::Config(format!("catalog column '{}' is only null", name))
                    })?,
                _ => {
                    return Err(TapError::Config(format!(
                        "catalog column '{}' has malformed type",
                        name
                    )))
                },
            };

            let is_datetime = shape.get("format").and_then(Value::as_str) == Some("date-time");
            let datatype = match (type_name, is_datetime) {
                ("boolean", _) => Datatype::Boolean,
                ("integer", _) => Datatype::Integer,
                ("number", _) => Datatype::Number,
                ("string", true) => Datatype::DateTime,
                ("string", false) => Datatype::String,
                (other, _) => {
                    return Err(TapError::Config(format!(
                        "catalog column '{}' has unsupported type '{}'",
                        name, other
                    )))
                },
            };

            columns.push(ColumnSchema {
                name: name.clone(),
                datatype,
                required: key_properties.iter().any(|k| k == name),
            });
        }

        Ok(Self { columns })
    }
}

/// Sampled rows from one object
#[derive(Debug, Clone)]
pub struct Sample {
    /// Header columns, in file order
    pub columns: Vec<String>,
    /// Raw row values, aligned to `columns`
    pub rows: Vec<Vec<String>>,
}

/// Infer a stream schema from bounded samples across objects.
///
/// Column order is first-seen order across the samples. Date-override
/// columns skip inference entirely; key properties and date overrides are
/// always present even when absent from every sampled header.
pub fn infer_schema(spec: &TableSpec, samples: &[Sample]) -> InferredSchema {
    let mut order: Vec<String> = Vec::new();
    let mut widest: HashMap<String, Datatype> = HashMap::new();

    for sample in samples {
        for column in &sample.columns {
            if !order.contains(column) {
                order.push(column.clone());
            }
        }

        for row in &sample.rows {
            for (column, value) in sample.columns.iter().zip(row) {
                if value.is_empty() {
                    continue;
                }
                let classified = classify(value);
                widest
                    .entry(column.clone())
                    .and_modify(|current| *current = (*current).max(classified))
                    .or_insert(classified);
            }
        }
    }

    for declared in spec.key_properties.iter().chain(&spec.date_overrides) {
        if !order.contains(declared) {
            order.push(declared.clone());
        }
    }

    let columns = order
        .into_iter()
        .map(|name| {
            let datatype = if spec.date_overrides.contains(&name) {
                Datatype::DateTime
            } else {
                widest.get(&name).copied().unwrap_or(Datatype::String)
            };
            let required = spec.key_properties.contains(&name);
            ColumnSchema {
                name,
                datatype,
                required,
            }
        })
        .collect();

    InferredSchema { columns }
}

/// Coerce a raw cell to its column type.
///
/// Returns the value plus a flag marking that the raw string was passed
/// through because it did not fit the inferred type. Empty cells are null.
pub fn coerce(raw: &str, datatype: Datatype) -> (Value, bool) {
    if raw.is_empty() {
        return (Value::Null, false);
    }

    match datatype {
        Datatype::Boolean => {
            if raw.eq_ignore_ascii_case("true") {
                (Value::Bool(true), false)
            } else if raw.eq_ignore_ascii_case("false") {
                (Value::Bool(false), false)
            } else {
                (Value::String(raw.to_string()), true)
            }
        },
        Datatype::Integer => match raw.parse::<i64>() {
            Ok(parsed) => (Value::from(parsed), false),
            Err(_) => (Value::String(raw.to_string()), true),
        },
        Datatype::Number => match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Some(parsed) => (Value::Number(parsed), false),
            None => (Value::String(raw.to_string()), true),
        },
        Datatype::DateTime => match parse_datetime(raw) {
            Some(parsed) => (Value::String(parsed.to_rfc3339()), false),
            None => (Value::String(raw.to_string()), true),
        },
        Datatype::String => (Value::String(raw.to_string()), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(key_properties: &[&str], date_overrides: &[&str]) -> TableSpec {
        TableSpec {
            table_name: "sales".to_string(),
            search_prefix: String::new(),
            search_pattern: "*.csv".to_string(),
            key_properties: key_properties.iter().map(|s| s.to_string()).collect(),
            date_overrides: date_overrides.iter().map(|s| s.to_string()).collect(),
            delimiter: ',',
        }
    }

    fn sample(columns: &[&str], rows: &[&[&str]]) -> Sample {
        Sample {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify("true"), Datatype::Boolean);
        assert_eq!(classify("False"), Datatype::Boolean);
        assert_eq!(classify("42"), Datatype::Integer);
        assert_eq!(classify("-7"), Datatype::Integer);
        assert_eq!(classify("10.5"), Datatype::Number);
        assert_eq!(classify("1e3"), Datatype::Number);
        assert_eq!(classify("2023-01-01"), Datatype::DateTime);
        assert_eq!(classify("2023-01-01T12:30:00Z"), Datatype::DateTime);
        assert_eq!(classify("hello"), Datatype::String);
    }

    #[test]
    fn test_widening_across_disagreeing_values() {
        let samples = [sample(&["v"], &[&["1"], &["2.5"], &["3"]])];
        let schema = infer_schema(&spec(&[], &[]), &samples);
        assert_eq!(schema.column("v").unwrap().datatype, Datatype::Number);

        let samples = [sample(&["v"], &[&["1"], &["oops"]])];
        let schema = infer_schema(&spec(&[], &[]), &samples);
        assert_eq!(schema.column("v").unwrap().datatype, Datatype::String);
    }

    #[test]
    fn test_empty_values_do_not_constrain() {
        let samples = [sample(&["v"], &[&[""], &["3"], &[""]])];
        let schema = infer_schema(&spec(&[], &[]), &samples);
        assert_eq!(schema.column("v").unwrap().datatype, Datatype::Integer);
    }

    #[test]
    fn test_header_only_column_defaults_to_string() {
        let samples = [sample(&["v"], &[])];
        let schema = infer_schema(&spec(&[], &[]), &samples);
        assert_eq!(schema.column("v").unwrap().datatype, Datatype::String);
    }

    #[test]
    fn test_date_override_beats_inference() {
        // Declared contract, not a discovered one: ids are all integers but
        // the override still wins.
        let samples = [sample(&["id"], &[&["1"], &["2"]])];
        let schema = infer_schema(&spec(&[], &["id"]), &samples);
        assert_eq!(schema.column("id").unwrap().datatype, Datatype::DateTime);
    }

    #[test]
    fn test_declared_columns_always_present() {
        let samples = [sample(&["a"], &[&["1"]])];
        let schema = infer_schema(&spec(&["pk"], &["seen_at"]), &samples);

        let names: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "pk", "seen_at"]);
        assert!(schema.column("pk").unwrap().required);
        assert_eq!(schema.column("pk").unwrap().datatype, Datatype::String);
        assert_eq!(
            schema.column("seen_at").unwrap().datatype,
            Datatype::DateTime
        );
    }

    #[test]
    fn test_column_order_is_first_seen_across_files() {
        let samples = [
            sample(&["a", "b"], &[&["1", "2"]]),
            sample(&["c", "a"], &[&["3", "4"]]),
        ];
        let schema = infer_schema(&spec(&[], &[]), &samples);
        let names: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_json_schema_round_trip() {
        let samples = [sample(
            &["id", "amount", "date"],
            &[&["1", "10.5", "2023-01-01"]],
        )];
        let spec = spec(&["id"], &[]);
        let schema = infer_schema(&spec, &samples);
        let document = schema.to_json_schema();

        assert_eq!(
            document["properties"]["amount"]["type"],
            json!(["null", "number"])
        );
        assert_eq!(document["properties"]["date"]["format"], json!("date-time"));
        assert_eq!(document["required"], json!(["id"]));

        let rebuilt =
            InferredSchema::from_json_schema(&document, &spec.key_properties).unwrap();
        assert_eq!(rebuilt, schema);
    }

    #[test]
    fn test_coerce_fallback_passes_raw_through() {
        let (value, fell_back) = coerce("not-a-number", Datatype::Integer);
        assert_eq!(value, Value::String("not-a-number".to_string()));
        assert!(fell_back);

        let (value, fell_back) = coerce("12", Datatype::Integer);
        assert_eq!(value, json!(12));
        assert!(!fell_back);

        let (value, fell_back) = coerce("", Datatype::Integer);
        assert_eq!(value, Value::Null);
        assert!(!fell_back);
    }

    #[test]
    fn test_coerce_datetime_normalizes_to_rfc3339() {
        let (value, fell_back) = coerce("2023-01-01", Datatype::DateTime);
        assert_eq!(value, Value::String("2023-01-01T00:00:00+00:00".to_string()));
        assert!(!fell_back);
    }
}
