//! # Value Type System
//!
//! The untyped document-field value carried throughout the pipeline: every
//! field read out of `_source`, every aggregation bucket key, every script
//! context variable is a `Value`.

use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single document field value, or a query/script runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(chrono::DateTime<chrono::Utc>),
    Geo { lat: f64, lon: f64 },
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Geo { lat, lon } => write!(f, "{lat},{lon}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(_) => write!(f, "<object>"),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form used as a term-query value / bucket sub-query key.
    pub fn to_term_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_canonical_float(*f),
            other => other.to_string(),
        }
    }

    /// Lexicographic ordering over values of possibly-different variants, used by
    /// composite aggregation key comparison. Numbers compare numerically against
    /// each other; everything else falls back to string comparison of [`to_term_string`].
    pub fn cmp_canonical(&self, other: &Value) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) if !matches!(self, Value::String(_)) && !matches!(other, Value::String(_)) => {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            _ => self.to_term_string().cmp(&other.to_term_string()),
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => {
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                    Value::DateTime(dt.with_timezone(&chrono::Utc))
                } else {
                    Value::String(s.clone())
                }
            }
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                if map.len() == 2 && map.contains_key("lat") && map.contains_key("lon") {
                    if let (Some(lat), Some(lon)) = (
                        map.get("lat").and_then(Json::as_f64),
                        map.get("lon").and_then(Json::as_f64),
                    ) {
                        return Value::Geo { lat, lon };
                    }
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::DateTime(dt) => Json::String(dt.to_rfc3339()),
            Value::Geo { lat, lon } => serde_json::json!({"lat": lat, "lon": lon}),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

fn format_canonical_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// A document: a map from field name to [`Value`], plus a stored `_source`
/// JSON blob when the original write payload is being round-tripped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub fields: BTreeMap<String, Value>,
    pub source: Option<Json>,
}

/// A fixed set of reserved internal field names dropped from `_source` view
/// and from `fields` projections.
const RESERVED_FIELDS: &[&str] = &["_id", "_index", "_version", "_seq_no", "_primary_term", "_type"];

impl Document {
    pub fn from_source(index: &str, id: &str, source: Json) -> Document {
        let mut fields = BTreeMap::new();
        if let Json::Object(map) = &source {
            for (k, v) in map {
                let key = unwrap_fields_prefix(k);
                if RESERVED_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                fields.insert(key, Value::from_json(v));
            }
        }
        fields.insert("_id".to_string(), Value::String(id.to_string()));
        fields.insert("_index".to_string(), Value::String(index.to_string()));
        Document {
            fields,
            source: Some(source),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Materialize `_source`: the stored blob when present, else the field map.
    pub fn source_json(&self) -> Json {
        self.source.clone().unwrap_or_else(|| {
            Json::Object(
                self.fields
                    .iter()
                    .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            )
        })
    }

    /// Apply an include-list source filter. Exclude-lists are a documented
    /// known limitation (spec §4.4) and are ignored.
    pub fn filtered_source(&self, includes: &[String]) -> Json {
        let full = self.source_json();
        if includes.is_empty() {
            return full;
        }
        if let Json::Object(map) = full {
            let filtered: serde_json::Map<String, Json> = map
                .into_iter()
                .filter(|(k, _)| includes.iter().any(|inc| matches_include(inc, k)))
                .collect();
            Json::Object(filtered)
        } else {
            full
        }
    }
}

fn matches_include(pattern: &str, field: &str) -> bool {
    if pattern == field {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return field.starts_with(prefix);
    }
    false
}

fn unwrap_fields_prefix(key: &str) -> String {
    key.strip_prefix("_fields.").map(str::to_string).unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_roundtrips_scalars() {
        assert_eq!(Value::from_json(&serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(&serde_json::json!(5.5)), Value::Float(5.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::String("x".into()));
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Bool(true));
    }

    #[test]
    fn canonical_float_formats_integral_values_without_decimal() {
        assert_eq!(format_canonical_float(5.0), "5");
        assert_eq!(format_canonical_float(5.5), "5.5");
    }

    #[test]
    fn unwraps_fields_prefix_and_drops_reserved() {
        let doc = Document::from_source(
            "products",
            "1",
            serde_json::json!({"_fields.name": "widget", "_version": 3, "price": 9.99}),
        );
        assert_eq!(doc.get("name"), Some(&Value::String("widget".into())));
        assert!(doc.get("_version").is_none());
    }

    #[test]
    fn filtered_source_keeps_only_matching_includes() {
        let doc = Document::from_source(
            "products",
            "1",
            serde_json::json!({"name": "widget", "price": 9.99, "tags": ["a"]}),
        );
        let filtered = doc.filtered_source(&["name".to_string()]);
        assert_eq!(filtered, serde_json::json!({"name": "widget"}));
    }

    #[test]
    fn filtered_source_supports_wildcard_prefix() {
        let doc = Document::from_source(
            "products",
            "1",
            serde_json::json!({"meta.a": 1, "meta.b": 2, "other": 3}),
        );
        let filtered = doc.filtered_source(&["meta.*".to_string()]);
        assert_eq!(filtered, serde_json::json!({"meta.a": 1, "meta.b": 2}));
    }
}
