use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    String,
    Int,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRule {
    pub source: String,
    #[serde(default, rename = "transform")]
    pub coerce: Option<Coercion>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Output key -> rule. Keys are emitted in sorted order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ExtractionRules(pub BTreeMap<String, ExtractionRule>);

impl ExtractionRules {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Build the context for one trigger. Keys that resolve to nothing and
    /// have no default are left out rather than set to null.
    pub fn apply(&self, payload: &Value) -> Value {
        let mut context = Map::new();
        for (key, rule) in &self.0 {
            let value = match resolve_path(payload, &rule.source) {
                Some(found) => Some(coerce(found, rule.coerce)),
                None => rule.default.clone(),
            };
            if let Some(value) = value {
                context.insert(key.clone(), value);
            }
        }
        Value::Object(context)
    }
}

/// Apply `rules` to `payload`, or hand the payload back untouched when there
/// are none.
pub fn extract_context(payload: &Value, rules: Option<&ExtractionRules>) -> Value {
    match rules {
        Some(rules) => rules.apply(payload),
        None => payload.clone(),
    }
}

/// Walk a dotted path through nested objects. A missing key, a non-object
/// intermediate, or a null leaf all count as unresolved.
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() { None } else { Some(current) }
}

fn coerce(value: &Value, coercion: Option<Coercion>) -> Value {
    match coercion {
        Some(Coercion::String) => Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        Some(Coercion::Int) => Value::from(to_int(value).unwrap_or(0)),
        Some(Coercion::Unknown) | None => value.clone(),
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(*b as i64),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "user": "testuser",
            "message": "Hello, world!",
            "timestamp": 1646092800,
            "metadata": {"channel": "general", "is_bot": false},
            "count": "17",
            "ratio": 2.9,
            "nothing": null
        })
    }

    fn rules(value: Value) -> ExtractionRules {
        ExtractionRules::from_value(&value).unwrap()
    }

    #[test]
    fn no_rules_returns_payload() {
        assert_eq!(extract_context(&payload(), None), payload());
    }

    #[test]
    fn resolves_nested_sources() {
        let r = rules(json!({
            "username": {"source": "user"},
            "text": {"source": "message"},
            "channel": {"source": "metadata.channel"}
        }));
        assert_eq!(
            r.apply(&payload()),
            json!({"username": "testuser", "text": "Hello, world!", "channel": "general"})
        );
    }

    #[test]
    fn transforms_and_defaults() {
        let r = rules(json!({
            "username": {"source": "user", "transform": "string"},
            "timestamp": {"source": "timestamp", "transform": "int"},
            "missing": {"source": "nonexistent", "default": "default value"}
        }));
        assert_eq!(
            r.apply(&payload()),
            json!({"username": "testuser", "timestamp": 1646092800, "missing": "default value"})
        );
    }

    #[test]
    fn unresolvable_without_default_is_omitted() {
        let r = rules(json!({
            "a": {"source": "metadata.channel.deeper"},
            "b": {"source": "nope.nope"},
            "c": {"source": "nothing"}
        }));
        assert_eq!(r.apply(&payload()), json!({}));
    }

    #[test]
    fn int_coercion_failure_yields_zero() {
        let r = rules(json!({
            "bad": {"source": "user", "transform": "int"},
            "parsed": {"source": "count", "transform": "int"},
            "truncated": {"source": "ratio", "transform": "int"},
            "flag": {"source": "metadata.is_bot", "transform": "int"},
            "obj": {"source": "metadata", "transform": "int"}
        }));
        assert_eq!(
            r.apply(&payload()),
            json!({"bad": 0, "parsed": 17, "truncated": 2, "flag": 0, "obj": 0})
        );
    }

    #[test]
    fn string_coercion_is_unconditional() {
        let r = rules(json!({
            "ts": {"source": "timestamp", "transform": "string"},
            "meta": {"source": "metadata", "transform": "string"}
        }));
        let out = r.apply(&payload());
        assert_eq!(out["ts"], json!("1646092800"));
        assert!(out["meta"].as_str().unwrap().contains("general"));
    }

    #[test]
    fn defaults_are_not_coerced() {
        let r = rules(json!({
            "n": {"source": "missing", "transform": "int", "default": "seven"}
        }));
        assert_eq!(r.apply(&payload()), json!({"n": "seven"}));
    }

    #[test]
    fn unknown_transform_passes_value_through() {
        let r = rules(json!({"u": {"source": "user", "transform": "upper"}}));
        assert_eq!(r.apply(&payload()), json!({"u": "testuser"}));
    }
}
