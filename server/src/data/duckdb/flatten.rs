//! OTLP value flattening
//!
//! Converts OTLP common values (AnyValue, KeyValue lists) into
//! storage-friendly scalars and attribute maps. Complex values are
//! canonicalized to JSON text with native-typed elements.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue, KeyValueList};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// Ordered, key-unique map of attribute text. A repeated key replaces the
/// earlier value without disturbing insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrMap(Vec<(String, String)>);

impl AttrMap {
    pub fn insert(&mut self, key: String, value: String) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// JSON-object rendering used by the VARCHAR attribute columns
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("string map is always valid JSON")
    }
}

impl Serialize for AttrMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Flatten an OTLP KeyValue slice into an attribute map. Empty keys are
/// skipped; values are stringified via [`any_value_to_string`].
pub fn flatten_attributes(kvs: &[KeyValue]) -> AttrMap {
    let mut map = AttrMap::default();
    for kv in kvs {
        if kv.key.is_empty() {
            continue;
        }
        map.insert(kv.key.clone(), any_value_to_string(kv.value.as_ref()));
    }
    map
}

/// Stringify an OTLP AnyValue: strings pass through, numbers and booleans
/// use canonical decimal rendering, bytes become lowercase hex, arrays and
/// kvlists become JSON text. Absent values render as the empty string.
pub fn any_value_to_string(v: Option<&AnyValue>) -> String {
    match v.and_then(|v| v.value.as_ref()) {
        Some(any_value::Value::StringValue(s)) => s.clone(),
        Some(any_value::Value::IntValue(i)) => i.to_string(),
        // f64 Display is the shortest round-trip decimal, never scientific
        Some(any_value::Value::DoubleValue(d)) => d.to_string(),
        Some(any_value::Value::BoolValue(b)) => b.to_string(),
        Some(any_value::Value::BytesValue(b)) => hex::encode(b),
        Some(any_value::Value::ArrayValue(arr)) => {
            if arr.values.is_empty() {
                return "[]".to_string();
            }
            let values: Vec<JsonValue> = arr
                .values
                .iter()
                .map(|v| any_value_to_json(Some(v)))
                .collect();
            serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string())
        }
        Some(any_value::Value::KvlistValue(kvl)) => {
            if kvl.values.is_empty() {
                return "{}".to_string();
            }
            serde_json::to_string(&kvlist_to_json(kvl)).unwrap_or_else(|_| "{}".to_string())
        }
        None => String::new(),
    }
}

/// Convert an AnyValue into a native-typed JSON value for array/kvlist
/// serialization: integers and doubles stay numbers, bytes become hex text.
fn any_value_to_json(v: Option<&AnyValue>) -> JsonValue {
    match v.and_then(|v| v.value.as_ref()) {
        Some(any_value::Value::StringValue(s)) => JsonValue::String(s.clone()),
        Some(any_value::Value::IntValue(i)) => JsonValue::from(*i),
        Some(any_value::Value::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number)
        }
        Some(any_value::Value::BoolValue(b)) => JsonValue::Bool(*b),
        Some(any_value::Value::BytesValue(b)) => JsonValue::String(hex::encode(b)),
        Some(any_value::Value::ArrayValue(arr)) => JsonValue::Array(
            arr.values
                .iter()
                .map(|v| any_value_to_json(Some(v)))
                .collect(),
        ),
        Some(any_value::Value::KvlistValue(kvl)) => kvlist_to_json(kvl),
        None => JsonValue::Null,
    }
}

fn kvlist_to_json(kvl: &KeyValueList) -> JsonValue {
    let mut map = serde_json::Map::new();
    for kv in &kvl.values {
        map.insert(kv.key.clone(), any_value_to_json(kv.value.as_ref()));
    }
    JsonValue::Object(map)
}

/// Split a log body into `(body, body_fields)`: a plain string becomes the
/// body text, a kvlist becomes a flat field map with an empty body, and any
/// other variant is stringified into the body.
pub fn extract_log_body(v: Option<&AnyValue>) -> (String, AttrMap) {
    match v.and_then(|v| v.value.as_ref()) {
        Some(any_value::Value::StringValue(s)) => (s.clone(), AttrMap::default()),
        Some(any_value::Value::KvlistValue(kvl)) => {
            let mut fields = AttrMap::default();
            for kv in &kvl.values {
                fields.insert(kv.key.clone(), any_value_to_string(kv.value.as_ref()));
            }
            (String::new(), fields)
        }
        Some(_) => (any_value_to_string(v), AttrMap::default()),
        None => (String::new(), AttrMap::default()),
    }
}

/// Hex-encode a trace/span identifier; empty input stays empty.
pub fn hex_id(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        String::new()
    } else {
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_value(s: &str) -> AnyValue {
        AnyValue {
            value: Some(any_value::Value::StringValue(s.to_string())),
        }
    }

    fn int_value(i: i64) -> AnyValue {
        AnyValue {
            value: Some(any_value::Value::IntValue(i)),
        }
    }

    fn kv(key: &str, value: AnyValue) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(value),
        }
    }

    #[test]
    fn test_flatten_string() {
        assert_eq!(any_value_to_string(Some(&string_value("v"))), "v");
    }

    #[test]
    fn test_flatten_int() {
        assert_eq!(any_value_to_string(Some(&int_value(7))), "7");
        assert_eq!(any_value_to_string(Some(&int_value(-42))), "-42");
    }

    #[test]
    fn test_flatten_double() {
        let v = AnyValue {
            value: Some(any_value::Value::DoubleValue(1.5)),
        };
        assert_eq!(any_value_to_string(Some(&v)), "1.5");

        // Whole doubles render without a trailing fraction or exponent
        let v = AnyValue {
            value: Some(any_value::Value::DoubleValue(3.0)),
        };
        assert_eq!(any_value_to_string(Some(&v)), "3");
    }

    #[test]
    fn test_flatten_bool() {
        let v = AnyValue {
            value: Some(any_value::Value::BoolValue(true)),
        };
        assert_eq!(any_value_to_string(Some(&v)), "true");
    }

    #[test]
    fn test_flatten_bytes_lowercase_hex() {
        let v = AnyValue {
            value: Some(any_value::Value::BytesValue(vec![0xAB, 0xCD])),
        };
        assert_eq!(any_value_to_string(Some(&v)), "abcd");
    }

    #[test]
    fn test_flatten_array_native_types() {
        let v = AnyValue {
            value: Some(any_value::Value::ArrayValue(
                opentelemetry_proto::tonic::common::v1::ArrayValue {
                    values: vec![int_value(1), string_value("x")],
                },
            )),
        };
        assert_eq!(any_value_to_string(Some(&v)), r#"[1,"x"]"#);
    }

    #[test]
    fn test_flatten_empty_array_and_kvlist() {
        let arr = AnyValue {
            value: Some(any_value::Value::ArrayValue(
                opentelemetry_proto::tonic::common::v1::ArrayValue { values: vec![] },
            )),
        };
        assert_eq!(any_value_to_string(Some(&arr)), "[]");

        let kvl = AnyValue {
            value: Some(any_value::Value::KvlistValue(KeyValueList { values: vec![] })),
        };
        assert_eq!(any_value_to_string(Some(&kvl)), "{}");
    }

    #[test]
    fn test_flatten_kvlist_native_types() {
        let v = AnyValue {
            value: Some(any_value::Value::KvlistValue(KeyValueList {
                values: vec![kv("n", int_value(3)), kv("s", string_value("x"))],
            })),
        };
        // serde_json maps sort keys, matching the original encoder
        assert_eq!(any_value_to_string(Some(&v)), r#"{"n":3,"s":"x"}"#);
    }

    #[test]
    fn test_flatten_none_is_empty() {
        assert_eq!(any_value_to_string(None), "");
        assert_eq!(any_value_to_string(Some(&AnyValue { value: None })), "");
    }

    #[test]
    fn test_flatten_attributes_skips_empty_keys() {
        let attrs = flatten_attributes(&[
            kv("service.name", string_value("api")),
            kv("", string_value("dropped")),
        ]);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("service.name"), Some("api"));
    }

    #[test]
    fn test_attr_map_last_write_wins_keeps_order() {
        let mut map = AttrMap::default();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "3".to_string());

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some("3"));
        assert_eq!(map.to_json(), r#"{"a":"3","b":"2"}"#);
    }

    #[test]
    fn test_extract_log_body_string() {
        let (body, fields) = extract_log_body(Some(&string_value("hi")));
        assert_eq!(body, "hi");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_extract_log_body_kvlist() {
        let v = AnyValue {
            value: Some(any_value::Value::KvlistValue(KeyValueList {
                values: vec![kv("k", string_value("v"))],
            })),
        };
        let (body, fields) = extract_log_body(Some(&v));
        assert_eq!(body, "");
        assert_eq!(fields.get("k"), Some("v"));
    }

    #[test]
    fn test_extract_log_body_other_variants_stringify() {
        let (body, fields) = extract_log_body(Some(&int_value(3)));
        assert_eq!(body, "3");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_extract_log_body_none() {
        let (body, fields) = extract_log_body(None);
        assert_eq!(body, "");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_hex_id() {
        assert_eq!(hex_id(&[]), "");
        assert_eq!(hex_id(&[0x01, 0x02]), "0102");
        assert_eq!(hex_id(&[0xff; 16]).len(), 32);
    }
}
