use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    WellKnown(WellKnownValue),
    Message(DynamicMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WellKnownValue {
    Wrapper(Box<Value>),
    Duration(Duration),
    Timestamp(Timestamp),
    Value(DynamicValue),
    ListValue(Vec<DynamicValue>),
}

/// Payload of `google.protobuf.Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Signed span; `nanos` carries the same sign as `seconds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

/// Instant since the Unix epoch; `nanos` is always in `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneofValue {
    pub field: String,
    pub value: Value,
}

/// A message instance being populated. Slots that were never written are unset.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    message_type: String,
    fields: BTreeMap<String, Value>,
    oneofs: BTreeMap<String, OneofValue>,
}

impl DynamicMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: BTreeMap::new(),
            oneofs: BTreeMap::new(),
        }
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn clear(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn oneof(&self, group: &str) -> Option<&OneofValue> {
        self.oneofs.get(group)
    }

    pub fn set_oneof(&mut self, group: impl Into<String>, field: impl Into<String>, value: Value) {
        self.oneofs.insert(
            group.into(),
            OneofValue {
                field: field.into(),
                value,
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.oneofs.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Flattens set fields and active oneof alternatives into a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let mut object = JsonMap::new();
        for (name, value) in self.fields() {
            object.insert(name.to_string(), value.to_json());
        }
        for active in self.oneofs.values() {
            object.insert(active.field.clone(), active.value.to_json());
        }
        JsonValue::Object(object)
    }
}

impl Value {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Bool(b) => json!(b),
            Value::Int32(i) => json!(i),
            Value::Int64(i) => json!(i),
            Value::UInt32(u) => json!(u),
            Value::UInt64(u) => json!(u),
            Value::Float(f) => float_to_json(f64::from(*f)),
            Value::Double(f) => float_to_json(*f),
            Value::String(s) => json!(s),
            Value::Bytes(bytes) => json!(STANDARD.encode(bytes)),
            Value::Enum(number) => json!(number),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => {
                let mut object = JsonMap::new();
                for (key, value) in entries {
                    let key = match key.to_json() {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    object.insert(key, value.to_json());
                }
                JsonValue::Object(object)
            }
            Value::WellKnown(wkt) => wkt.to_json(),
            Value::Message(message) => message.to_json(),
        }
    }
}

impl WellKnownValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            WellKnownValue::Wrapper(inner) => inner.to_json(),
            WellKnownValue::Duration(d) => json!({ "seconds": d.seconds, "nanos": d.nanos }),
            WellKnownValue::Timestamp(t) => json!({ "seconds": t.seconds, "nanos": t.nanos }),
            WellKnownValue::Value(v) => v.to_json(),
            WellKnownValue::ListValue(items) => {
                JsonValue::Array(items.iter().map(DynamicValue::to_json).collect())
            }
        }
    }
}

impl DynamicValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            DynamicValue::Null => JsonValue::Null,
            DynamicValue::Bool(b) => json!(b),
            DynamicValue::Number(n) => float_to_json(*n),
            DynamicValue::String(s) => json!(s),
        }
    }
}

fn float_to_json(value: f64) -> JsonValue {
    if value.is_nan() {
        json!("NaN")
    } else if value.is_infinite() {
        json!(if value > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        json!(value)
    }
}
