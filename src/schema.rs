//! Static message descriptions consumed by the decoder and the validator.
//!
//! A [`Schema`] is plain data: an ordered [`FieldSpec`] list per message and a
//! name table per enum. It is built once, from YAML via [`Schema::load`] or in
//! code through the builder helpers, and never changes afterwards.
//!
//! ```yaml
//! enums:
//!   Color:
//!     values: { RED: 0, GREEN: 1, BLUE: 2 }
//! messages:
//!   Widget:
//!     fields:
//!       - { name: color, type: enum(Color), label: optional }
//!       - { name: r_color, type: enum(Color), label: repeated }
//! ```

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        let scalar = match token {
            "bool" => ScalarType::Bool,
            "int32" | "sint32" | "sfixed32" => ScalarType::Int32,
            "int64" | "sint64" | "sfixed64" => ScalarType::Int64,
            "uint32" | "fixed32" => ScalarType::UInt32,
            "uint64" | "fixed64" => ScalarType::UInt64,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        };
        Some(scalar)
    }
}

const WELL_KNOWN_PREFIX: &str = "google.protobuf.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownType {
    DoubleValue,
    FloatValue,
    Int64Value,
    UInt64Value,
    Int32Value,
    UInt32Value,
    BoolValue,
    StringValue,
    BytesValue,
    Duration,
    Timestamp,
    Value,
    ListValue,
    Struct,
    Any,
}

impl WellKnownType {
    pub fn short_name(&self) -> &'static str {
        match self {
            WellKnownType::DoubleValue => "DoubleValue",
            WellKnownType::FloatValue => "FloatValue",
            WellKnownType::Int64Value => "Int64Value",
            WellKnownType::UInt64Value => "UInt64Value",
            WellKnownType::Int32Value => "Int32Value",
            WellKnownType::UInt32Value => "UInt32Value",
            WellKnownType::BoolValue => "BoolValue",
            WellKnownType::StringValue => "StringValue",
            WellKnownType::BytesValue => "BytesValue",
            WellKnownType::Duration => "Duration",
            WellKnownType::Timestamp => "Timestamp",
            WellKnownType::Value => "Value",
            WellKnownType::ListValue => "ListValue",
            WellKnownType::Struct => "Struct",
            WellKnownType::Any => "Any",
        }
    }

    pub fn full_name(&self) -> String {
        format!("{WELL_KNOWN_PREFIX}{}", self.short_name())
    }

    fn from_full_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix('.').unwrap_or(name).strip_prefix(WELL_KNOWN_PREFIX)?;
        let wkt = match short {
            "DoubleValue" => WellKnownType::DoubleValue,
            "FloatValue" => WellKnownType::FloatValue,
            "Int64Value" => WellKnownType::Int64Value,
            "UInt64Value" => WellKnownType::UInt64Value,
            "Int32Value" => WellKnownType::Int32Value,
            "UInt32Value" => WellKnownType::UInt32Value,
            "BoolValue" => WellKnownType::BoolValue,
            "StringValue" => WellKnownType::StringValue,
            "BytesValue" => WellKnownType::BytesValue,
            "Duration" => WellKnownType::Duration,
            "Timestamp" => WellKnownType::Timestamp,
            "Value" => WellKnownType::Value,
            "ListValue" => WellKnownType::ListValue,
            "Struct" => WellKnownType::Struct,
            "Any" => WellKnownType::Any,
            _ => return None,
        };
        Some(wkt)
    }

    /// The primitive carried by a wrapper type, `None` for everything else.
    pub fn wrapped_scalar(&self) -> Option<ScalarType> {
        match self {
            WellKnownType::DoubleValue => Some(ScalarType::Double),
            WellKnownType::FloatValue => Some(ScalarType::Float),
            WellKnownType::Int64Value => Some(ScalarType::Int64),
            WellKnownType::UInt64Value => Some(ScalarType::UInt64),
            WellKnownType::Int32Value => Some(ScalarType::Int32),
            WellKnownType::UInt32Value => Some(ScalarType::UInt32),
            WellKnownType::BoolValue => Some(ScalarType::Bool),
            WellKnownType::StringValue => Some(ScalarType::String),
            WellKnownType::BytesValue => Some(ScalarType::Bytes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    Enum(String),
    Message(String),
    Map(Box<FieldType>, Box<FieldType>),
    WellKnown(WellKnownType),
}

impl FieldType {
    pub fn is_message_like(&self) -> bool {
        matches!(self, FieldType::Message(_) | FieldType::WellKnown(_))
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "bool",
            "int32",
            "int64",
            "uint32",
            "uint64",
            "float",
            "double",
            "string",
            "bytes",
            "enum(Name)",
            "message(Name)",
            "map(key,value)",
            "google.protobuf.<WellKnownType>",
        ]
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(scalar) => f.write_str(scalar.as_str()),
            FieldType::Enum(id) => write!(f, "enum({id})"),
            FieldType::Message(name) => write!(f, "message({name})"),
            FieldType::Map(key, value) => write!(f, "map({key},{value})"),
            FieldType::WellKnown(wkt) => f.write_str(&wkt.full_name()),
        }
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim();
        if let Some(scalar) = ScalarType::from_token(token) {
            return Ok(FieldType::Scalar(scalar));
        }
        if let Some(wkt) = WellKnownType::from_full_name(token) {
            return Ok(FieldType::WellKnown(wkt));
        }
        if let Some(inner) = parenthesized(token, "enum")? {
            return Ok(FieldType::Enum(inner.to_string()));
        }
        if let Some(inner) = parenthesized(token, "message")? {
            return Ok(FieldType::Message(inner.to_string()));
        }
        if let Some(inner) = parenthesized(token, "map")? {
            let (key, val) = split_top_level_comma(inner)
                .ok_or_else(|| anyhow!("Map type must name key and value, e.g. map(string,int32)"))?;
            let key = FieldType::from_str(key)?;
            ensure!(
                matches!(key, FieldType::Scalar(s) if !matches!(s, ScalarType::Float | ScalarType::Double | ScalarType::Bytes)),
                "Map key type must be an integral, bool or string scalar, found '{key}'"
            );
            let val = FieldType::from_str(val)?;
            ensure!(
                !matches!(val, FieldType::Map(..)),
                "Map value type cannot itself be a map"
            );
            return Ok(FieldType::Map(Box::new(key), Box::new(val)));
        }
        Err(anyhow!(
            "Unknown field type '{value}'. Supported types: {}",
            FieldType::variants().join(", ")
        ))
    }
}

fn parenthesized<'a>(token: &'a str, keyword: &str) -> Result<Option<&'a str>> {
    let Some(rest) = token.strip_prefix(keyword) else {
        return Ok(None);
    };
    let Some(rest) = rest.trim_start().strip_prefix('(') else {
        return Ok(None);
    };
    let inner = rest
        .strip_suffix(')')
        .ok_or_else(|| anyhow!("Type '{token}' must close with ')'"))?
        .trim();
    ensure!(!inner.is_empty(), "Type '{token}' must name its target");
    Ok(Some(inner))
}

fn split_top_level_comma(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (idx, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&inner[..idx], &inner[idx + 1..])),
            _ => {}
        }
    }
    None
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        FieldType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Implicit presence: an unset field is indistinguishable from its default.
    #[default]
    Singular,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "is_singular")]
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oneof: Option<String>,
}

fn is_singular(label: &Label) -> bool {
    *label == Label::Singular
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            json_name: None,
            field_type,
            label: Label::Singular,
            oneof: None,
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(scalar))
    }

    pub fn well_known(name: impl Into<String>, wkt: WellKnownType) -> Self {
        Self::new(name, FieldType::WellKnown(wkt))
    }

    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = Some(json_name.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }

    pub fn optional(self) -> Self {
        self.with_label(Label::Optional)
    }

    pub fn required(self) -> Self {
        self.with_label(Label::Required)
    }

    pub fn repeated(self) -> Self {
        self.with_label(Label::Repeated)
    }

    pub fn in_oneof(mut self, group: impl Into<String>) -> Self {
        self.oneof = Some(group.into());
        self
    }

    /// The display spelling accepted besides `name`.
    pub fn alternate_name(&self) -> Cow<'_, str> {
        match self.json_name.as_deref() {
            Some(name) if !name.is_empty() => Cow::Borrowed(name),
            _ => Cow::Owned(camel_case_name(&self.name)),
        }
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    /// Whether the field has a slot that can be left unset by a `null` cell.
    pub fn has_presence(&self) -> bool {
        match self.label {
            Label::Repeated => false,
            Label::Optional | Label::Required => true,
            Label::Singular => self.field_type.is_message_like(),
        }
    }
}

/// Camel-cases a field name the way the protobuf compiler derives `json_name`.
pub fn camel_case_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = false;
    for c in name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub values: BTreeMap<String, i32>,
}

impl EnumDescriptor {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(name, number)| (name.to_string(), number))
                .collect(),
        }
    }

    pub fn number(&self, name: &str) -> Option<i32> {
        self.values.get(name).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub fields: Vec<FieldSpec>,
}

impl MessageDescriptor {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Fields outside any oneof, in declaration order.
    pub fn plain_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.oneof.is_none())
    }

    /// Oneof alternatives, in declaration order.
    pub fn oneof_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.oneof.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enums: BTreeMap<String, EnumDescriptor>,
    #[serde(default)]
    pub messages: BTreeMap<String, MessageDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enum(mut self, id: impl Into<String>, descriptor: EnumDescriptor) -> Self {
        self.enums.insert(id.into(), descriptor);
        self
    }

    pub fn with_message(mut self, name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        self.messages.insert(name.into(), MessageDescriptor::new(fields));
        self
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name)
    }

    pub fn enum_descriptor(&self, id: &str) -> Option<&EnumDescriptor> {
        self.enums.get(id)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: Schema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema
            .validate()
            .with_context(|| format!("Validating schema {path:?}"))?;
        Ok(schema)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let schema: Schema = serde_yaml::from_str(text).context("Parsing schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }

    /// Checks the invariants the decoder relies on.
    pub fn validate(&self) -> Result<()> {
        for (message_name, descriptor) in &self.messages {
            let mut seen: HashSet<String> = HashSet::new();
            for field in &descriptor.fields {
                ensure!(
                    !field.name.is_empty(),
                    "Message '{message_name}' declares a field without a name"
                );
                for spelling in spellings(field) {
                    if !seen.insert(spelling.clone()) {
                        bail!(
                            "Field name '{spelling}' is declared more than once in message '{message_name}'"
                        );
                    }
                }
                if field.oneof.is_some() {
                    ensure!(
                        matches!(field.label, Label::Singular | Label::Optional),
                        "Oneof member '{}' in message '{message_name}' cannot be {:?}",
                        field.name,
                        field.label
                    );
                }
                if matches!(field.field_type, FieldType::Map(..)) {
                    ensure!(
                        matches!(field.label, Label::Singular | Label::Repeated),
                        "Map field '{}' in message '{message_name}' cannot be {:?}",
                        field.name,
                        field.label
                    );
                }
                self.ensure_resolves(&field.field_type)
                    .with_context(|| format!("Field '{}' in message '{message_name}'", field.name))?;
            }
        }
        Ok(())
    }

    fn ensure_resolves(&self, field_type: &FieldType) -> Result<()> {
        match field_type {
            FieldType::Enum(id) => ensure!(self.enums.contains_key(id), "Unknown enum '{id}'"),
            FieldType::Message(name) => {
                ensure!(self.messages.contains_key(name), "Unknown message '{name}'")
            }
            FieldType::Map(key, value) => {
                self.ensure_resolves(key)?;
                self.ensure_resolves(value)?;
            }
            FieldType::Scalar(_) | FieldType::WellKnown(_) => {}
        }
        Ok(())
    }
}

fn spellings(field: &FieldSpec) -> Vec<String> {
    let alternate = field.alternate_name();
    if alternate == field.name {
        vec![field.name.clone()]
    } else {
        vec![field.name.clone(), alternate.into_owned()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_tokens_round_trip() {
        for token in [
            "bool",
            "int64",
            "bytes",
            "enum(Widget.Color)",
            "message(Simple)",
            "map(string,message(Simple))",
            "google.protobuf.Duration",
        ] {
            let parsed = FieldType::from_str(token).expect("parse token");
            assert_eq!(parsed.to_string(), token);
        }
    }

    #[test]
    fn field_type_aliases_collapse_to_wire_width() {
        assert_eq!(
            FieldType::from_str("sint32").unwrap(),
            FieldType::Scalar(ScalarType::Int32)
        );
        assert_eq!(
            FieldType::from_str("fixed64").unwrap(),
            FieldType::Scalar(ScalarType::UInt64)
        );
        assert!(FieldType::from_str("decimal").is_err());
        assert!(FieldType::from_str("enum(").is_err());
        assert!(FieldType::from_str("map(double,string)").is_err());
    }

    #[test]
    fn camel_case_matches_compiler_rule() {
        assert_eq!(camel_case_name("o_int32_str"), "oInt32Str");
        assert_eq!(camel_case_name("home_address"), "homeAddress");
        assert_eq!(camel_case_name("Country"), "Country");
        assert_eq!(camel_case_name("val"), "val");
    }

    #[test]
    fn presence_follows_label_and_type() {
        assert!(!FieldSpec::scalar("a", ScalarType::Int32).has_presence());
        assert!(FieldSpec::scalar("a", ScalarType::Int32).optional().has_presence());
        assert!(FieldSpec::well_known("d", WellKnownType::Duration).has_presence());
        assert!(
            !FieldSpec::well_known("d", WellKnownType::Duration)
                .repeated()
                .has_presence()
        );
    }

    #[test]
    fn validate_rejects_duplicate_spellings() {
        let schema = Schema::new().with_message(
            "Clash",
            vec![
                FieldSpec::scalar("home_address", ScalarType::String),
                FieldSpec::scalar("homeAddress", ScalarType::String),
            ],
        );
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("homeAddress"));
    }

    #[test]
    fn validate_rejects_dangling_enum_reference() {
        let schema = Schema::new().with_message(
            "Widget",
            vec![FieldSpec::new("color", FieldType::Enum("Color".into()))],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn validate_rejects_required_oneof_member() {
        let schema = Schema::new().with_message(
            "Choice",
            vec![
                FieldSpec::scalar("a", ScalarType::String)
                    .required()
                    .in_oneof("union"),
            ],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn yaml_schema_parses_labels_and_types() {
        let schema = Schema::from_yaml_str(
            r#"
enums:
  Color:
    values: { RED: 0, GREEN: 1, BLUE: 2 }
messages:
  Widget:
    fields:
      - { name: color, type: enum(Color), label: optional }
      - { name: r_color, type: enum(Color), label: repeated }
      - { name: salary, type: int64, oneof: union }
"#,
        )
        .expect("parse schema");
        let widget = schema.message("Widget").expect("widget");
        assert_eq!(widget.fields.len(), 3);
        assert_eq!(widget.fields[0].label, Label::Optional);
        assert_eq!(widget.fields[1].alternate_name(), "rColor");
        assert_eq!(widget.oneof_fields().count(), 1);
        assert_eq!(schema.enum_descriptor("Color").unwrap().number("BLUE"), Some(2));

        let yaml = schema.to_yaml_string().expect("serialize");
        let reparsed = Schema::from_yaml_str(&yaml).expect("reparse");
        assert_eq!(reparsed, schema);
    }
}
