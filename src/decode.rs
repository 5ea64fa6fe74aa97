//! Type-directed conversion of one raw cell into one typed [`Value`].
//!
//! [`decode_field`] applies the field-level rules (the `null` sentinel and
//! repeated splitting) and then hands each piece of text to [`decode_value`],
//! which dispatches exhaustively on the declared [`FieldType`]. Both are pure
//! functions of their arguments.

use std::{num::IntErrorKind, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::trace;

use crate::{
    error::{Error, Result},
    io_utils,
    schema::{FieldSpec, FieldType, ScalarType, Schema, WellKnownType},
    value::{DynamicValue, Value, WellKnownValue},
    well_known,
};

pub const NULL_SENTINEL: &str = "null";

/// Decodes the raw text of one field. `Ok(None)` means the field stays unset.
pub fn decode_field(raw: &str, field: &FieldSpec, schema: &Schema) -> Result<Option<Value>> {
    trace!("Decoding field '{}' ({}) from {raw:?}", field.name, field.field_type);
    if field.is_repeated() {
        return decode_repeated(raw, &field.field_type, schema).map(Some);
    }
    if field.has_presence() && raw == NULL_SENTINEL {
        if field.field_type == FieldType::WellKnown(WellKnownType::Value) {
            return Ok(Some(Value::WellKnown(WellKnownValue::Value(
                DynamicValue::Null,
            ))));
        }
        return Ok(None);
    }
    decode_value(raw, &field.field_type, schema).map(Some)
}

/// Decodes a single (non-repeated) value of the given type.
pub fn decode_value(raw: &str, field_type: &FieldType, schema: &Schema) -> Result<Value> {
    match field_type {
        FieldType::WellKnown(wkt) => decode_well_known(raw, *wkt),
        FieldType::Message(name) => Err(Error::UnsupportedType(format!(
            "nested message '{name}' cannot be decoded from a cell"
        ))),
        FieldType::Map(..) => Err(Error::UnsupportedType(format!(
            "map field of type '{field_type}' cannot be decoded from a cell"
        ))),
        FieldType::Enum(id) => decode_enum(raw, id, schema),
        FieldType::Scalar(scalar) => decode_scalar(raw, *scalar),
    }
}

fn decode_repeated(raw: &str, element: &FieldType, schema: &Schema) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::List(Vec::new()));
    }
    let items = io_utils::split_cell(raw)?;
    let values = items
        .iter()
        .map(|item| decode_value(item, element, schema))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::List(values))
}

fn decode_well_known(raw: &str, wkt: WellKnownType) -> Result<Value> {
    if let Some(scalar) = wkt.wrapped_scalar() {
        let inner = decode_scalar(raw, scalar)?;
        return Ok(Value::WellKnown(WellKnownValue::Wrapper(Box::new(inner))));
    }
    let decoded = match wkt {
        WellKnownType::Duration => WellKnownValue::Duration(well_known::parse_duration(raw)?),
        WellKnownType::Timestamp => WellKnownValue::Timestamp(well_known::parse_timestamp(raw)?),
        WellKnownType::ListValue => WellKnownValue::ListValue(well_known::parse_list_value(raw)?),
        WellKnownType::Value => WellKnownValue::Value(well_known::parse_dynamic(raw)),
        WellKnownType::Any => {
            return Err(Error::UnsupportedType(
                "cannot determine the type carried by google.protobuf.Any".to_string(),
            ));
        }
        other => {
            return Err(Error::UnsupportedType(format!(
                "nested message '{}' cannot be decoded from a cell",
                other.full_name()
            )));
        }
    };
    Ok(Value::WellKnown(decoded))
}

fn decode_enum(raw: &str, id: &str, schema: &Schema) -> Result<Value> {
    let descriptor = schema
        .enum_descriptor(id)
        .ok_or_else(|| Error::InvalidTarget(format!("enum '{id}' is not declared")))?;
    let trimmed = raw.trim();
    if let Some(number) = descriptor.number(trimmed) {
        return Ok(Value::Enum(number));
    }
    if trimmed.starts_with('+') || trimmed.parse::<u32>().is_err() {
        return Err(Error::format(
            format!("enum {id}"),
            trimmed,
            "not a known name or ordinal",
        ));
    }
    let number = parse_int::<i32>(trimmed, &format!("enum {id}"))?;
    Ok(Value::Enum(number))
}

fn decode_scalar(raw: &str, scalar: ScalarType) -> Result<Value> {
    let expected = scalar.as_str();
    let value = match scalar {
        ScalarType::Bytes => {
            let decoded = STANDARD
                .decode(raw)
                .map_err(|err| Error::format(expected, raw, err))?;
            Value::Bytes(decoded)
        }
        ScalarType::Bool => {
            let lowered = strip_quotes(raw).to_lowercase();
            let parsed = well_known::parse_bool_token(&lowered)
                .ok_or_else(|| Error::format(expected, raw, "invalid syntax"))?;
            Value::Bool(parsed)
        }
        ScalarType::Float => {
            let parsed = match non_finite(raw) {
                Some(special) => special as f32,
                None => parse_float::<f32>(strip_quotes(raw), expected)?,
            };
            Value::Float(parsed)
        }
        ScalarType::Double => {
            let parsed = match non_finite(raw) {
                Some(special) => special,
                None => parse_float::<f64>(strip_quotes(raw), expected)?,
            };
            Value::Double(parsed)
        }
        ScalarType::Int32 => Value::Int32(parse_int(strip_quotes(raw), expected)?),
        ScalarType::Int64 => Value::Int64(parse_int(strip_quotes(raw), expected)?),
        ScalarType::UInt32 => Value::UInt32(parse_unsigned(strip_quotes(raw), expected)?),
        ScalarType::UInt64 => Value::UInt64(parse_unsigned(strip_quotes(raw), expected)?),
        ScalarType::String => Value::String(raw.to_string()),
    };
    Ok(value)
}

fn non_finite(raw: &str) -> Option<f64> {
    match raw {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Removes exactly one layer of surrounding double quotes.
fn strip_quotes(raw: &str) -> &str {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

fn parse_int<T>(text: &str, expected: &str) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    text.parse::<T>().map_err(|err| {
        let reason = match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => "value out of range",
            IntErrorKind::Empty => "empty text",
            _ => "invalid syntax",
        };
        Error::format(expected, text, reason)
    })
}

// Unsigned text carries no sign at all.
fn parse_unsigned<T>(text: &str, expected: &str) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    if text.starts_with('+') {
        return Err(Error::format(expected, text, "invalid syntax"));
    }
    parse_int(text, expected)
}

trait FloatWidth: FromStr {
    fn is_infinite(&self) -> bool;
}

impl FloatWidth for f32 {
    fn is_infinite(&self) -> bool {
        f32::is_infinite(*self)
    }
}

impl FloatWidth for f64 {
    fn is_infinite(&self) -> bool {
        f64::is_infinite(*self)
    }
}

fn parse_float<T: FloatWidth>(text: &str, expected: &str) -> Result<T> {
    let parsed = text
        .parse::<T>()
        .map_err(|_| Error::format(expected, text, "invalid syntax"))?;
    if parsed.is_infinite() && !is_infinity_literal(text) {
        return Err(Error::format(expected, text, "value out of range"));
    }
    Ok(parsed)
}

fn is_infinity_literal(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::EnumDescriptor,
        value::{Duration, Timestamp},
    };

    fn color_schema() -> Schema {
        Schema::new().with_enum(
            "Color",
            EnumDescriptor::from_pairs([("RED", 0), ("GREEN", 1), ("BLUE", 2)]),
        )
    }

    fn scalar(raw: &str, scalar: ScalarType) -> Result<Value> {
        decode_value(raw, &FieldType::Scalar(scalar), &Schema::new())
    }

    #[test]
    fn quoted_and_unquoted_numbers_agree() {
        assert_eq!(scalar("-314", ScalarType::Int64).unwrap(), Value::Int64(-314));
        assert_eq!(scalar("\"-314\"", ScalarType::Int64).unwrap(), Value::Int64(-314));
        assert_eq!(scalar("\"32\"", ScalarType::UInt32).unwrap(), Value::UInt32(32));
        assert_eq!(scalar("\"2.5\"", ScalarType::Float).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn integers_are_range_checked_per_width() {
        assert_eq!(
            scalar("-6400000000", ScalarType::Int64).unwrap(),
            Value::Int64(-6_400_000_000)
        );
        let err = scalar("-6400000000", ScalarType::Int32).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(scalar("-1", ScalarType::UInt64).unwrap_err().is_format());
        assert!(scalar("+5", ScalarType::UInt32).unwrap_err().is_format());
        assert!(scalar("\"+5\"", ScalarType::UInt64).unwrap_err().is_format());
        assert_eq!(scalar("+5", ScalarType::Int32).unwrap(), Value::Int32(5));
        assert!(scalar("1.5", ScalarType::Int32).unwrap_err().is_format());
    }

    #[test]
    fn float_specials_bypass_parsing() {
        match scalar("NaN", ScalarType::Double).unwrap() {
            Value::Double(v) => assert!(v.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
        assert_eq!(
            scalar("Infinity", ScalarType::Float).unwrap(),
            Value::Float(f32::INFINITY)
        );
        assert_eq!(
            scalar("-Infinity", ScalarType::Double).unwrap(),
            Value::Double(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn float_overflow_is_a_format_error() {
        assert!(scalar("1e40", ScalarType::Float).unwrap_err().is_format());
        assert!(scalar("1e400", ScalarType::Double).unwrap_err().is_format());
        assert_eq!(scalar("1e40", ScalarType::Double).unwrap(), Value::Double(1e40));
    }

    #[test]
    fn bool_strips_quotes_and_case() {
        assert_eq!(scalar("TRUE", ScalarType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(scalar("\"false\"", ScalarType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(scalar("1", ScalarType::Bool).unwrap(), Value::Bool(true));
        assert!(scalar("yes", ScalarType::Bool).unwrap_err().is_format());
    }

    #[test]
    fn strings_are_verbatim() {
        assert_eq!(
            scalar("\"quoted\"", ScalarType::String).unwrap(),
            Value::String("\"quoted\"".into())
        );
    }

    #[test]
    fn bytes_are_standard_base64() {
        assert_eq!(
            scalar("YmVlcCBib29w", ScalarType::Bytes).unwrap(),
            Value::Bytes(b"beep boop".to_vec())
        );
        assert_eq!(scalar("", ScalarType::Bytes).unwrap(), Value::Bytes(Vec::new()));
        assert!(scalar("not base64!", ScalarType::Bytes).unwrap_err().is_format());
    }

    #[test]
    fn enums_resolve_by_name_or_ordinal() {
        let schema = color_schema();
        let ty = FieldType::Enum("Color".into());
        assert_eq!(decode_value("BLUE", &ty, &schema).unwrap(), Value::Enum(2));
        assert_eq!(decode_value("2", &ty, &schema).unwrap(), Value::Enum(2));
        assert_eq!(decode_value(" 2", &ty, &schema).unwrap(), Value::Enum(2));
        assert_eq!(decode_value("1000", &ty, &schema).unwrap(), Value::Enum(1000));
        assert!(decode_value("PURPLE", &ty, &schema).unwrap_err().is_format());
        assert!(decode_value("-1", &ty, &schema).unwrap_err().is_format());
        assert!(decode_value("+2", &ty, &schema).unwrap_err().is_format());
        assert!(decode_value("4294967295", &ty, &schema).unwrap_err().is_format());
    }

    #[test]
    fn undeclared_enum_is_an_invalid_target() {
        let err = decode_value("RED", &FieldType::Enum("Nope".into()), &Schema::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)));
    }

    #[test]
    fn nested_messages_are_unsupported() {
        let schema = Schema::new();
        for ty in [
            FieldType::Message("Simple".into()),
            FieldType::WellKnown(WellKnownType::Struct),
            FieldType::WellKnown(WellKnownType::Any),
            FieldType::Map(
                Box::new(FieldType::Scalar(ScalarType::String)),
                Box::new(FieldType::Scalar(ScalarType::Int32)),
            ),
        ] {
            let err = decode_value("x", &ty, &schema).unwrap_err();
            assert!(matches!(err, Error::UnsupportedType(_)), "{ty}");
        }
    }

    #[test]
    fn wrappers_decode_inner_scalar() {
        let schema = Schema::new();
        let field = FieldSpec::well_known("i64", WellKnownType::Int64Value);
        assert_eq!(
            decode_field("-3", &field, &schema).unwrap(),
            Some(Value::WellKnown(WellKnownValue::Wrapper(Box::new(Value::Int64(-3)))))
        );
        let bytes = FieldSpec::well_known("bytes", WellKnownType::BytesValue);
        assert_eq!(
            decode_field("d293", &bytes, &schema).unwrap(),
            Some(Value::WellKnown(WellKnownValue::Wrapper(Box::new(Value::Bytes(
                b"wow".to_vec()
            )))))
        );
    }

    #[test]
    fn null_unsets_presence_fields_except_dynamic_value() {
        let schema = Schema::new();
        for wkt in [
            WellKnownType::DoubleValue,
            WellKnownType::StringValue,
            WellKnownType::Duration,
            WellKnownType::Timestamp,
            WellKnownType::ListValue,
            WellKnownType::Struct,
        ] {
            let field = FieldSpec::well_known("f", wkt);
            assert_eq!(decode_field("null", &field, &schema).unwrap(), None);
        }
        let optional = FieldSpec::scalar("o", ScalarType::Int32).optional();
        assert_eq!(decode_field("null", &optional, &schema).unwrap(), None);

        let value = FieldSpec::well_known("val", WellKnownType::Value);
        assert_eq!(
            decode_field("null", &value, &schema).unwrap(),
            Some(Value::WellKnown(WellKnownValue::Value(DynamicValue::Null)))
        );
    }

    #[test]
    fn null_on_implicit_presence_scalar_is_parsed() {
        let field = FieldSpec::scalar("n", ScalarType::Int32);
        assert!(decode_field("null", &field, &Schema::new()).unwrap_err().is_format());
    }

    #[test]
    fn durations_and_timestamps() {
        let schema = Schema::new();
        let dur = FieldSpec::well_known("dur", WellKnownType::Duration);
        assert_eq!(
            decode_field("3s", &dur, &schema).unwrap(),
            Some(Value::WellKnown(WellKnownValue::Duration(Duration {
                seconds: 3,
                nanos: 0
            })))
        );
        let ts = FieldSpec::well_known("ts", WellKnownType::Timestamp);
        assert_eq!(
            decode_field("2014-05-13T16:53:20Z", &ts, &schema).unwrap(),
            Some(Value::WellKnown(WellKnownValue::Timestamp(Timestamp {
                seconds: 1_400_000_000,
                nanos: 0
            })))
        );
        assert!(decode_field("soon", &ts, &schema).unwrap_err().is_format());
    }

    #[test]
    fn repeated_cells_split_and_preserve_order() {
        let schema = color_schema();
        let ints = FieldSpec::scalar("r_int32", ScalarType::Int32).repeated();
        assert_eq!(
            decode_field("-3,-4,-5", &ints, &schema).unwrap(),
            Some(Value::List(vec![
                Value::Int32(-3),
                Value::Int32(-4),
                Value::Int32(-5)
            ]))
        );
        assert_eq!(
            decode_field("", &ints, &schema).unwrap(),
            Some(Value::List(Vec::new()))
        );
        assert!(decode_field("1,x,3", &ints, &schema).unwrap_err().is_format());

        let colors = FieldSpec::new("r_color", FieldType::Enum("Color".into())).repeated();
        assert!(decode_field("PUNS,2", &colors, &schema).unwrap_err().is_format());
        assert_eq!(
            decode_field("RED,2", &colors, &schema).unwrap(),
            Some(Value::List(vec![Value::Enum(0), Value::Enum(2)]))
        );

        let blobs = FieldSpec::scalar("r_bytes", ScalarType::Bytes).repeated();
        assert_eq!(
            decode_field("c2tpdHRsZXM=,bSZtJ3M=", &blobs, &schema).unwrap(),
            Some(Value::List(vec![
                Value::Bytes(b"skittles".to_vec()),
                Value::Bytes(b"m&m's".to_vec())
            ]))
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let schema = color_schema();
        let field = FieldSpec::well_known("lv", WellKnownType::ListValue);
        let first = decode_field("x,1.5,true", &field, &schema).unwrap();
        let second = decode_field("x,1.5,true", &field, &schema).unwrap();
        assert_eq!(first, second);
    }
}
