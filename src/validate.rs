use crate::{
    error::{Error, Result},
    schema::{FieldSpec, Schema},
    value::{DynamicMessage, Value},
};

/// Fails on the first required field left unset, in declaration order.
///
/// Walks nested messages reachable through message values, list elements,
/// map values and active oneof alternatives.
pub fn validate(schema: &Schema, message: &DynamicMessage) -> Result<()> {
    let descriptor = schema.message(message.message_type()).ok_or_else(|| {
        Error::InvalidTarget(format!(
            "message type '{}' is not declared",
            message.message_type()
        ))
    })?;

    for field in &descriptor.fields {
        if let Some(group) = &field.oneof {
            if let Some(active) = message.oneof(group)
                && active.field == field.name
            {
                check_value(schema, &active.value)?;
            }
            continue;
        }
        check_field(schema, field, message.get(&field.name))?;
    }
    Ok(())
}

fn check_field(schema: &Schema, field: &FieldSpec, value: Option<&Value>) -> Result<()> {
    match value {
        None if field.is_required() => Err(Error::RequiredFieldMissing(field.name.clone())),
        None => Ok(()),
        Some(value) => check_value(schema, value),
    }
}

fn check_value(schema: &Schema, value: &Value) -> Result<()> {
    match value {
        Value::Message(nested) => validate(schema, nested),
        Value::List(items) => items.iter().try_for_each(|item| check_value(schema, item)),
        Value::Map(entries) => entries
            .iter()
            .try_for_each(|(_, item)| check_value(schema, item)),
        // Well-known types carry no required fields.
        _ => Ok(()),
    }
}
