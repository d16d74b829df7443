/// Update expression compilation
///
/// Turns a list of [`UpdateAction`]s into `SET`/`REMOVE`/`ADD`/`DELETE`
/// clauses. Values are checked against the declared field types first, so a
/// bad update never reaches the executor.

use crate::condition::{compile, Condition, Placeholders};
use crate::error::{Error, Result};
use crate::schema::ModelSchema;
use crate::types::Item;
use crate::value::Value;
use std::collections::HashMap;
use tracing::debug;

/// One change to apply to an item
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(String, Value),
    Remove(String),
    /// Numeric increment or set union
    Add(String, Value),
    /// Set difference
    Delete(String, Value),
}

impl UpdateAction {
    pub fn field(&self) -> &str {
        match self {
            UpdateAction::Set(f, _)
            | UpdateAction::Remove(f)
            | UpdateAction::Add(f, _)
            | UpdateAction::Delete(f, _) => f,
        }
    }
}

/// Which attributes an update returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

impl ReturnValues {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnValues::None => "NONE",
            ReturnValues::AllOld => "ALL_OLD",
            ReturnValues::UpdatedOld => "UPDATED_OLD",
            ReturnValues::AllNew => "ALL_NEW",
            ReturnValues::UpdatedNew => "UPDATED_NEW",
        }
    }

    pub fn parse(text: &str) -> Option<ReturnValues> {
        match text {
            "NONE" => Some(ReturnValues::None),
            "ALL_OLD" => Some(ReturnValues::AllOld),
            "UPDATED_OLD" => Some(ReturnValues::UpdatedOld),
            "ALL_NEW" => Some(ReturnValues::AllNew),
            "UPDATED_NEW" => Some(ReturnValues::UpdatedNew),
            _ => None,
        }
    }
}

/// Compiled update request parts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledUpdate {
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
}

fn validation_error(field: &str, value: &Value, reason: &str) -> Error {
    Error::Validation {
        message: format!("Validation failed for field '{}': {}", field, reason),
        field: Some(field.to_string()),
        value: Some(format!("{:?}", value)),
        source: None,
    }
}

fn add_error(field: Option<&str>, value: &Value) -> Error {
    let message = match field {
        Some(field) => format!(
            "Invalid type for ADD operation on field '{}'. DynamoDB ADD supports only Numbers and Sets. Got: {}",
            field,
            value.type_name()
        ),
        None => format!(
            "Invalid value for ADD operation. DynamoDB ADD supports only Numbers and Sets. Got: {}",
            value.type_name()
        ),
    };
    Error::Validation {
        message,
        field: field.map(str::to_string),
        value: Some(format!("{:?}", value)),
        source: None,
    }
}

/// Wire name and validated value for one action target.
fn check(schema: &ModelSchema, field: &str, value: Value) -> Result<(String, Value)> {
    match schema.field(field).or_else(|| schema.field_by_wire_name(field)) {
        Some(def) => {
            let coerced = def
                .field_type
                .coerce(value.clone())
                .map_err(|reason| validation_error(field, &value, &reason))?;
            Ok((def.wire_name().to_string(), coerced))
        }
        None => Ok((field.to_string(), value)),
    }
}

fn wire_name(schema: &ModelSchema, field: &str) -> String {
    schema
        .field(field)
        .or_else(|| schema.field_by_wire_name(field))
        .map(|def| def.wire_name().to_string())
        .unwrap_or_else(|| field.to_string())
}

/// Compiles update actions and an optional condition into one request.
pub fn compile_update(
    schema: &ModelSchema,
    actions: &[UpdateAction],
    condition: Option<&Condition>,
) -> Result<CompiledUpdate> {
    if actions.is_empty() {
        return Err(Error::InvalidArgument("No update actions specified".to_string()));
    }

    let mut sets = Vec::new();
    let mut removes = Vec::new();
    let mut adds = Vec::new();
    let mut deletes = Vec::new();

    for action in actions {
        match action {
            UpdateAction::Set(field, Value::Null) | UpdateAction::Remove(field) => {
                removes.push(wire_name(schema, field));
            }
            UpdateAction::Set(field, value) => sets.push(check(schema, field, value.clone())?),
            UpdateAction::Add(field, value) => {
                let declared = schema.field(field).or_else(|| schema.field_by_wire_name(field)).is_some();
                let (name, coerced) = check(schema, field, value.clone())?;
                if !(coerced.is_number() || coerced.is_set()) {
                    return Err(add_error(declared.then_some(field.as_str()), &coerced));
                }
                adds.push((name, coerced));
            }
            UpdateAction::Delete(field, value) => deletes.push(check(schema, field, value.clone())?),
        }
    }

    let mut ph = Placeholders::new("#u_n", ":u_v");
    let mut clauses = Vec::new();

    if !sets.is_empty() {
        let parts = sets
            .iter()
            .map(|(name, value)| Ok(format!("{} = {}", ph.path(name), ph.value(value)?)))
            .collect::<Result<Vec<_>>>()?;
        clauses.push(format!("SET {}", parts.join(", ")));
    }
    if !removes.is_empty() {
        let parts: Vec<String> = removes.iter().map(|name| ph.path(name)).collect();
        clauses.push(format!("REMOVE {}", parts.join(", ")));
    }
    for (keyword, group) in [("ADD", &adds), ("DELETE", &deletes)] {
        if group.is_empty() {
            continue;
        }
        let parts = group
            .iter()
            .map(|(name, value)| Ok(format!("{} {}", ph.path(name), ph.value(value)?)))
            .collect::<Result<Vec<_>>>()?;
        clauses.push(format!("{} {}", keyword, parts.join(", ")));
    }

    let update_expression = clauses.join(" ");
    let mut names = ph.names;
    let mut values = ph.values;

    let condition_expression = match condition {
        Some(condition) => {
            let compiled = compile(condition)?;
            names.extend(compiled.names.unwrap_or_default());
            values.extend(compiled.values.unwrap_or_default());
            Some(compiled.expression)
        }
        None => None,
    };

    debug!(
        model = %schema.model_name,
        update = %update_expression,
        condition = ?condition_expression,
        "update compiled"
    );

    Ok(CompiledUpdate {
        update_expression,
        condition_expression,
        names: (!names.is_empty()).then_some(names),
        values: (!values.is_empty()).then_some(values),
    })
}
