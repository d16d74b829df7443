/// Condition trees and their compilation into expression text
///
/// Every field reference is emitted through a `#nK` name placeholder and
/// every operand through a `:vK` value placeholder, so reserved words and
/// odd attribute names never need special casing.

use crate::error::{Error, Result};
use crate::serializer::to_wire_value;
use crate::types::Item;
use crate::value::Value;
use std::collections::HashMap;
use std::ops::{BitAnd, BitOr, Not};

/// Comparison operator of a condition leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    Contains,
    Between,
    Exists,
    NotExists,
    In,
}

impl Operator {
    fn parse(op: &str) -> Option<Operator> {
        let op = match op {
            "=" | "eq" => Operator::Eq,
            "<>" | "ne" => Operator::Ne,
            "<" | "lt" => Operator::Lt,
            "<=" | "lte" => Operator::Le,
            ">" | "gt" => Operator::Gt,
            ">=" | "gte" => Operator::Ge,
            "begins_with" => Operator::BeginsWith,
            "contains" => Operator::Contains,
            "between" => Operator::Between,
            "attribute_exists" | "exists" => Operator::Exists,
            "attribute_not_exists" | "not_exists" => Operator::NotExists,
            "in" | "is_in" => Operator::In,
            _ => return None,
        };
        Some(op)
    }
}

/// Boolean predicate tree over item attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        path: String,
        op: Operator,
        operands: Vec<Value>,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// AND with anything convertible to a condition, including raw predicates.
    pub fn try_and(self, other: impl IntoCondition) -> Result<Condition> {
        Ok(self.and(other.into_condition()?))
    }

    /// OR with anything convertible to a condition, including raw predicates.
    pub fn try_or(self, other: impl IntoCondition) -> Result<Condition> {
        Ok(self.or(other.into_condition()?))
    }

    /// Builds a condition from a raw JSON predicate.
    ///
    /// Leaves look like `{"op": "=", "field": "age", "value": 18}`; `between`
    /// and `in` take `"values"`, the existence checks take no operand.
    /// Composites are `{"and": [..]}`, `{"or": [..]}` and `{"not": {..}}`.
    pub fn from_raw(raw: &serde_json::Value) -> Result<Condition> {
        let obj = match raw {
            serde_json::Value::Object(obj) => obj,
            other => {
                return Err(Error::InvalidCondition(format!(
                    "Expected Condition or raw predicate, got {}",
                    json_type_name(other)
                )))
            }
        };

        if let Some(children) = obj.get("and") {
            return fold_children(children, "and", Condition::and);
        }
        if let Some(children) = obj.get("or") {
            return fold_children(children, "or", Condition::or);
        }
        if let Some(inner) = obj.get("not") {
            return Ok(Condition::from_raw(inner)?.negate());
        }

        let op_name = obj
            .get("op")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidCondition("Expected Condition or raw predicate, got object without 'op'".to_string()))?;
        let op = Operator::parse(op_name)
            .ok_or_else(|| Error::InvalidCondition(format!("Unknown condition operator '{}'", op_name)))?;
        let path = obj
            .get("field")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidCondition(format!("Predicate '{}' requires a 'field'", op_name)))?
            .to_string();

        let operands = match op {
            Operator::Exists | Operator::NotExists => Vec::new(),
            Operator::Between | Operator::In => {
                let values = obj
                    .get("values")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| Error::InvalidCondition(format!("Predicate '{}' requires 'values'", op_name)))?;
                if op == Operator::Between && values.len() != 2 {
                    return Err(Error::InvalidCondition("between requires exactly two values".to_string()));
                }
                values.iter().map(Value::from_json).collect()
            }
            _ => {
                let value = obj
                    .get("value")
                    .ok_or_else(|| Error::InvalidCondition(format!("Predicate '{}' requires a 'value'", op_name)))?;
                vec![Value::from_json(value)]
            }
        };

        Ok(Condition::Compare { path, op, operands })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn fold_children(
    children: &serde_json::Value,
    key: &str,
    join: fn(Condition, Condition) -> Condition,
) -> Result<Condition> {
    let items = children
        .as_array()
        .ok_or_else(|| Error::InvalidCondition(format!("'{}' expects an array of predicates", key)))?;
    let mut iter = items.iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::InvalidCondition(format!("'{}' expects at least one predicate", key)))?;
    let mut acc = Condition::from_raw(first)?;
    for item in iter {
        acc = join(acc, Condition::from_raw(item)?);
    }
    Ok(acc)
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        self.and(rhs)
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        self.or(rhs)
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        self.negate()
    }
}

/// A predicate in raw JSON form, accepted wherever conditions compose.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPredicate(pub serde_json::Value);

impl TryFrom<RawPredicate> for Condition {
    type Error = Error;

    fn try_from(raw: RawPredicate) -> Result<Condition> {
        Condition::from_raw(&raw.0)
    }
}

/// Anything that can stand in for a condition node.
pub trait IntoCondition {
    fn into_condition(self) -> Result<Condition>;
}

impl IntoCondition for Condition {
    fn into_condition(self) -> Result<Condition> {
        Ok(self)
    }
}

impl IntoCondition for RawPredicate {
    fn into_condition(self) -> Result<Condition> {
        Condition::from_raw(&self.0)
    }
}

impl IntoCondition for serde_json::Value {
    fn into_condition(self) -> Result<Condition> {
        Condition::from_raw(&self)
    }
}

/// Reference to an attribute, the starting point for building conditions.
///
/// Paths may be dotted (`address.city`) to reach into maps.
#[derive(Debug, Clone)]
pub struct Attr {
    name: String,
}

impl Attr {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn leaf(&self, op: Operator, operands: Vec<Value>) -> Condition {
        Condition::Compare {
            path: self.name.clone(),
            op,
            operands,
        }
    }

    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Eq, vec![value.into()])
    }

    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Ne, vec![value.into()])
    }

    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Lt, vec![value.into()])
    }

    pub fn le(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Le, vec![value.into()])
    }

    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Gt, vec![value.into()])
    }

    pub fn ge(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Ge, vec![value.into()])
    }

    pub fn begins_with(&self, prefix: impl Into<Value>) -> Condition {
        self.leaf(Operator::BeginsWith, vec![prefix.into()])
    }

    /// Substring match on strings, membership on lists and sets.
    pub fn contains(&self, value: impl Into<Value>) -> Condition {
        self.leaf(Operator::Contains, vec![value.into()])
    }

    /// Inclusive range.
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        self.leaf(Operator::Between, vec![low.into(), high.into()])
    }

    pub fn exists(&self) -> Condition {
        self.leaf(Operator::Exists, Vec::new())
    }

    pub fn not_exists(&self) -> Condition {
        self.leaf(Operator::NotExists, Vec::new())
    }

    pub fn is_in<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.leaf(Operator::In, values.into_iter().map(Into::into).collect())
    }
}

/// Compiled expression text plus its placeholder tables.
///
/// Empty tables are `None` so they can be left out of a request entirely.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledExpression {
    pub expression: String,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
}

/// Placeholder allocator for one compilation.
pub(crate) struct Placeholders {
    name_prefix: &'static str,
    value_prefix: &'static str,
    next_name: usize,
    next_value: usize,
    pub(crate) names: HashMap<String, String>,
    pub(crate) values: Item,
}

impl Placeholders {
    pub(crate) fn new(name_prefix: &'static str, value_prefix: &'static str) -> Self {
        Self {
            name_prefix,
            value_prefix,
            next_name: 0,
            next_value: 0,
            names: HashMap::new(),
            values: Item::new(),
        }
    }

    pub(crate) fn name(&mut self, name: &str) -> String {
        let placeholder = format!("{}{}", self.name_prefix, self.next_name);
        self.next_name += 1;
        self.names.insert(placeholder.clone(), name.to_string());
        placeholder
    }

    /// One placeholder per path segment, joined back with dots.
    pub(crate) fn path(&mut self, path: &str) -> String {
        path.split('.')
            .map(|segment| self.name(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub(crate) fn value(&mut self, value: &Value) -> Result<String> {
        let encoded = to_wire_value(value)?;
        let placeholder = format!("{}{}", self.value_prefix, self.next_value);
        self.next_value += 1;
        self.values.insert(placeholder.clone(), encoded);
        Ok(placeholder)
    }

    pub(crate) fn finish(self, expression: String) -> CompiledExpression {
        CompiledExpression {
            expression,
            names: (!self.names.is_empty()).then_some(self.names),
            values: (!self.values.is_empty()).then_some(self.values),
        }
    }
}

/// Compiles a condition into expression text and placeholder tables.
pub fn compile(condition: &Condition) -> Result<CompiledExpression> {
    let mut placeholders = Placeholders::new("#n", ":v");
    let expression = render(condition, &mut placeholders)?;
    Ok(placeholders.finish(expression))
}

fn render(condition: &Condition, ph: &mut Placeholders) -> Result<String> {
    match condition {
        Condition::And(left, right) => {
            let l = render(left, ph)?;
            let r = render(right, ph)?;
            Ok(format!("({} AND {})", l, r))
        }
        Condition::Or(left, right) => {
            let l = render(left, ph)?;
            let r = render(right, ph)?;
            Ok(format!("({} OR {})", l, r))
        }
        Condition::Not(inner) => Ok(format!("(NOT {})", render(inner, ph)?)),
        Condition::Compare { path, op, operands } => render_leaf(path, *op, operands, ph),
    }
}

fn single<'a>(operands: &'a [Value], op: Operator) -> Result<&'a Value> {
    match operands {
        [value] => Ok(value),
        _ => Err(Error::InvalidCondition(format!(
            "{:?} takes exactly one operand, got {}",
            op,
            operands.len()
        ))),
    }
}

fn render_leaf(path: &str, op: Operator, operands: &[Value], ph: &mut Placeholders) -> Result<String> {
    let name = ph.path(path);
    let text = match op {
        Operator::Exists => format!("attribute_exists({})", name),
        Operator::NotExists => format!("attribute_not_exists({})", name),
        Operator::BeginsWith => format!("begins_with({}, {})", name, ph.value(single(operands, op)?)?),
        Operator::Contains => format!("contains({}, {})", name, ph.value(single(operands, op)?)?),
        Operator::Between => match operands {
            [low, high] => {
                let low = ph.value(low)?;
                let high = ph.value(high)?;
                format!("{} BETWEEN {} AND {}", name, low, high)
            }
            _ => return Err(Error::InvalidCondition("between requires exactly two values".to_string())),
        },
        Operator::In => {
            if operands.is_empty() {
                return Err(Error::InvalidCondition("IN requires at least one value".to_string()));
            }
            let values = operands
                .iter()
                .map(|v| ph.value(v))
                .collect::<Result<Vec<_>>>()?;
            format!("{} IN ({})", name, values.join(", "))
        }
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            let symbol = match op {
                Operator::Eq => "=",
                Operator::Ne => "<>",
                Operator::Lt => "<",
                Operator::Le => "<=",
                Operator::Gt => ">",
                _ => ">=",
            };
            format!("{} {} {}", name, symbol, ph.value(single(operands, op)?)?)
        }
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeValue;

    #[test]
    fn test_simple_comparison() {
        let compiled = compile(&Attr::new("age").ge(18)).unwrap();
        assert_eq!(compiled.expression, "#n0 >= :v0");
        assert_eq!(compiled.names.unwrap()["#n0"], "age");
        assert_eq!(compiled.values.unwrap()[":v0"], AttributeValue::N("18".into()));
    }

    #[test]
    fn test_exists_has_no_value_map() {
        let compiled = compile(&Attr::new("email").not_exists()).unwrap();
        assert_eq!(compiled.expression, "attribute_not_exists(#n0)");
        assert!(compiled.names.is_some());
        assert!(compiled.values.is_none());
    }

    #[test]
    fn test_reserved_word_goes_through_placeholder() {
        let compiled = compile(&Attr::new("status").eq("active")).unwrap();
        assert!(!compiled.expression.contains("status"));
        assert_eq!(compiled.names.unwrap()["#n0"], "status");
    }

    #[test]
    fn test_composites_are_parenthesised() {
        let cond = (Attr::new("age").ge(18) & Attr::new("status").eq("active")) | !Attr::new("banned").exists();
        let compiled = compile(&cond).unwrap();
        assert_eq!(
            compiled.expression,
            "((#n0 >= :v0 AND #n1 = :v1) OR (NOT attribute_exists(#n2)))"
        );
        assert_eq!(compiled.names.unwrap().len(), 3);
        assert_eq!(compiled.values.unwrap().len(), 2);
    }

    #[test]
    fn test_functions_and_ranges() {
        let compiled = compile(&Attr::new("name").begins_with("A")).unwrap();
        assert_eq!(compiled.expression, "begins_with(#n0, :v0)");

        let compiled = compile(&Attr::new("tags").contains("premium")).unwrap();
        assert_eq!(compiled.expression, "contains(#n0, :v0)");

        let compiled = compile(&Attr::new("age").between(18, 65)).unwrap();
        assert_eq!(compiled.expression, "#n0 BETWEEN :v0 AND :v1");

        let compiled = compile(&Attr::new("status").is_in(["a", "b", "c"])).unwrap();
        assert_eq!(compiled.expression, "#n0 IN (:v0, :v1, :v2)");
        assert_eq!(compiled.values.unwrap().len(), 3);
    }

    #[test]
    fn test_nested_path_uses_one_placeholder_per_segment() {
        let compiled = compile(&Attr::new("address.city").eq("Oslo")).unwrap();
        assert_eq!(compiled.expression, "#n0.#n1 = :v0");
        let names = compiled.names.unwrap();
        assert_eq!(names["#n0"], "address");
        assert_eq!(names["#n1"], "city");
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let cond = Attr::new("a").eq(1) & Attr::new("b").lt(2.5);
        assert_eq!(compile(&cond).unwrap(), compile(&cond).unwrap());
    }

    #[test]
    fn test_serialization_error_bubbles_up() {
        let err = compile(&Attr::new("score").eq(f64::INFINITY)).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_empty_in_is_rejected() {
        let err = compile(&Attr::new("x").is_in(Vec::<i64>::new())).unwrap_err();
        assert!(matches!(err, Error::InvalidCondition(_)));
    }

    #[test]
    fn test_raw_predicate_wraps_into_node() {
        let raw = serde_json::json!({
            "and": [
                {"op": "=", "field": "status", "value": "active"},
                {"not": {"op": "attribute_exists", "field": "deleted"}},
                {"op": "between", "field": "age", "values": [18, 65]}
            ]
        });
        let cond = Condition::from_raw(&raw).unwrap();
        let expected = Attr::new("status").eq("active") & !Attr::new("deleted").exists() & Attr::new("age").between(18, 65);
        assert_eq!(cond, expected);
    }

    #[test]
    fn test_raw_predicate_composes_with_nodes() {
        let cond = Attr::new("a")
            .eq(1)
            .try_or(RawPredicate(serde_json::json!({"op": "<", "field": "b", "value": 2})))
            .unwrap();
        assert_eq!(compile(&cond).unwrap().expression, "(#n0 = :v0 OR #n1 < :v1)");
    }

    #[test]
    fn test_non_predicate_is_a_type_error() {
        let err = Attr::new("a").eq(1).try_and(serde_json::json!(42)).unwrap_err();
        assert!(matches!(err, Error::InvalidCondition(ref m) if m.contains("got number")));

        let err = Condition::try_from(RawPredicate(serde_json::json!({"op": "~", "field": "a", "value": 1}))).unwrap_err();
        assert!(matches!(err, Error::InvalidCondition(_)));
    }
}
