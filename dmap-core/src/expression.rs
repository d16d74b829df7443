/// Expression parsing and evaluation over wire items
///
/// This is the store side of the expression language: it parses the key
/// condition, filter, condition and update expressions that the compilers
/// emit and applies them to [`Item`]s. The in-memory executor is built on it.
///
/// Supports:
/// - comparisons `=`, `<>`, `<`, `<=`, `>`, `>=`, `BETWEEN`, `IN`
/// - `AND`, `OR`, `NOT` and parentheses
/// - `attribute_exists`, `attribute_not_exists`, `begins_with`, `contains`
/// - dotted document paths (`#a.#b`)
/// - update clauses `SET` (with `+` and `-`), `REMOVE`, `ADD`, `DELETE`
///
/// ```ignore
/// let context = ExpressionContext::new()
///     .with_name("#n0", "age")
///     .with_value(":v0", AttributeValue::N("18".into()));
/// let expr = ConditionParser::parse("#n0 >= :v0", &context)?;
/// assert!(Evaluator::new(&item, &context).evaluate(&expr)?);
/// ```

use crate::error::Fault;
use crate::serializer::decode_number;
use crate::types::{AttributeValue, Item};
use crate::value::Number;
use std::cmp::Ordering;
use std::collections::HashMap;

pub type EvalResult<T> = std::result::Result<T, Fault>;

fn invalid(message: impl Into<String>) -> Fault {
    Fault::new("ValidationException", message)
}

/// Resolved document path, one entry per map level
pub type Path = Vec<String>;

/// Operand of a condition or update value
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Path),
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Condition AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare(CompareOp, Operand, Operand),
    Between(Operand, Operand, Operand),
    In(Operand, Vec<Operand>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    AttributeExists(Path),
    AttributeNotExists(Path),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
}

/// Placeholder tables of one request
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext {
    pub names: HashMap<String, String>,
    pub values: Item,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(names: Option<&HashMap<String, String>>, values: Option<&Item>) -> Self {
        Self {
            names: names.cloned().unwrap_or_default(),
            values: values.cloned().unwrap_or_default(),
        }
    }

    pub fn with_name(mut self, placeholder: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), name.into());
        self
    }

    pub fn with_value(mut self, placeholder: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    fn name(&self, token: &str) -> EvalResult<String> {
        if token.starts_with('#') {
            self.names.get(token).cloned().ok_or_else(|| {
                invalid(format!(
                    "An expression attribute name used in the document path is not defined; attribute name: {}",
                    token
                ))
            })
        } else {
            Ok(token.to_string())
        }
    }

    fn value(&self, placeholder: &str) -> EvalResult<&AttributeValue> {
        self.values.get(placeholder).ok_or_else(|| {
            invalid(format!(
                "An expression attribute value used in expression is not defined; attribute value: {}",
                placeholder
            ))
        })
    }
}

/// Looks up a document path in an item.
pub fn lookup<'i>(item: &'i Item, path: &[String]) -> Option<&'i AttributeValue> {
    let (first, rest) = path.split_first()?;
    let mut current = item.get(first)?;
    for segment in rest {
        current = current.as_m()?.get(segment)?;
    }
    Some(current)
}

fn number(text: &str) -> EvalResult<Number> {
    decode_number(text, "").map_err(|e| invalid(e.to_string()))
}

fn numbers_equal(a: &str, b: &str) -> bool {
    match (number(a), number(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering for scalar values of the same type, `None` otherwise.
pub fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::N(a), AttributeValue::N(b)) => Some(number(a).ok()?.cmp(&number(b).ok()?)),
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

fn same_members<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| eq(x, y)))
}

/// Value equality with numeric comparison of numbers and unordered sets.
pub fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::N(a), AttributeValue::N(b)) => numbers_equal(a, b),
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => same_members(a, b, |x, y| numbers_equal(x, y)),
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => same_members(a, b, |x, y| x == y),
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => same_members(a, b, |x, y| x == y),
        (AttributeValue::L(a), AttributeValue::L(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (AttributeValue::M(a), AttributeValue::M(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => left == right,
    }
}

/// Condition evaluator for one item
pub struct Evaluator<'a> {
    item: &'a Item,
    context: &'a ExpressionContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(item: &'a Item, context: &'a ExpressionContext) -> Self {
        Self { item, context }
    }

    pub fn evaluate(&self, expr: &Expr) -> EvalResult<bool> {
        match expr {
            Expr::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Expr::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::AttributeExists(path) => Ok(lookup(self.item, path).is_some()),
            Expr::AttributeNotExists(path) => Ok(lookup(self.item, path).is_none()),
            Expr::Compare(op, left, right) => {
                let l = self.resolve(left)?;
                let r = self.resolve(right)?;
                let (l, r) = match (l, r) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return Ok(*op == CompareOp::Ne),
                };
                Ok(match op {
                    CompareOp::Eq => values_equal(l, r),
                    CompareOp::Ne => !values_equal(l, r),
                    CompareOp::Lt => compare(l, r) == Some(Ordering::Less),
                    CompareOp::Le => matches!(compare(l, r), Some(Ordering::Less | Ordering::Equal)),
                    CompareOp::Gt => compare(l, r) == Some(Ordering::Greater),
                    CompareOp::Ge => matches!(compare(l, r), Some(Ordering::Greater | Ordering::Equal)),
                })
            }
            Expr::Between(target, low, high) => {
                match (self.resolve(target)?, self.resolve(low)?, self.resolve(high)?) {
                    (Some(v), Some(lo), Some(hi)) => Ok(matches!(
                        compare(v, lo),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(compare(v, hi), Some(Ordering::Less | Ordering::Equal))),
                    _ => Ok(false),
                }
            }
            Expr::In(target, candidates) => {
                let Some(v) = self.resolve(target)? else {
                    return Ok(false);
                };
                for candidate in candidates {
                    if let Some(c) = self.resolve(candidate)? {
                        if values_equal(v, c) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Expr::BeginsWith(target, prefix) => match (self.resolve(target)?, self.resolve(prefix)?) {
                (Some(AttributeValue::S(s)), Some(AttributeValue::S(p))) => Ok(s.starts_with(p.as_str())),
                (Some(AttributeValue::B(b)), Some(AttributeValue::B(p))) => Ok(b.starts_with(p.as_ref())),
                _ => Ok(false),
            },
            Expr::Contains(target, needle) => match (self.resolve(target)?, self.resolve(needle)?) {
                (Some(AttributeValue::S(s)), Some(AttributeValue::S(n))) => Ok(s.contains(n.as_str())),
                (Some(AttributeValue::Ss(set)), Some(AttributeValue::S(n))) => Ok(set.contains(n)),
                (Some(AttributeValue::Ns(set)), Some(AttributeValue::N(n))) => {
                    Ok(set.iter().any(|m| numbers_equal(m, n)))
                }
                (Some(AttributeValue::Bs(set)), Some(AttributeValue::B(n))) => Ok(set.contains(n)),
                (Some(AttributeValue::L(list)), Some(n)) => Ok(list.iter().any(|m| values_equal(m, n))),
                _ => Ok(false),
            },
        }
    }

    fn resolve(&self, operand: &Operand) -> EvalResult<Option<&'a AttributeValue>> {
        match operand {
            Operand::Path(path) => Ok(lookup(self.item, path)),
            Operand::Value(placeholder) => self.context.value(placeholder).map(Some),
        }
    }
}

/// Right-hand side of a SET action
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Operand(Operand),
    Plus(Operand, Operand),
    Minus(Operand, Operand),
}

/// One parsed update action
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Path, SetValue),
    Remove(Path),
    Add(Path, Operand),
    Delete(Path, Operand),
}

fn arithmetic(left: &AttributeValue, right: &AttributeValue, subtract: bool) -> EvalResult<AttributeValue> {
    let (AttributeValue::N(a), AttributeValue::N(b)) = (left, right) else {
        return Err(invalid(
            "An operand in the update expression has an incorrect data type",
        ));
    };
    let (x, y) = (number(a)?, number(b)?);
    let result = match (&x, &y) {
        (Number::Int(i), Number::Int(j)) => {
            let exact = if subtract { i.checked_sub(*j) } else { i.checked_add(*j) };
            match exact {
                Some(n) => Number::Int(n),
                None => Number::Float(if subtract { x.as_f64() - y.as_f64() } else { x.as_f64() + y.as_f64() }),
            }
        }
        _ => Number::Float(if subtract { x.as_f64() - y.as_f64() } else { x.as_f64() + y.as_f64() }),
    };
    result
        .to_decimal_text()
        .map(AttributeValue::N)
        .ok_or_else(|| invalid("Number overflow in update expression"))
}

fn set_union(existing: &AttributeValue, addition: &AttributeValue) -> EvalResult<AttributeValue> {
    let merged = match (existing, addition) {
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().filter(|x| !a.contains(x)).cloned());
            AttributeValue::Ss(out)
        }
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            let mut out = a.clone();
            out.extend(
                b.iter()
                    .filter(|x| !a.iter().any(|y| numbers_equal(x, y)))
                    .cloned(),
            );
            AttributeValue::Ns(out)
        }
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().filter(|x| !a.contains(x)).cloned());
            AttributeValue::Bs(out)
        }
        (AttributeValue::N(_), AttributeValue::N(_)) => arithmetic(existing, addition, false)?,
        _ => {
            return Err(invalid(
                "An operand in the update expression has an incorrect data type",
            ))
        }
    };
    Ok(merged)
}

// None when the set ends up empty
fn set_difference(existing: &AttributeValue, removal: &AttributeValue) -> EvalResult<Option<AttributeValue>> {
    let remaining = match (existing, removal) {
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => {
            let out: Vec<_> = a.iter().filter(|x| !b.contains(x)).cloned().collect();
            (!out.is_empty()).then_some(AttributeValue::Ss(out))
        }
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            let out: Vec<_> = a
                .iter()
                .filter(|x| !b.iter().any(|y| numbers_equal(x, y)))
                .cloned()
                .collect();
            (!out.is_empty()).then_some(AttributeValue::Ns(out))
        }
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => {
            let out: Vec<_> = a.iter().filter(|x| !b.contains(x)).cloned().collect();
            (!out.is_empty()).then_some(AttributeValue::Bs(out))
        }
        _ => {
            return Err(invalid(
                "An operand in the update expression has an incorrect data type",
            ))
        }
    };
    Ok(remaining)
}

fn write_path(item: &mut Item, path: &[String], value: AttributeValue) -> EvalResult<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(invalid("Empty document path"));
    };
    let mut target = item;
    for segment in parents {
        target = match target.get_mut(segment) {
            Some(AttributeValue::M(map)) => map,
            _ => {
                return Err(invalid(
                    "The document path provided in the update expression is invalid for update",
                ))
            }
        };
    }
    target.insert(last.clone(), value);
    Ok(())
}

fn remove_path(item: &mut Item, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut target = item;
    for segment in parents {
        target = match target.get_mut(segment) {
            Some(AttributeValue::M(map)) => map,
            _ => return,
        };
    }
    target.remove(last);
}

/// Applies parsed update actions to an item
pub struct UpdateExecutor<'a> {
    context: &'a ExpressionContext,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(context: &'a ExpressionContext) -> Self {
        Self { context }
    }

    /// Returns the updated copy of `item`. Right-hand paths read the item as
    /// it was before the update.
    pub fn execute(&self, item: &Item, ops: &[UpdateOp]) -> EvalResult<Item> {
        let mut result = item.clone();
        for op in ops {
            match op {
                UpdateOp::Set(path, value) => {
                    let resolved = match value {
                        SetValue::Operand(operand) => self.operand(item, operand)?.clone(),
                        SetValue::Plus(l, r) => arithmetic(self.operand(item, l)?, self.operand(item, r)?, false)?,
                        SetValue::Minus(l, r) => arithmetic(self.operand(item, l)?, self.operand(item, r)?, true)?,
                    };
                    write_path(&mut result, path, resolved)?;
                }
                UpdateOp::Remove(path) => remove_path(&mut result, path),
                UpdateOp::Add(path, operand) => {
                    let addition = self.operand(item, operand)?;
                    if !(matches!(addition, AttributeValue::N(_)) || addition.is_set()) {
                        return Err(invalid(
                            "Incorrect operand type for operator or function; operator: ADD",
                        ));
                    }
                    let merged = match lookup(&result, path) {
                        Some(existing) => set_union(existing, addition)?,
                        None => addition.clone(),
                    };
                    write_path(&mut result, path, merged)?;
                }
                UpdateOp::Delete(path, operand) => {
                    let removal = self.operand(item, operand)?;
                    if let Some(existing) = lookup(&result, path) {
                        match set_difference(existing, removal)? {
                            Some(remaining) => write_path(&mut result, path, remaining)?,
                            None => remove_path(&mut result, path),
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    fn operand<'i>(&'i self, item: &'i Item, operand: &Operand) -> EvalResult<&'i AttributeValue> {
        match operand {
            Operand::Value(placeholder) => self.context.value(placeholder),
            Operand::Path(path) => lookup(item, path).ok_or_else(|| {
                invalid("The provided expression refers to an attribute that does not exist in the item")
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    Plus,
    Minus,
    Identifier(String),
    NamePlaceholder(String),
    ValuePlaceholder(String),
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Eof,
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.pos].iter().collect()
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn next_token(&mut self) -> EvalResult<Token> {
        while matches!(self.current(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }

        let token = match self.current() {
            None => Token::Eof,
            Some('(') => self.single(Token::LeftParen),
            Some(')') => self.single(Token::RightParen),
            Some(',') => self.single(Token::Comma),
            Some('.') => self.single(Token::Dot),
            Some('+') => self.single(Token::Plus),
            Some('-') => self.single(Token::Minus),
            Some('=') => self.single(Token::Equal),
            Some('<') => {
                self.advance();
                match self.current() {
                    Some('>') => self.single(Token::NotEqual),
                    Some('=') => self.single(Token::LessThanOrEqual),
                    _ => Token::LessThan,
                }
            }
            Some('>') => {
                self.advance();
                match self.current() {
                    Some('=') => self.single(Token::GreaterThanOrEqual),
                    _ => Token::GreaterThan,
                }
            }
            Some('#') => {
                self.advance();
                Token::NamePlaceholder(format!("#{}", self.read_identifier()))
            }
            Some(':') => {
                self.advance();
                Token::ValuePlaceholder(format!(":{}", self.read_identifier()))
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                match ident.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "BETWEEN" => Token::Between,
                    "IN" => Token::In,
                    "SET" => Token::Set,
                    "REMOVE" => Token::Remove,
                    "ADD" => Token::Add,
                    "DELETE" => Token::Delete,
                    _ => Token::Identifier(ident),
                }
            }
            Some(ch) => return Err(invalid(format!("Invalid expression: unexpected character '{}'", ch))),
        };
        Ok(token)
    }

    fn tokenize(input: &str) -> EvalResult<Vec<Token>> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let is_eof = token == Token::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }
}

/// Shared token cursor of both parsers
struct Cursor<'c> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'c ExpressionContext,
}

impl<'c> Cursor<'c> {
    fn new(input: &str, context: &'c ExpressionContext) -> EvalResult<Self> {
        Ok(Self {
            tokens: Lexer::tokenize(input)?,
            pos: 0,
            context,
        })
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> EvalResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(invalid(format!(
                "Invalid expression: expected {:?}, got {:?}",
                expected,
                self.current()
            )))
        }
    }

    fn finish(&self) -> EvalResult<()> {
        match self.current() {
            Token::Eof => Ok(()),
            other => Err(invalid(format!("Invalid expression: unexpected {:?}", other))),
        }
    }

    fn path(&mut self) -> EvalResult<Path> {
        let mut path = vec![self.segment()?];
        while self.eat(&Token::Dot) {
            path.push(self.segment()?);
        }
        Ok(path)
    }

    fn segment(&mut self) -> EvalResult<String> {
        let name = match self.current() {
            Token::Identifier(name) | Token::NamePlaceholder(name) => name.clone(),
            other => {
                return Err(invalid(format!(
                    "Invalid expression: expected attribute path, got {:?}",
                    other
                )))
            }
        };
        self.advance();
        self.context.name(&name)
    }

    fn operand(&mut self) -> EvalResult<Operand> {
        match self.current().clone() {
            Token::ValuePlaceholder(placeholder) => {
                self.context.value(&placeholder)?;
                self.advance();
                Ok(Operand::Value(placeholder))
            }
            _ => Ok(Operand::Path(self.path()?)),
        }
    }
}

/// Parser for key condition, filter and condition expressions
pub struct ConditionParser;

impl ConditionParser {
    pub fn parse(input: &str, context: &ExpressionContext) -> EvalResult<Expr> {
        let mut cursor = Cursor::new(input, context)?;
        let expr = Self::or(&mut cursor)?;
        cursor.finish()?;
        Ok(expr)
    }

    fn or(c: &mut Cursor) -> EvalResult<Expr> {
        let mut left = Self::and(c)?;
        while c.eat(&Token::Or) {
            let right = Self::and(c)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(c: &mut Cursor) -> EvalResult<Expr> {
        let mut left = Self::not(c)?;
        while c.eat(&Token::And) {
            let right = Self::not(c)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(c: &mut Cursor) -> EvalResult<Expr> {
        if c.eat(&Token::Not) {
            Ok(Expr::Not(Box::new(Self::not(c)?)))
        } else {
            Self::primary(c)
        }
    }

    fn primary(c: &mut Cursor) -> EvalResult<Expr> {
        if c.eat(&Token::LeftParen) {
            let inner = Self::or(c)?;
            c.expect(Token::RightParen)?;
            return Ok(inner);
        }

        if let (Token::Identifier(name), Token::LeftParen) = (c.current().clone(), c.peek().clone()) {
            return Self::function(c, &name);
        }

        let left = c.operand()?;
        let op = match c.current().clone() {
            Token::Equal => CompareOp::Eq,
            Token::NotEqual => CompareOp::Ne,
            Token::LessThan => CompareOp::Lt,
            Token::LessThanOrEqual => CompareOp::Le,
            Token::GreaterThan => CompareOp::Gt,
            Token::GreaterThanOrEqual => CompareOp::Ge,
            Token::Between => {
                c.advance();
                let low = c.operand()?;
                c.expect(Token::And)?;
                let high = c.operand()?;
                return Ok(Expr::Between(left, low, high));
            }
            Token::In => {
                c.advance();
                c.expect(Token::LeftParen)?;
                let mut candidates = vec![c.operand()?];
                while c.eat(&Token::Comma) {
                    candidates.push(c.operand()?);
                }
                c.expect(Token::RightParen)?;
                return Ok(Expr::In(left, candidates));
            }
            other => {
                return Err(invalid(format!(
                    "Invalid expression: expected comparison, got {:?}",
                    other
                )))
            }
        };
        c.advance();
        let right = c.operand()?;
        Ok(Expr::Compare(op, left, right))
    }

    fn function(c: &mut Cursor, name: &str) -> EvalResult<Expr> {
        c.advance();
        c.expect(Token::LeftParen)?;
        let expr = match name {
            "attribute_exists" => Expr::AttributeExists(c.path()?),
            "attribute_not_exists" => Expr::AttributeNotExists(c.path()?),
            "begins_with" | "contains" => {
                let target = c.operand()?;
                c.expect(Token::Comma)?;
                let arg = c.operand()?;
                if name == "begins_with" {
                    Expr::BeginsWith(target, arg)
                } else {
                    Expr::Contains(target, arg)
                }
            }
            other => return Err(invalid(format!("Invalid function name; function: {}", other))),
        };
        c.expect(Token::RightParen)?;
        Ok(expr)
    }
}

/// Parser for update expressions
pub struct UpdateParser;

impl UpdateParser {
    pub fn parse(input: &str, context: &ExpressionContext) -> EvalResult<Vec<UpdateOp>> {
        let mut c = Cursor::new(input, context)?;
        let mut ops = Vec::new();

        while c.current() != &Token::Eof {
            let clause = c.current().clone();
            c.advance();
            loop {
                let op = match &clause {
                    Token::Set => {
                        let path = c.path()?;
                        c.expect(Token::Equal)?;
                        let first = c.operand()?;
                        let value = if c.eat(&Token::Plus) {
                            SetValue::Plus(first, c.operand()?)
                        } else if c.eat(&Token::Minus) {
                            SetValue::Minus(first, c.operand()?)
                        } else {
                            SetValue::Operand(first)
                        };
                        UpdateOp::Set(path, value)
                    }
                    Token::Remove => UpdateOp::Remove(c.path()?),
                    Token::Add => {
                        let path = c.path()?;
                        UpdateOp::Add(path, c.operand()?)
                    }
                    Token::Delete => {
                        let path = c.path()?;
                        UpdateOp::Delete(path, c.operand()?)
                    }
                    other => {
                        return Err(invalid(format!(
                            "Invalid UpdateExpression: unexpected {:?}",
                            other
                        )))
                    }
                };
                ops.push(op);
                if !c.eat(&Token::Comma) {
                    break;
                }
            }
        }

        if ops.is_empty() {
            return Err(invalid("Invalid UpdateExpression: The expression can not be empty"));
        }
        Ok(ops)
    }
}
