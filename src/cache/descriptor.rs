//! Lookup descriptors.
//!
//! A `LookupDescriptor` is the host data-access layer's description of one
//! "fetch a single record" operation: its `WHERE` constraints plus every query
//! modifier that could change which row comes back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value appearing on the right-hand side of a constraint or in a bound pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Narrow to a scalar usable in a cache key, if this value is one.
    ///
    /// Only strings, integers and finite floats qualify.
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match self {
            Value::Str(value) => Some(ScalarValue::Str(value.clone())),
            Value::Int(value) => Some(ScalarValue::Int(*value)),
            Value::Float(value) if value.is_finite() => Some(ScalarValue::Float(*value)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A primitive value that may participate in a cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Str(value) => f.write_str(value),
            ScalarValue::Int(value) => write!(f, "{value}"),
            // -0.0 and 0.0 select the same rows and must share a key.
            ScalarValue::Float(value) if *value == 0.0 => f.write_str("0"),
            ScalarValue::Float(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Str(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Str(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

/// Comparison operator of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Like,
    IsNull,
    IsNotNull,
    Between,
}

/// Right-hand side of a constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal value inlined into the query.
    Literal(Value),
    /// A placeholder whose value lives in the descriptor's bound pairs.
    BindParam,
    /// A nested query; never resolvable to a scalar.
    Subquery(String),
    /// A raw SQL fragment; never resolvable to a scalar.
    Expression(String),
}

/// One `(field, operator, operand)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Constraint {
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator,
            operand,
        }
    }
}

/// Row lock requested by the lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMode {
    ForUpdate,
    ForShare,
    Custom(String),
}

/// Query modifiers that alter row selection beyond the constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryModifiers {
    pub offset: Option<u64>,
    pub joins: Vec<String>,
    pub order: Vec<String>,
    pub reverse_order: bool,
    pub includes: Vec<String>,
    pub preload: Vec<String>,
    pub select: Vec<String>,
    pub group: Vec<String>,
    pub from: Option<String>,
    pub lock: Option<LockMode>,
}

impl QueryModifiers {
    /// Name of the first modifier that is set, if any.
    pub fn first_present(&self) -> Option<&'static str> {
        if self.offset.is_some() {
            Some("offset")
        } else if !self.joins.is_empty() {
            Some("joins")
        } else if !self.order.is_empty() {
            Some("order")
        } else if self.reverse_order {
            Some("reverse_order")
        } else if !self.includes.is_empty() {
            Some("includes")
        } else if !self.preload.is_empty() {
            Some("preload")
        } else if !self.select.is_empty() {
            Some("select")
        } else if !self.group.is_empty() {
            Some("group")
        } else if self.from.is_some() {
            Some("from")
        } else if self.lock.is_some() {
            Some("lock")
        } else {
            None
        }
    }
}

/// Declarative description of a single-record lookup.
///
/// Built per request by the host and never persisted.
///
/// ```
/// use finder_cache::cache::LookupDescriptor;
///
/// let lookup = LookupDescriptor::new()
///     .where_eq("email", "a@example.com")
///     .order("id");
/// assert_eq!(lookup.constraints().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupDescriptor {
    constraints: Vec<Constraint>,
    binds: Vec<(String, Value)>,
    modifiers: QueryModifiers,
    loaded: bool,
}

impl LookupDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn binds(&self) -> &[(String, Value)] {
        &self.binds
    }

    pub fn modifiers(&self) -> &QueryModifiers {
        &self.modifiers
    }

    pub fn modifiers_mut(&mut self) -> &mut QueryModifiers {
        &mut self.modifiers
    }

    /// Whether the host has already materialized this lookup's result.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(Constraint::new(
            field,
            Operator::Eq,
            Operand::Literal(value.into()),
        ))
    }

    pub fn where_op(
        self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.constraint(Constraint::new(
            field,
            operator,
            Operand::Literal(value.into()),
        ))
    }

    /// Equality against a placeholder; pair it with [`LookupDescriptor::bind`].
    pub fn where_bind(self, field: impl Into<String>) -> Self {
        self.constraint(Constraint::new(field, Operator::Eq, Operand::BindParam))
    }

    pub fn bind(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.binds.push((field.into(), value.into()));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.modifiers.offset = Some(offset);
        self
    }

    pub fn joins(mut self, join: impl Into<String>) -> Self {
        self.modifiers.joins.push(join.into());
        self
    }

    pub fn order(mut self, clause: impl Into<String>) -> Self {
        self.modifiers.order.push(clause.into());
        self
    }

    pub fn reverse_order(mut self) -> Self {
        self.modifiers.reverse_order = !self.modifiers.reverse_order;
        self
    }

    pub fn includes(mut self, association: impl Into<String>) -> Self {
        self.modifiers.includes.push(association.into());
        self
    }

    pub fn preload(mut self, association: impl Into<String>) -> Self {
        self.modifiers.preload.push(association.into());
        self
    }

    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.modifiers.select.push(column.into());
        self
    }

    pub fn group(mut self, column: impl Into<String>) -> Self {
        self.modifiers.group.push(column.into());
        self
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.modifiers.from = Some(source.into());
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.modifiers.lock = Some(mode);
        self
    }

    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }
}
