//! Cacheability analysis.
//!
//! Decides whether a lookup denotes exactly one deterministic row that the
//! key encoder and the invalidator can both reproduce. Any failed condition
//! sends the lookup down the uncached path; nothing here returns an error.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use super::descriptor::{LookupDescriptor, Operand, Operator, ScalarValue, Value};
use super::registry::AttributeSet;

/// The first condition a lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    NoDeclaredSets,
    AlreadyLoaded,
    NotEquality { field: String },
    DuplicateField { field: String },
    FieldSetMismatch { fields: Vec<String> },
    UnresolvedBind { field: String },
    AmbiguousBind { field: String },
    NonScalar { field: String },
    Modifier(&'static str),
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::NoDeclaredSets => f.write_str("no cacheable attribute sets declared"),
            Ineligible::AlreadyLoaded => f.write_str("result already loaded"),
            Ineligible::NotEquality { field } => write!(f, "`{field}` is not an equality"),
            Ineligible::DuplicateField { field } => {
                write!(f, "`{field}` is constrained more than once")
            }
            Ineligible::FieldSetMismatch { fields } => {
                write!(f, "fields [{}] match no declared set", fields.join(", "))
            }
            Ineligible::UnresolvedBind { field } => write!(f, "no bound value for `{field}`"),
            Ineligible::AmbiguousBind { field } => {
                write!(f, "several bound values for `{field}`")
            }
            Ineligible::NonScalar { field } => write!(f, "`{field}` is not a string or number"),
            Ineligible::Modifier(name) => write!(f, "query modifier `{name}` present"),
        }
    }
}

/// Field/value pairs of an eligible lookup, in constraint order.
pub type ResolvedPairs = Vec<(String, ScalarValue)>;

/// Returns true when the lookup may be served from or stored into the cache.
pub fn is_cacheable(descriptor: &LookupDescriptor, sets: &BTreeSet<AttributeSet>) -> bool {
    analyze(descriptor, sets).is_ok()
}

/// Runs every cacheability check and, on success, yields the resolved pairs
/// the cache key must be built from.
pub fn analyze(
    descriptor: &LookupDescriptor,
    sets: &BTreeSet<AttributeSet>,
) -> Result<ResolvedPairs, Ineligible> {
    let outcome = check(descriptor, sets);
    if let Err(reason) = &outcome {
        debug!(reason = %reason, "Lookup is not cacheable");
    }
    outcome
}

fn check(
    descriptor: &LookupDescriptor,
    sets: &BTreeSet<AttributeSet>,
) -> Result<ResolvedPairs, Ineligible> {
    if sets.is_empty() {
        return Err(Ineligible::NoDeclaredSets);
    }
    if descriptor.is_loaded() {
        return Err(Ineligible::AlreadyLoaded);
    }

    let constraints = descriptor.constraints();
    if let Some(constraint) = constraints.iter().find(|c| c.operator != Operator::Eq) {
        return Err(Ineligible::NotEquality {
            field: constraint.field.clone(),
        });
    }

    let mut fields: Vec<String> = constraints.iter().map(|c| c.field.clone()).collect();
    fields.sort();
    if let Some(pair) = fields.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(Ineligible::DuplicateField {
            field: pair[0].clone(),
        });
    }
    if !sets.iter().any(|set| set.matches(&fields)) {
        return Err(Ineligible::FieldSetMismatch { fields });
    }

    let mut pairs = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        let value = resolve_operand(descriptor, &constraint.field, &constraint.operand)?;
        let scalar = value.as_scalar().ok_or_else(|| Ineligible::NonScalar {
            field: constraint.field.clone(),
        })?;
        pairs.push((constraint.field.clone(), scalar));
    }

    if let Some(name) = descriptor.modifiers().first_present() {
        return Err(Ineligible::Modifier(name));
    }

    Ok(pairs)
}

fn resolve_operand<'a>(
    descriptor: &'a LookupDescriptor,
    field: &str,
    operand: &'a Operand,
) -> Result<&'a Value, Ineligible> {
    match operand {
        Operand::Literal(value) => Ok(value),
        Operand::BindParam => {
            let mut matches = descriptor
                .binds()
                .iter()
                .filter(|(name, _)| name == field)
                .map(|(_, value)| value);
            let value = matches.next().ok_or_else(|| Ineligible::UnresolvedBind {
                field: field.to_string(),
            })?;
            if matches.next().is_some() {
                return Err(Ineligible::AmbiguousBind {
                    field: field.to_string(),
                });
            }
            Ok(value)
        }
        Operand::Subquery(_) | Operand::Expression(_) => Err(Ineligible::NonScalar {
            field: field.to_string(),
        }),
    }
}
