//! Choices: unknown configuration values resolved during generation.
//!
//! A choice is created unknown, optionally carries a `default` (plain value
//! or strategy) and a `strategy`, and becomes known forever in its universe
//! once `set_value` runs. Enum choices narrow a declared value list through
//! a growing `impossible_values` set; integer choices enforce their bounds.

use std::sync::Arc;

use crate::cond::Cond;
use crate::error::{ChoiceError, LogicError, WorldResult};
use crate::rng::RngFactory;
use crate::store::{Obj, Value};
use crate::strategy::{Strategy, Token};
use crate::typedef::{BaseHooks, OBJECT, TypeDef, TypeHooks};

pub struct NumericalHooks;

impl TypeHooks for NumericalHooks {
    fn test_constraints(&self, choice: &Obj, value: &Value) -> WorldResult<()> {
        if let Value::Int(n) = value {
            let minimum = choice.int_attr("minimum");
            let maximum = choice.int_attr("maximum");
            let below = minimum.is_some_and(|m| *n < m);
            let above = maximum.is_some_and(|m| *n > m);
            if below || above {
                return Err(ChoiceError::OutOfRange {
                    value: *n,
                    minimum,
                    maximum,
                }
                .into());
            }
        }
        Ok(())
    }
}

pub struct EnumHooks;

impl TypeHooks for EnumHooks {
    fn fast_deduce(&self, obj: &Obj) -> WorldResult<()> {
        enum_fast_deduce(obj)
    }

    fn test_constraints(&self, choice: &Obj, value: &Value) -> WorldResult<()> {
        let Value::Str(s) = value else {
            return Err(ChoiceError::InvalidEnumValue {
                value: format!("{value:?}"),
            }
            .into());
        };
        if !values(choice).iter().any(|v| v.as_ref() == s.as_ref()) {
            return Err(ChoiceError::InvalidEnumValue {
                value: s.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// An unknown value, resolved by a strategy during generation.
pub static CHOICE: TypeDef = TypeDef {
    name: "Choice",
    base: Some(&OBJECT),
    hooks: &BaseHooks,
};

/// A choice with a numerical value and optional bounds.
pub static NUMERICAL_CHOICE: TypeDef = TypeDef {
    name: "NumericalChoice",
    base: Some(&CHOICE),
    hooks: &NumericalHooks,
};

/// A numerical choice restricted to integers.
pub static INTEGER_CHOICE: TypeDef = TypeDef {
    name: "IntegerChoice",
    base: Some(&NUMERICAL_CHOICE),
    hooks: &NumericalHooks,
};

/// A choice holding exactly one of a pre-declared list of string values.
pub static ENUM_CHOICE: TypeDef = TypeDef {
    name: "EnumChoice",
    base: Some(&CHOICE),
    hooks: &EnumHooks,
};

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn new() -> WorldResult<Obj> {
    crate::tree::new_object(&CHOICE)
}

pub fn integer(
    minimum: Option<i64>,
    maximum: Option<i64>,
    default: Option<i64>,
) -> WorldResult<Obj> {
    let c = crate::tree::new_object(&INTEGER_CHOICE)?;
    if let Some(m) = minimum {
        c.set("minimum", m)?;
    }
    if let Some(m) = maximum {
        c.set("maximum", m)?;
    }
    if let Some(d) = default {
        c.set("default", d)?;
    }
    Ok(c)
}

pub fn enumeration(value_list: &[&str]) -> WorldResult<Obj> {
    enumeration_of(&ENUM_CHOICE, value_list)
}

/// Enum constructor shared with enum subtypes.
pub fn enumeration_of(kind: &'static TypeDef, value_list: &[&str]) -> WorldResult<Obj> {
    let c = crate::tree::new_object(kind)?;
    c.set(
        "values",
        Value::Tuple(value_list.iter().map(|v| Value::Str((*v).into())).collect()),
    )?;
    Ok(c)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub fn known(c: &Obj) -> bool {
    c.bool_attr("known", false)
}

/// The chosen value. Readable only once known.
pub fn value(c: &Obj) -> WorldResult<Value> {
    if !known(c) {
        return Err(ChoiceError::ValueNotSet {
            path: c.string_path(),
        }
        .into());
    }
    c.req("_value")
}

pub(crate) fn value_str(c: &Obj) -> Option<Arc<str>> {
    match c.get("_value") {
        Some(Value::Str(s)) => Some(s),
        _ => None,
    }
}

/// Set the choice's value: constraints, store, hooks, dependency update.
pub fn set_value(c: &Obj, value: impl Into<Value>) -> WorldResult<()> {
    let value = value.into();
    c.kind().hooks.test_constraints(c, &value)?;
    c.set("_value", value.clone())?;
    c.set("known", true)?;
    c.kind().hooks.on_set(c, &value)?;
    if let Some(parent) = c.parent() {
        parent.kind().hooks.on_choice(&parent, c)?;
    }
    c.updated()
}

/// The effective default: the `default` attribute, else the type default
/// (enums pick evenly, ports connect randomly).
pub fn default_of(c: &Obj) -> Option<Value> {
    match c.get("default") {
        Some(Value::None) | None => {
            if c.kind().is_a(&ENUM_CHOICE) {
                Some(Value::Strategy(Arc::new(Strategy::EnumEven)))
            } else if c.kind().is_a(&crate::port::PORT) {
                Some(Value::Strategy(Arc::new(Strategy::RandomPort {
                    conservative: false,
                })))
            } else {
                None
            }
        }
        some => some,
    }
}

/// Resolve the choice, driven by the generation loop.
///
/// A known choice is a no-op. A strategy (explicit, or promoted from a
/// strategy-valued default) produces an elimination token; a plain default
/// is simply set. A choice with none of these is a usage error.
pub fn make(c: &Obj, rng: &RngFactory) -> WorldResult<Option<Token>> {
    if known(c) {
        return Ok(None);
    }
    if let Some(Value::Strategy(s)) = c.get("strategy") {
        return crate::strategy::make(&s, c, rng).map(Some);
    }
    match default_of(c) {
        Some(Value::Strategy(s)) => {
            c.set("strategy", Value::Strategy(s.clone()))?;
            crate::strategy::make(&s, c, rng).map(Some)
        }
        Some(default) => {
            set_value(c, default)?;
            Ok(None)
        }
        None => Err(ChoiceError::NoValueSource {
            path: c.string_path(),
        }
        .into()),
    }
}

/// Undo a contradicted choice in a restored universe.
///
/// A restored snapshot predates the promotion of a strategy-valued default,
/// so the default is promoted again here; its token still applies because
/// strategies are plain data.
pub fn eliminate(c: &Obj, token: Option<&Token>) -> WorldResult<()> {
    let strategy = match c.get("strategy") {
        Some(Value::Strategy(s)) => Some(s),
        _ => match default_of(c) {
            Some(Value::Strategy(s)) => {
                c.set("strategy", Value::Strategy(s.clone()))?;
                Some(s)
            }
            _ => None,
        },
    };
    match (strategy, token) {
        (Some(s), Some(token)) => crate::strategy::eliminate(&s, c, token),
        _ => Err(LogicError::NoStrategy {
            path: c.string_path(),
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Enum choices
// ---------------------------------------------------------------------------

pub fn values(c: &Obj) -> Vec<Arc<str>> {
    match c.get("values") {
        Some(Value::Tuple(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn impossible_values(c: &Obj) -> Vec<Arc<str>> {
    match c.get("impossible_values") {
        Some(Value::Tuple(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Record a value as leading to a contradiction and re-queue deduction.
pub fn add_impossible_value(c: &Obj, value: &str) -> WorldResult<()> {
    let mut impossible = impossible_values(c);
    if impossible.iter().any(|v| v.as_ref() == value) {
        return Ok(());
    }
    impossible.push(value.into());
    c.set(
        "impossible_values",
        Value::Tuple(impossible.into_iter().map(Value::Str).collect()),
    )?;
    c.mark_fast_deduction()
}

fn validated_set(c: &Obj, picks: &[&str]) -> WorldResult<Vec<Arc<str>>> {
    let declared = values(c);
    let mut out: Vec<Arc<str>> = Vec::new();
    for pick in picks {
        if !declared.iter().any(|v| v.as_ref() == *pick) {
            return Err(ChoiceError::InvalidEnumValue {
                value: (*pick).to_string(),
            }
            .into());
        }
        if !out.iter().any(|v| v.as_ref() == *pick) {
            out.push((*pick).into());
        }
    }
    Ok(out)
}

/// Condition: this enum's value is one of `picks`.
pub fn is_values(c: &Obj, picks: &[&str]) -> WorldResult<Cond> {
    let mut allowed = validated_set(c, picks)?;
    allowed.sort();
    Ok(Cond::Enum {
        choice: c.id(),
        allowed: allowed.into(),
    })
}

/// Condition: this enum's value is anything but `picks`.
pub fn is_not_values(c: &Obj, picks: &[&str]) -> WorldResult<Cond> {
    let excluded = validated_set(c, picks)?;
    let mut allowed: Vec<Arc<str>> = values(c)
        .into_iter()
        .filter(|v| !excluded.iter().any(|e| e.as_ref() == v.as_ref()))
        .collect();
    allowed.sort();
    Ok(Cond::Enum {
        choice: c.id(),
        allowed: allowed.into(),
    })
}

/// Enum deduction: one value left decides the choice, none left is a
/// contradiction.
pub fn enum_fast_deduce(c: &Obj) -> WorldResult<()> {
    if known(c) {
        return Ok(());
    }
    let declared = values(c);
    let impossible = impossible_values(c);
    if impossible.len() + 1 < declared.len() {
        return Ok(());
    }
    if impossible.len() + 1 == declared.len() {
        for v in &declared {
            if !impossible.iter().any(|i| i.as_ref() == v.as_ref()) {
                return set_value(c, Value::Str(v.clone()));
            }
        }
        panic!("impossible values of {} are not a subset of its values", c.string_path());
    }
    if impossible.len() == declared.len() {
        return Err(LogicError::EnumExhausted {
            path: c.string_path(),
        }
        .into());
    }
    panic!("{} has more impossible values than values", c.string_path());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_resolves_on_make() {
        let c = new().unwrap();
        c.set("default", 5).unwrap();
        let rng = RngFactory::from_seed(b"t");
        let token = make(&c, &rng).unwrap();
        assert!(token.is_none());
        assert!(known(&c));
        assert_eq!(value(&c).unwrap(), Value::Int(5));
        // Known choices are a no-op afterwards.
        assert!(make(&c, &rng).unwrap().is_none());
    }

    #[test]
    fn make_without_any_source_is_a_usage_error() {
        let c = new().unwrap();
        let rng = RngFactory::from_seed(b"t");
        let err = make(&c, &rng).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorldError::Choice(ChoiceError::NoValueSource { .. })
        ));
    }

    #[test]
    fn integer_bounds_are_enforced() {
        let c = integer(Some(1), Some(10), None).unwrap();
        assert!(set_value(&c, 11).is_err());
        assert!(set_value(&c, 0).is_err());
        set_value(&c, 10).unwrap();
        assert_eq!(value(&c).unwrap(), Value::Int(10));
    }

    #[test]
    fn enum_rejects_undeclared_values() {
        let c = enumeration(&["Nothing", "Wall"]).unwrap();
        assert!(set_value(&c, "Door").is_err());
        set_value(&c, "Wall").unwrap();
    }

    #[test]
    fn single_remaining_value_is_decided_on_deduce() {
        let c = enumeration(&["Nothing", "Wall"]).unwrap();
        add_impossible_value(&c, "Wall").unwrap();
        enum_fast_deduce(&c).unwrap();
        assert!(known(&c));
        assert_eq!(value_str(&c).unwrap().as_ref(), "Nothing");
    }

    #[test]
    fn exhausted_enum_raises_logic_error() {
        let c = enumeration(&["Nothing", "Wall"]).unwrap();
        add_impossible_value(&c, "Wall").unwrap();
        add_impossible_value(&c, "Nothing").unwrap();
        let err = enum_fast_deduce(&c).unwrap_err();
        assert!(err.is_logic());
    }

    #[test]
    fn single_valued_enum_decides_immediately() {
        let c = enumeration(&["Only"]).unwrap();
        enum_fast_deduce(&c).unwrap();
        assert!(known(&c));
    }

    #[test]
    fn is_and_is_not_build_enum_conditions() {
        let c = enumeration(&["A", "B", "C"]).unwrap();
        let is_ab = is_values(&c, &["A", "B"]).unwrap();
        let not_a = is_not_values(&c, &["A"]).unwrap();
        set_value(&c, "B").unwrap();
        let cx = c.ctx();
        assert!(is_ab.is_known_true(&cx));
        assert!(not_a.is_known_true(&cx));
        assert!(is_values(&c, &["X"]).is_err());
    }
}
