//! Operators over interpreter values.
//!
//! Scalars follow Python semantics (floor division, sign of `%`, int/float
//! promotion). As soon as one side is a column the operation is lifted into a
//! polars expression instead.

use crate::data::dataset::date_literal;
use crate::execution::interpreter::{iterate, repeat_string};
use crate::execution::parser::{BinOp, CmpOp, UnaryOp};
use crate::execution::value::{ColumnRef, Value};
use crate::execution::SnippetError;
use chrono::NaiveDate;
use polars::prelude::*;

pub fn unary(op: UnaryOp, value: Value) -> Result<Value, SnippetError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy()?)),
        (UnaryOp::Neg, Value::Int(v)) => Ok(v
            .checked_neg()
            .map_or(Value::Float(-(v as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(b as i64))),
        (UnaryOp::Neg, Value::Column(c)) => Ok(Value::Column(c.derive(lit(0) - c.expr.clone()))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_) | Value::Column(_))) => Ok(v),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(b as i64)),
        (UnaryOp::Invert, Value::Column(c)) => Ok(Value::Column(c.derive(c.expr.clone().not()))),
        (UnaryOp::Invert, Value::Int(v)) => Ok(Value::Int(!v)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!(b as i64))),
        (op, other) => Err(SnippetError::Type(format!(
            "bad operand type for unary {}: '{}'",
            unary_symbol(op),
            other.type_name()
        ))),
    }
}

pub fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, SnippetError> {
    if left.is_column() || right.is_column() {
        return column_binary(op, left, right);
    }

    match (op, &left, &right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return repeat_string(s, *n)
        }
        (BinOp::BitAnd, Value::Bool(a), Value::Bool(b)) => return Ok(Value::Bool(*a && *b)),
        (BinOp::BitOr, Value::Bool(a), Value::Bool(b)) => return Ok(Value::Bool(*a || *b)),
        _ => {}
    }

    match (integer(&left), integer(&right)) {
        (Some(a), Some(b)) => int_binary(op, a, b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_binary(op, a, b),
            _ => Err(unsupported(op, &left, &right)),
        },
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value, SnippetError> {
    let overflowed = || float_binary(op, a as f64, b as f64);
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).map_or_else(overflowed, Ok),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).map_or_else(overflowed, Ok),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).map_or_else(overflowed, Ok),
        BinOp::Div => float_binary(op, a as f64, b as f64),
        BinOp::FloorDiv | BinOp::Mod if b == 0 => Err(SnippetError::ZeroDivision),
        // i64::MIN // -1 is the only quotient that leaves i64
        BinOp::FloorDiv => match a.checked_div(b) {
            Some(q) if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) => Ok(Value::Int(q - 1)),
            Some(q) => Ok(Value::Int(q)),
            None => overflowed(),
        },
        // sign follows the divisor
        BinOp::Mod => {
            let r = a.wrapping_rem(b);
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(Value::Int(r + b))
            } else {
                Ok(Value::Int(r))
            }
        }
        BinOp::Pow if b >= 0 => u32::try_from(b)
            .ok()
            .and_then(|e| a.checked_pow(e))
            .map(Value::Int)
            .map_or_else(overflowed, Ok),
        BinOp::Pow => float_binary(op, a as f64, b as f64),
        BinOp::BitAnd => Ok(Value::Int(a & b)),
        BinOp::BitOr => Ok(Value::Int(a | b)),
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value, SnippetError> {
    let zero_check = || if b == 0.0 { Err(SnippetError::ZeroDivision) } else { Ok(()) };
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            zero_check()?;
            a / b
        }
        BinOp::FloorDiv => {
            zero_check()?;
            (a / b).floor()
        }
        BinOp::Mod => {
            zero_check()?;
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
        BinOp::BitAnd | BinOp::BitOr => {
            return Err(SnippetError::Type(format!(
                "unsupported operand type(s) for {}: 'float'",
                binary_symbol(op)
            )))
        }
    };
    Ok(Value::Float(value))
}

fn column_binary(op: BinOp, left: Value, right: Value) -> Result<Value, SnippetError> {
    let base = match (&left, &right) {
        (Value::Column(c), _) | (_, Value::Column(c)) => c.clone(),
        _ => return Err(unsupported(op, &left, &right)),
    };
    let a = operand_expr(&base, &left)?;
    let b = operand_expr(&base, &right)?;
    let expr = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a.cast(DataType::Float64) / b.cast(DataType::Float64),
        BinOp::FloorDiv => (a.cast(DataType::Float64) / b.cast(DataType::Float64)).floor(),
        BinOp::Mod => a % b,
        BinOp::BitAnd => a.and(b),
        BinOp::BitOr => a.or(b),
        BinOp::Pow => {
            return Err(SnippetError::Type(
                "'**' is not supported between columns; use multiplication".to_string(),
            ))
        }
    };
    Ok(Value::Column(base.derive(expr)))
}

/// Element-wise `safe_divide` for columns: zero wherever the denominator is zero.
pub fn column_safe_divide(numer: Value, denom: Value) -> Result<Value, SnippetError> {
    let base = match (&numer, &denom) {
        (Value::Column(c), _) | (_, Value::Column(c)) => c.clone(),
        _ => {
            return Err(SnippetError::Type(format!(
                "safe_divide() expects numbers or columns, got '{}' and '{}'",
                numer.type_name(),
                denom.type_name()
            )))
        }
    };
    let n = operand_expr(&base, &numer)?.cast(DataType::Float64);
    let d = operand_expr(&base, &denom)?.cast(DataType::Float64);
    let expr = when(d.clone().eq(lit(0.0)))
        .then(lit(0.0))
        .otherwise(n / d);
    Ok(Value::Column(base.derive(expr)))
}

pub fn compare(op: CmpOp, left: Value, right: Value) -> Result<Value, SnippetError> {
    match op {
        CmpOp::In => return contains(&right, &left).map(Value::Bool),
        CmpOp::NotIn => return contains(&right, &left).map(|found| Value::Bool(!found)),
        _ => {}
    }

    if left.is_column() || right.is_column() {
        let base = match (&left, &right) {
            (Value::Column(c), _) | (_, Value::Column(c)) => c.clone(),
            _ => return Err(SnippetError::Type("comparison needs a column".to_string())),
        };
        let a = operand_expr(&base, &left)?;
        let b = operand_expr(&base, &right)?;
        let expr = match op {
            CmpOp::Eq => a.eq(b),
            CmpOp::NotEq => a.neq(b),
            CmpOp::Lt => a.lt(b),
            CmpOp::LtE => a.lt_eq(b),
            CmpOp::Gt => a.gt(b),
            CmpOp::GtE => a.gt_eq(b),
            CmpOp::In | CmpOp::NotIn => return column_membership(),
        };
        return Ok(Value::Column(base.derive(expr)));
    }

    let result = match op {
        CmpOp::Eq => left == right,
        CmpOp::NotEq => left != right,
        CmpOp::Lt => less_than(&left, &right)?,
        CmpOp::Gt => less_than(&right, &left)?,
        CmpOp::LtE => !less_than(&right, &left)?,
        CmpOp::GtE => !less_than(&left, &right)?,
        CmpOp::In | CmpOp::NotIn => return column_membership(),
    };
    Ok(Value::Bool(result))
}

fn column_membership() -> Result<Value, SnippetError> {
    Err(SnippetError::Type("membership test on a column; use .isin()".to_string()))
}

/// Python `<` on scalars: numbers with numbers, strings with strings.
pub fn less_than(left: &Value, right: &Value) -> Result<bool, SnippetError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a < b),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if x != y {
                    return less_than(x, y);
                }
            }
            Ok(a.len() < b.len())
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a < b),
            _ => Err(SnippetError::Type(format!(
                "'<' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, SnippetError> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Dict(pairs), Value::Str(key)) => Ok(pairs.iter().any(|(k, _)| k == key)),
        (Value::Frame(df), Value::Str(name)) => Ok(df.get_column_names().iter().any(|c| *c == name.as_str())),
        (Value::Str(_), other) => Err(SnippetError::Type(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (Value::Dict(_), _) => Ok(false),
        (other, _) => Ok(iterate(other.clone())?.iter().any(|v| v == item)),
    }
}

/// Expression for one side of a column operation. ISO date strings compared
/// against a Date column are turned into date literals.
pub fn operand_expr(column: &ColumnRef, value: &Value) -> Result<Expr, SnippetError> {
    match value {
        Value::Column(c) => Ok(c.expr.clone()),
        Value::Str(s) => match parse_iso_date(s) {
            Some(date) if column.dtype() == Some(DataType::Date) => Ok(date_literal(date)),
            _ => Ok(lit(s.clone())),
        },
        other => other.to_literal(),
    }
}

/// `yyyy-mm-dd`, optionally followed by a time part that is ignored.
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let head = text.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> SnippetError {
    SnippetError::Type(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        binary_symbol(op),
        left.type_name(),
        right.type_name()
    ))
}

fn binary_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Pos => "+",
        UnaryOp::Invert => "~",
        UnaryOp::Not => "not",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df![
            "amount" => [10.0, -5.0, 0.0, 7.5],
            "status" => ["CAPTURED", "FAILED", "CAPTURED", "REFUNDED"],
        ]
        .unwrap()
    }

    fn column(name: &str) -> Value {
        Value::Column(ColumnRef::new(frame(), name))
    }

    fn materialize(value: Value) -> Series {
        match value.materialized().unwrap() {
            Value::Series(series) => series,
            other => panic!("expected a series, got {:?}", other),
        }
    }

    #[test]
    fn test_column_comparison_builds_a_mask() {
        let mask = compare(CmpOp::Eq, column("status"), Value::Str("CAPTURED".into())).unwrap();
        let series = materialize(mask);
        let flags: Vec<Option<bool>> = series.bool().unwrap().into_iter().collect();
        assert_eq!(flags, vec![Some(true), Some(false), Some(true), Some(false)]);
    }

    #[test]
    fn test_scalar_on_the_left_of_a_column() {
        let shifted = binary(BinOp::Sub, Value::Int(100), column("amount")).unwrap();
        let series = materialize(shifted);
        assert_eq!(series.f64().unwrap().get(1), Some(105.0));
    }

    #[test]
    fn test_masks_combine_with_bitwise_operators() {
        let captured = compare(CmpOp::Eq, column("status"), Value::Str("CAPTURED".into())).unwrap();
        let positive = compare(CmpOp::Gt, column("amount"), Value::Int(0)).unwrap();
        let both = binary(BinOp::BitAnd, captured, positive).unwrap();
        let series = materialize(both);
        assert_eq!(series.bool().unwrap().into_iter().filter(|v| *v == Some(true)).count(), 1);
    }

    #[test]
    fn test_column_safe_divide_zeroes_zero_denominators() {
        let out = column_safe_divide(Value::Int(1), column("amount")).unwrap();
        let series = materialize(out);
        let values: Vec<Option<f64>> = series.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(0.1), Some(-0.2), Some(0.0), Some(1.0 / 7.5)]);
    }

    #[test]
    fn test_integer_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(binary(BinOp::FloorDiv, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(BinOp::Mod, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(binary(BinOp::Mod, Value::Int(7), Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(binary(BinOp::Mod, Value::Int(1), Value::Int(i64::MAX)).unwrap(), Value::Int(1));
        assert_eq!(binary(BinOp::Mod, Value::Int(-1), Value::Int(i64::MAX)).unwrap(), Value::Int(i64::MAX - 1));
        assert_eq!(binary(BinOp::Mod, Value::Int(i64::MIN), Value::Int(-1)).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_integer_overflow_promotes_to_float() {
        let min = Value::Int(i64::MIN);
        assert_eq!(
            binary(BinOp::FloorDiv, min.clone(), Value::Int(-1)).unwrap(),
            Value::Float(9_223_372_036_854_775_808.0)
        );
        assert_eq!(unary(UnaryOp::Neg, min.clone()).unwrap(), Value::Float(9_223_372_036_854_775_808.0));
        assert!(matches!(binary(BinOp::Sub, min, Value::Int(1)).unwrap(), Value::Float(_)));
        assert!(matches!(
            binary(BinOp::Mod, Value::Int(5), Value::Int(0)),
            Err(SnippetError::ZeroDivision)
        ));
    }

    #[test]
    fn test_membership() {
        let list = Value::List(vec![Value::Str("UPI".into()), Value::Str("CARD".into())]);
        assert_eq!(compare(CmpOp::In, Value::Str("UPI".into()), list.clone()).unwrap(), Value::Bool(true));
        assert_eq!(compare(CmpOp::NotIn, Value::Str("NB".into()), list).unwrap(), Value::Bool(true));
        assert_eq!(
            compare(CmpOp::In, Value::Str("status".into()), Value::Frame(frame())).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_mixed_type_ordering_is_a_type_error() {
        assert!(matches!(
            compare(CmpOp::Lt, Value::Str("a".into()), Value::Int(1)),
            Err(SnippetError::Type(_))
        ));
        assert_eq!(compare(CmpOp::Eq, Value::Str("a".into()), Value::Int(1)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_iso_date("2025-05-01"), NaiveDate::from_ymd_opt(2025, 5, 1));
        assert_eq!(parse_iso_date("2025-05-01 00:00:00"), NaiveDate::from_ymd_opt(2025, 5, 1));
        assert_eq!(parse_iso_date("May 1"), None);
    }
}
