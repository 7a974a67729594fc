//! Runtime values of the snippet interpreter.
//!
//! Column values are lazy: a polars expression bound to the frame it was taken
//! from. They are only materialized when a scalar, a list or the final result
//! is needed.

use crate::data::dataset::date_from_days;
use crate::execution::SnippetError;
use crate::time::iso;
use polars::prelude::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    SafeDivide,
    MapAcquirer,
    IsoWeek,
    Len,
    Abs,
    Round,
    Min,
    Max,
    Sum,
    Float,
    Int,
    Str,
    Bool,
    List,
    Sorted,
    Print,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::SafeDivide,
        Builtin::MapAcquirer,
        Builtin::IsoWeek,
        Builtin::Len,
        Builtin::Abs,
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Float,
        Builtin::Int,
        Builtin::Str,
        Builtin::Bool,
        Builtin::List,
        Builtin::Sorted,
        Builtin::Print,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::SafeDivide => "safe_divide",
            Builtin::MapAcquirer => "map_acquirer",
            Builtin::IsoWeek => "iso_week",
            Builtin::Len => "len",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Float => "float",
            Builtin::Int => "int",
            Builtin::Str => "str",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Sorted => "sorted",
            Builtin::Print => "print",
        }
    }
}

/// A column expression evaluated against `frame`.
#[derive(Clone)]
pub struct ColumnRef {
    pub frame: DataFrame,
    pub expr: Expr,
    pub name: String,
}

impl ColumnRef {
    pub fn new(frame: DataFrame, name: &str) -> Self {
        Self {
            expr: col(name),
            frame,
            name: name.to_string(),
        }
    }

    pub fn derive(&self, expr: Expr) -> Self {
        Self {
            frame: self.frame.clone(),
            expr,
            name: self.name.clone(),
        }
    }

    pub fn materialize(&self) -> Result<Series, SnippetError> {
        let out = self
            .frame
            .clone()
            .lazy()
            .select([self.expr.clone().alias(&self.name)])
            .collect()?;
        Ok(out.column(&self.name)?.clone())
    }

    /// Result type of the expression, if polars can resolve it without running.
    pub fn dtype(&self) -> Option<DataType> {
        let schema = self
            .frame
            .clone()
            .lazy()
            .select([self.expr.clone()])
            .schema()
            .ok()?;
        schema.get_at_index(0).map(|(_, dtype)| dtype.clone())
    }

    /// Evaluate an aggregation of this column down to one value.
    pub fn reduce(&self, reduced: Expr) -> Result<Value, SnippetError> {
        let out = self
            .frame
            .clone()
            .lazy()
            .select([reduced.alias("value")])
            .collect()?;
        let series = out.column("value")?;
        if series.len() == 0 {
            return Ok(Value::None);
        }
        series_value(series, 0)
    }
}

/// `df.groupby(keys)[selected]`.
#[derive(Clone)]
pub struct Grouped {
    pub frame: DataFrame,
    pub keys: Vec<String>,
    pub selected: Option<Vec<String>>,
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Frame(DataFrame),
    Column(ColumnRef),
    /// Materialized column.
    Series(Series),
    Grouped(Grouped),
    /// `df.loc`, waiting for its subscript.
    Loc(DataFrame),
    /// `column.dt`, waiting for a date part.
    DtAccessor(ColumnRef),
    /// `column.str`, waiting for a string method.
    StrAccessor(ColumnRef),
    Builtin(Builtin),
    Method(Box<Value>, String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Frame(_) => "DataFrame",
            Value::Column(_) | Value::Series(_) => "Series",
            Value::Grouped(_) => "GroupBy",
            Value::Loc(_) => "_LocIndexer",
            Value::DtAccessor(_) => "DatetimeProperties",
            Value::StrAccessor(_) => "StringMethods",
            Value::Builtin(_) => "builtin_function",
            Value::Method(_, _) => "method",
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Value::Column(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn truthy(&self) -> Result<bool, SnippetError> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::Frame(_) | Value::Column(_) | Value::Series(_) => {
                return Err(SnippetError::Value(format!(
                    "The truth value of a {} is ambiguous. Use & | ~ for element-wise logic",
                    self.type_name()
                )))
            }
            _ => true,
        })
    }

    /// Column expressions become concrete series; everything else is unchanged.
    pub fn materialized(self) -> Result<Value, SnippetError> {
        match self {
            Value::Column(column) => Ok(Value::Series(column.materialize()?)),
            other => Ok(other),
        }
    }

    /// Python-style `repr`: strings quoted, containers recursive.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    /// Literal expression for mixing a scalar into column arithmetic.
    pub fn to_literal(&self) -> Result<Expr, SnippetError> {
        match self {
            Value::Bool(b) => Ok(lit(*b)),
            Value::Int(v) => Ok(lit(*v)),
            Value::Float(v) => Ok(lit(*v)),
            Value::Str(s) => Ok(lit(s.clone())),
            other => Err(SnippetError::Type(format!(
                "cannot combine a column with a {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
                if parts.len() == 1 {
                    write!(f, "({},)", parts[0])
                } else {
                    write!(f, "({})", parts.join(", "))
                }
            }
            Value::Dict(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k, v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Frame(df) => write!(f, "{}", df),
            Value::Series(series) => write!(f, "{}", series),
            Value::Column(column) => match column.materialize() {
                Ok(series) => write!(f, "{}", series),
                Err(e) => write!(f, "<column {}: {}>", column.name, e),
            },
            Value::Grouped(g) => write!(f, "<groupby object on {:?}>", g.keys),
            Value::Loc(_) => write!(f, "<loc indexer>"),
            Value::DtAccessor(c) => write!(f, "<dt accessor of {}>", c.name),
            Value::StrAccessor(c) => write!(f, "<str accessor of {}>", c.name),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Method(receiver, name) => {
                write!(f, "<bound method {} of {}>", name, receiver.type_name())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.repr())
    }
}

impl PartialEq for Value {
    /// Structural equality for scalars and containers; frames and columns never compare equal.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Element `idx` of `series` as an interpreter value.
pub fn series_value(series: &Series, idx: usize) -> Result<Value, SnippetError> {
    if idx >= series.len() {
        return Err(SnippetError::Value(format!(
            "index {} is out of bounds for length {}",
            idx,
            series.len()
        )));
    }
    let dtype = series.dtype().clone();
    let value = match dtype {
        DataType::Boolean => series.bool()?.get(idx).map(Value::Bool),
        DataType::String => series.str()?.get(idx).map(|s| Value::Str(s.to_string())),
        DataType::Date => {
            let days = series.cast(&DataType::Int32)?;
            days.i32()?
                .get(idx)
                .and_then(date_from_days)
                .map(|d| Value::Str(iso(d)))
        }
        ref t if t.is_integer() => {
            let ints = series.cast(&DataType::Int64)?;
            ints.i64()?.get(idx).map(Value::Int)
        }
        ref t if t.is_numeric() => {
            let floats = series.cast(&DataType::Float64)?;
            floats.f64()?.get(idx).map(Value::Float)
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            text.str()?.get(idx).map(|s| Value::Str(s.to_string()))
        }
    };
    Ok(value.unwrap_or(Value::None))
}

/// Every element of `series`, in order.
pub fn series_values(series: &Series) -> Result<Vec<Value>, SnippetError> {
    (0..series.len()).map(|i| series_value(series, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_python_like() {
        assert_eq!(Value::Int(1).to_string(), "1");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(
            Value::List(vec![Value::Str("UPI".into()), Value::Int(3)]).to_string(),
            "['UPI', 3]"
        );
        assert_eq!(
            Value::Dict(vec![("start".into(), Value::Str("2025-05-05".into()))]).to_string(),
            "{'start': '2025-05-05'}"
        );
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Str("1".into()), Value::Int(1));
    }

    #[test]
    fn test_series_values() {
        let series = Series::new("x", &[1i64, 2, 3]);
        assert_eq!(
            series_values(&series).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        let strings = Series::new("s", &["a", "b"]);
        assert_eq!(series_value(&strings, 1).unwrap(), Value::Str("b".into()));
        assert!(series_value(&strings, 5).is_err());
    }

    #[test]
    fn test_frames_are_ambiguous_in_boolean_context() {
        let df = df!["a" => [1, 2]].unwrap();
        assert!(Value::Frame(df).truthy().is_err());
        assert!(!Value::List(vec![]).truthy().unwrap());
    }
}
