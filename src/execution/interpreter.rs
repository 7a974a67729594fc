use crate::data::Dataset;
use crate::execution::methods;
use crate::execution::ops;
use crate::execution::parser::{BinOp, Expr, Stmt, StmtKind};
use crate::execution::utils::{map_acquirer, safe_divide, BANK_TOKENS};
use crate::execution::value::{series_values, Builtin, Value};
use crate::execution::SnippetError;
use crate::time::{iso, iso_week_bounds, TimePeriods};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::info;

/// Longest string a snippet may build with `*`.
const MAX_STRING_LEN: usize = 1_000_000;

/// Call arguments after evaluation.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keyword: Vec::new(),
        }
    }

    /// Positional `idx`, or keyword `name`.
    pub fn get(&self, idx: usize, name: &str) -> Option<&Value> {
        self.positional.get(idx).or_else(|| self.keyword(name))
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn require(&self, idx: usize, name: &str, func: &str) -> Result<&Value, SnippetError> {
        self.get(idx, name).ok_or_else(|| {
            SnippetError::Type(format!("{}() missing required argument: '{}'", func, name))
        })
    }

    pub fn int_or(&self, idx: usize, name: &str, default: i64) -> Result<i64, SnippetError> {
        match self.get(idx, name) {
            None | Some(Value::None) => Ok(default),
            Some(Value::Int(v)) => Ok(*v),
            Some(Value::Bool(b)) => Ok(*b as i64),
            Some(other) => Err(SnippetError::Type(format!(
                "'{}' must be an integer, not {}",
                name,
                other.type_name()
            ))),
        }
    }

    pub fn bool_or(&self, idx: usize, name: &str, default: bool) -> Result<bool, SnippetError> {
        match self.get(idx, name) {
            None => Ok(default),
            // sort_values(ascending=[False]) style
            Some(Value::List(items)) if !items.is_empty() => items[0].truthy(),
            Some(other) => other.truthy(),
        }
    }
}

pub struct Interpreter {
    scope: HashMap<String, Value>,
}

impl Interpreter {
    pub fn new(dataset: &Dataset, time_periods: &TimePeriods) -> Self {
        let mut scope = HashMap::new();
        scope.insert("df".to_string(), Value::Frame(dataset.frame().clone()));
        for builtin in Builtin::ALL {
            scope.insert(builtin.name().to_string(), Value::Builtin(*builtin));
        }
        scope.insert(
            "BANK_TOKENS".to_string(),
            Value::Dict(
                BANK_TOKENS
                    .iter()
                    .map(|(needle, token)| (needle.to_string(), Value::Str(token.to_string())))
                    .collect(),
            ),
        );
        scope.insert("time_periods".to_string(), periods_value(time_periods));
        Self { scope }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    /// Run every statement. Returns the last statement's value when it is an
    /// expression, `None` when it is an assignment.
    pub fn run(&mut self, program: &[Stmt]) -> Result<Option<Value>, SnippetError> {
        let (last, body) = program.split_last().ok_or(SnippetError::Empty)?;
        for stmt in body {
            self.exec(stmt)?;
        }
        match self.exec(last)? {
            Some(value) => Ok(Some(value.materialized()?)),
            None => Ok(None),
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>, SnippetError> {
        match &stmt.kind {
            StmtKind::Import(module) => Err(SnippetError::ImportDenied(module.clone())),
            StmtKind::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.scope.insert(name.clone(), value);
                Ok(None)
            }
            StmtKind::Expr(expr) => self.eval(expr).map(Some),
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, SnippetError> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| SnippetError::Name(name.clone())),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other @ (Value::Int(_) | Value::Float(_) | Value::Bool(_)) => other.to_string(),
                        other => {
                            return Err(SnippetError::Type(format!(
                                "unhashable dictionary key of type '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    out.push((key, self.eval(value)?));
                }
                Ok(Value::Dict(out))
            }
            Expr::Unary(op, operand) => ops::unary(*op, self.eval(operand)?),
            Expr::Binary(op, left, right) => ops::binary(*op, self.eval(left)?, self.eval(right)?),
            Expr::Compare(op, left, right) => ops::compare(*op, self.eval(left)?, self.eval(right)?),
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Attribute(object, name) => methods::attribute(self.eval(object)?, name),
            Expr::Subscript(object, index) => methods::subscript(self.eval(object)?, self.eval(index)?),
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func)?;
                let mut evaluated = Args::new(self.eval_all(args)?);
                for (name, value) in kwargs {
                    evaluated.keyword.push((name.clone(), self.eval(value)?));
                }
                call(func, evaluated)
            }
        }
    }

    fn eval_all(&self, items: &[Expr]) -> Result<Vec<Value>, SnippetError> {
        items.iter().map(|item| self.eval(item)).collect()
    }
}

/// Invoke a callable value.
pub fn call(func: Value, args: Args) -> Result<Value, SnippetError> {
    match func {
        Value::Builtin(builtin) => call_builtin(builtin, args),
        Value::Method(receiver, name) => methods::call_method(*receiver, &name, args),
        other => Err(SnippetError::Type(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn call_builtin(builtin: Builtin, args: Args) -> Result<Value, SnippetError> {
    let name = builtin.name();
    match builtin {
        Builtin::SafeDivide => {
            let numer = args.require(0, "numer", name)?.clone();
            let denom = args.require(1, "denom", name)?.clone();
            match (numer.as_f64(), denom.as_f64()) {
                (Some(n), Some(d)) => Ok(Value::Float(safe_divide(n, d))),
                _ => ops::column_safe_divide(numer, denom),
            }
        }
        Builtin::MapAcquirer => match args.require(0, "acquirer", name)? {
            Value::Str(s) => Ok(Value::Str(map_acquirer(s).to_string())),
            Value::Column(column) => Ok(Value::Column(methods::map_acquirer_column(column))),
            other => Err(SnippetError::Type(format!(
                "map_acquirer() expects a string, not {}",
                other.type_name()
            ))),
        },
        Builtin::IsoWeek => {
            let year = args.int_or(0, "year", 0)?;
            let week = args.int_or(1, "week", 0)?;
            let (start, end) = iso_week_bounds(year as i32, week as u32).ok_or_else(|| {
                SnippetError::Value(format!("week {} does not exist in {}", week, year))
            })?;
            Ok(Value::Tuple(vec![Value::Str(iso(start)), Value::Str(iso(end))]))
        }
        Builtin::Len => match args.require(0, "obj", name)? {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) | Value::Tuple(items) => Ok(Value::Int(items.len() as i64)),
            Value::Dict(pairs) => Ok(Value::Int(pairs.len() as i64)),
            Value::Frame(df) | Value::Loc(df) => Ok(Value::Int(df.height() as i64)),
            Value::Series(series) => Ok(Value::Int(series.len() as i64)),
            Value::Column(column) => Ok(Value::Int(column.materialize()?.len() as i64)),
            other => Err(SnippetError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        },
        Builtin::Abs => match args.require(0, "x", name)? {
            Value::Int(v) => Ok(Value::Int(v.saturating_abs())),
            Value::Float(v) => Ok(Value::Float(v.abs())),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Column(column) => Ok(Value::Column(column.derive(column.expr.clone().abs()))),
            other => Err(bad_operand("abs", other)),
        },
        Builtin::Round => {
            let digits = args.int_or(1, "ndigits", 0)?;
            match args.require(0, "number", name)? {
                Value::Int(v) => Ok(Value::Int(*v)),
                Value::Float(v) => {
                    let factor = 10f64.powi(digits as i32);
                    let rounded = (v * factor).round() / factor;
                    if args.get(1, "ndigits").is_none() {
                        Ok(Value::Int(rounded as i64))
                    } else {
                        Ok(Value::Float(rounded))
                    }
                }
                Value::Column(column) => Ok(Value::Column(
                    column.derive(column.expr.clone().round(digits.max(0) as u32)),
                )),
                other => Err(bad_operand("round", other)),
            }
        }
        Builtin::Min | Builtin::Max => {
            let items = reduce_operands(&args, name)?;
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let replace = if builtin == Builtin::Min {
                            ops::less_than(&item, &current)?
                        } else {
                            ops::less_than(&current, &item)?
                        };
                        if replace {
                            item
                        } else {
                            current
                        }
                    }
                });
            }
            best.ok_or_else(|| SnippetError::Value(format!("{}() arg is an empty sequence", name)))
        }
        Builtin::Sum => {
            let items = reduce_operands(&args, name)?;
            items
                .into_iter()
                .try_fold(Value::Int(0), |acc, item| ops::binary(BinOp::Add, acc, item))
        }
        Builtin::Float => match args.get(0, "x") {
            None => Ok(Value::Float(0.0)),
            Some(Value::Str(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| SnippetError::Value(format!("could not convert string to float: '{}'", s))),
            Some(Value::Column(column)) => Ok(Value::Column(column.derive(column.expr.clone().cast(DataType::Float64)))),
            Some(other) => other.as_f64().map(Value::Float).ok_or_else(|| bad_operand("float", other)),
        },
        Builtin::Int => match args.get(0, "x") {
            None => Ok(Value::Int(0)),
            Some(Value::Str(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| SnippetError::Value(format!("invalid literal for int(): '{}'", s))),
            Some(Value::Column(column)) => Ok(Value::Column(column.derive(column.expr.clone().cast(DataType::Int64)))),
            Some(other) => other
                .as_f64()
                .map(|v| Value::Int(v.trunc() as i64))
                .ok_or_else(|| bad_operand("int", other)),
        },
        Builtin::Str => match args.get(0, "object") {
            None => Ok(Value::Str(String::new())),
            Some(Value::Column(column)) => Ok(Value::Column(column.derive(column.expr.clone().cast(DataType::String)))),
            Some(other) => Ok(Value::Str(other.clone().materialized()?.to_string())),
        },
        Builtin::Bool => match args.get(0, "x") {
            None => Ok(Value::Bool(false)),
            Some(value) => Ok(Value::Bool(value.truthy()?)),
        },
        Builtin::List => match args.get(0, "iterable") {
            None => Ok(Value::List(Vec::new())),
            Some(value) => Ok(Value::List(iterate(value.clone())?)),
        },
        Builtin::Sorted => {
            let mut items = iterate(args.require(0, "iterable", name)?.clone())?;
            let mut failure = None;
            items.sort_by(|a, b| match ops::less_than(a, b) {
                Ok(true) => std::cmp::Ordering::Less,
                Ok(false) => match ops::less_than(b, a) {
                    Ok(true) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                },
                Err(e) => {
                    failure.get_or_insert(e);
                    std::cmp::Ordering::Equal
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }
            let reverse = match args.keyword("reverse") {
                Some(flag) => flag.truthy()?,
                None => false,
            };
            if reverse {
                items.reverse();
            }
            Ok(Value::List(items))
        }
        Builtin::Print => {
            let parts: Vec<String> = args
                .positional
                .into_iter()
                .map(|v| v.materialized().map(|v| v.to_string()))
                .collect::<Result<_, _>>()?;
            info!("snippet output: {}", parts.join(" "));
            Ok(Value::None)
        }
    }
}

/// `min(a, b, ...)` or `min(iterable)`; a single column reduces to its own aggregate.
fn reduce_operands(args: &Args, name: &str) -> Result<Vec<Value>, SnippetError> {
    match args.positional.as_slice() {
        [] => Err(SnippetError::Type(format!("{}() expected at least 1 argument", name))),
        [Value::Column(column)] => {
            let reduced = match name {
                "min" => column.expr.clone().min(),
                "max" => column.expr.clone().max(),
                _ => column.expr.clone().sum(),
            };
            Ok(vec![column.reduce(reduced)?])
        }
        [single] => iterate(single.clone()),
        many => Ok(many.to_vec()),
    }
}

/// Elements of an iterable value.
pub fn iterate(value: Value) -> Result<Vec<Value>, SnippetError> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        Value::Dict(pairs) => Ok(pairs.into_iter().map(|(k, _)| Value::Str(k)).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Series(series) => series_values(&series),
        Value::Column(column) => series_values(&column.materialize()?),
        Value::Frame(df) => Ok(df
            .get_column_names()
            .into_iter()
            .map(|c| Value::Str(c.to_string()))
            .collect()),
        other => Err(SnippetError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

pub fn repeat_string(s: &str, times: i64) -> Result<Value, SnippetError> {
    let times = times.max(0) as usize;
    if s.len().saturating_mul(times) > MAX_STRING_LEN {
        return Err(SnippetError::Value("string repetition result is too large".to_string()));
    }
    Ok(Value::Str(s.repeat(times)))
}

fn bad_operand(func: &str, value: &Value) -> SnippetError {
    SnippetError::Type(format!(
        "bad operand type for {}(): '{}'",
        func,
        value.type_name()
    ))
}

/// `time_periods` as a dict of dicts of ISO date strings.
fn periods_value(time_periods: &TimePeriods) -> Value {
    Value::Dict(
        time_periods
            .iter()
            .map(|(name, bounds)| {
                let fields = bounds
                    .fields()
                    .into_iter()
                    .map(|(key, date)| (key.to_string(), Value::Str(date)))
                    .collect();
                (name.to_string(), Value::Dict(fields))
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures::dataset_for;
    use crate::execution::parser::parse_program;
    use chrono::NaiveDate;

    fn eval(code: &str) -> Result<Option<Value>, SnippetError> {
        let dataset = dataset_for("Acme", &["CAPTURED", "FAILED", "CAPTURED", "CAPTURED"], 2);
        let periods = TimePeriods::resolve(NaiveDate::from_ymd_opt(2025, 5, 14).unwrap());
        let program = parse_program(code)?;
        Interpreter::new(&dataset, &periods).run(&program)
    }

    fn value(code: &str) -> Value {
        eval(code).unwrap().unwrap()
    }

    #[test]
    fn test_arithmetic_follows_python() {
        assert_eq!(value("7 // 2"), Value::Int(3));
        assert_eq!(value("-7 // 2"), Value::Int(-4));
        assert_eq!(value("-7 % 3"), Value::Int(2));
        assert_eq!(value("1 / 4"), Value::Float(0.25));
        assert_eq!(value("2 ** 10"), Value::Int(1024));
        assert_eq!(value("'ab' * 2"), Value::Str("abab".into()));
        assert!(matches!(eval("1 / 0"), Err(SnippetError::ZeroDivision)));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(value("safe_divide(10, 0)"), Value::Float(0.0));
        assert_eq!(value("safe_divide(10, 4)"), Value::Float(2.5));
        assert_eq!(value("map_acquirer('hdfc bank')"), Value::Str("HDFC".into()));
        assert_eq!(value("round(2.3456, 2)"), Value::Float(2.35));
        assert_eq!(value("round(2.7)"), Value::Int(3));
        assert_eq!(value("max([3, 9, 4])"), Value::Int(9));
        assert_eq!(value("min(3, 1.5)"), Value::Float(1.5));
        assert_eq!(value("sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(value("sorted([3, 1, 2], reverse=True)"), Value::List(vec![Value::Int(3), Value::Int(2), Value::Int(1)]));
        assert_eq!(value("len(df)"), Value::Int(4));
        assert_eq!(value("BANK_TOKENS['SCB']"), Value::Str("STANDARD_CHARTERED_BANK".into()));
    }

    #[test]
    fn test_iso_week_and_time_periods() {
        assert_eq!(
            value("iso_week(2025, 20)"),
            Value::Tuple(vec![Value::Str("2025-05-12".into()), Value::Str("2025-05-18".into())])
        );
        assert_eq!(value("time_periods['mtd']['start']"), Value::Str("2025-05-01".into()));
        assert_eq!(value("time_periods['lw']['end']"), Value::Str("2025-05-11".into()));
    }

    #[test]
    fn test_boolean_short_circuit() {
        assert_eq!(value("0 or 'fallback'"), Value::Str("fallback".into()));
        assert_eq!(value("1 and 2"), Value::Int(2));
        assert_eq!(value("not []"), Value::Bool(true));
    }

    #[test]
    fn test_assignment_then_reference() {
        assert_eq!(value("a = 2\nb = a * 3\nb + 1"), Value::Int(7));
        assert!(eval("a = 2").unwrap().is_none());
        assert!(matches!(eval("undefined_name"), Err(SnippetError::Name(_))));
    }

    #[test]
    fn test_calling_a_non_callable_fails() {
        assert!(matches!(eval("x = 3\nx()"), Err(SnippetError::Type(_))));
    }
}
