//! Attribute access, indexing and method calls on interpreter values.

use crate::execution::interpreter::{iterate, Args};
use crate::execution::ops::{operand_expr, parse_iso_date};
use crate::execution::utils::map_acquirer;
use crate::execution::value::{series_value, series_values, Builtin, ColumnRef, Grouped, Value};
use crate::execution::SnippetError;
use crate::data::dataset::days_since_epoch;
use polars::prelude::*;

const FRAME_METHODS: &[&str] = &[
    "groupby", "group_by", "head", "tail", "dropna", "fillna", "sort_values", "reset_index",
    "copy", "rename", "drop_duplicates", "nlargest", "nsmallest", "idxmax", "idxmin", "to_dict",
];

const COLUMN_METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "nunique", "std", "var", "abs", "fillna",
    "round", "between", "isin", "unique", "value_counts", "map", "apply", "astype", "tolist",
    "to_list", "head", "tail", "sort_values", "dropna", "nlargest", "nsmallest", "idxmax",
    "idxmin", "reset_index", "to_frame", "copy", "notna", "isna", "notnull", "isnull",
];

const GROUPED_METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "nunique", "std", "var", "size", "first",
    "last", "agg", "aggregate",
];

const STRING_ACCESSOR_METHODS: &[&str] = &["lower", "upper", "contains", "startswith", "endswith", "strip", "len"];

const DICT_METHODS: &[&str] = &["get", "keys", "values", "items"];

const STR_METHODS: &[&str] = &["upper", "lower", "strip", "startswith", "endswith", "replace"];

/// `value.name`
pub fn attribute(value: Value, name: &str) -> Result<Value, SnippetError> {
    let method = |value: Value, known: &[&str]| {
        if known.contains(&name) {
            Ok(Value::Method(Box::new(value), name.to_string()))
        } else {
            Err(no_attribute(&value, name))
        }
    };

    match value {
        Value::Frame(df) => match name {
            "shape" => Ok(Value::Tuple(vec![
                Value::Int(df.height() as i64),
                Value::Int(df.width() as i64),
            ])),
            "columns" => Ok(Value::List(
                df.get_column_names()
                    .into_iter()
                    .map(|c| Value::Str(c.to_string()))
                    .collect(),
            )),
            "empty" => Ok(Value::Bool(df.height() == 0)),
            "size" => Ok(Value::Int((df.height() * df.width()) as i64)),
            "loc" => Ok(Value::Loc(df)),
            _ if has_column(&df, name) => Ok(Value::Column(ColumnRef::new(df, name))),
            _ => method(Value::Frame(df), FRAME_METHODS),
        },
        Value::Column(column) => match name {
            "dt" => Ok(Value::DtAccessor(column)),
            "str" => Ok(Value::StrAccessor(column)),
            "name" => Ok(Value::Str(column.name.clone())),
            "values" => Ok(Value::Series(column.materialize()?)),
            "size" => Ok(Value::Int(column.materialize()?.len() as i64)),
            "shape" => Ok(Value::Tuple(vec![Value::Int(column.materialize()?.len() as i64)])),
            "empty" => Ok(Value::Bool(column.materialize()?.is_empty())),
            _ => method(Value::Column(column), COLUMN_METHODS),
        },
        Value::DtAccessor(column) => date_part(&column, name),
        Value::StrAccessor(column) => method(Value::StrAccessor(column), STRING_ACCESSOR_METHODS),
        Value::Grouped(grouped) => {
            if has_column(&grouped.frame, name) && !GROUPED_METHODS.contains(&name) {
                Ok(Value::Grouped(Grouped {
                    selected: Some(vec![name.to_string()]),
                    ..grouped
                }))
            } else {
                method(Value::Grouped(grouped), GROUPED_METHODS)
            }
        }
        Value::Series(series) => match name {
            "values" => Ok(Value::Series(series)),
            _ => {
                let name_of = series.name().to_string();
                let frame = DataFrame::new(vec![series])?;
                attribute(Value::Column(ColumnRef::new(frame, &name_of)), name)
            }
        },
        value @ Value::Dict(_) => method(value, DICT_METHODS),
        value @ Value::Str(_) => method(value, STR_METHODS),
        other => Err(no_attribute(&other, name)),
    }
}

/// `value[index]`
pub fn subscript(value: Value, index: Value) -> Result<Value, SnippetError> {
    match (value, index) {
        (Value::Frame(df), Value::Str(name)) => column_of(df, &name),
        (Value::Frame(df), Value::List(names)) => select(df, &names),
        (Value::Frame(df), Value::Column(mask)) | (Value::Loc(df), Value::Column(mask)) => {
            Ok(Value::Frame(filter(df, &mask)?))
        }
        (Value::Loc(df), Value::Tuple(parts)) if parts.len() == 2 => {
            let mut parts = parts.into_iter();
            let (rows, cols) = match (parts.next(), parts.next()) {
                (Some(rows), Some(cols)) => (rows, cols),
                _ => return Err(SnippetError::Type("loc expects [rows, columns]".to_string())),
            };
            let filtered = match rows {
                Value::Column(mask) => filter(df, &mask)?,
                other => {
                    return Err(SnippetError::Type(format!(
                        "loc rows must be a boolean mask, not {}",
                        other.type_name()
                    )))
                }
            };
            match cols {
                Value::Str(name) => column_of(filtered, &name),
                Value::List(names) => select(filtered, &names),
                other => Err(SnippetError::Type(format!(
                    "loc columns must be a name or list of names, not {}",
                    other.type_name()
                ))),
            }
        }
        (Value::Column(column), Value::Column(mask)) => {
            Ok(Value::Column(column.derive(column.expr.clone().filter(mask.expr))))
        }
        (Value::Column(column), Value::Int(idx)) => {
            let series = column.materialize()?;
            let idx = normalize_index(idx, series.len())?;
            series_value(&series, idx)
        }
        (Value::Series(series), Value::Int(idx)) => {
            let idx = normalize_index(idx, series.len())?;
            series_value(&series, idx)
        }
        (Value::Grouped(grouped), Value::Str(name)) => {
            column_of(grouped.frame.clone(), &name)?;
            Ok(Value::Grouped(Grouped {
                selected: Some(vec![name]),
                ..grouped
            }))
        }
        (Value::Grouped(grouped), Value::List(names)) => {
            let names = string_list(&Value::List(names))?;
            Ok(Value::Grouped(Grouped {
                selected: Some(names),
                ..grouped
            }))
        }
        (Value::List(items), Value::Int(idx)) | (Value::Tuple(items), Value::Int(idx)) => {
            let idx = normalize_index(idx, items.len())?;
            Ok(items[idx].clone())
        }
        (Value::Str(s), Value::Int(idx)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(idx, chars.len())?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        (Value::Dict(pairs), Value::Str(key)) => pairs
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .ok_or(SnippetError::Key(key)),
        (value, index) => Err(SnippetError::Type(format!(
            "'{}' object is not subscriptable with {}",
            value.type_name(),
            index.type_name()
        ))),
    }
}

/// Dispatch `receiver.name(args)`.
pub fn call_method(receiver: Value, name: &str, args: Args) -> Result<Value, SnippetError> {
    match receiver {
        Value::Frame(df) => frame_method(df, name, &args),
        Value::Column(column) => column_method(column, name, &args),
        Value::Grouped(grouped) => grouped_method(grouped, name, &args),
        Value::StrAccessor(column) => string_method(column, name, &args),
        Value::Dict(pairs) => dict_method(pairs, name, &args),
        Value::Str(s) => str_method(&s, name, &args),
        other => Err(no_attribute(&other, name)),
    }
}

fn frame_method(df: DataFrame, name: &str, args: &Args) -> Result<Value, SnippetError> {
    match name {
        "groupby" | "group_by" => {
            let keys = string_list(args.require(0, "by", name)?)?;
            for key in &keys {
                column_of(df.clone(), key)?;
            }
            Ok(Value::Grouped(Grouped {
                frame: df,
                keys,
                selected: None,
            }))
        }
        "head" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            Ok(Value::Frame(df.head(Some(n))))
        }
        "tail" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            Ok(Value::Frame(df.tail(Some(n))))
        }
        "dropna" => {
            let subset = match args.get(0, "subset") {
                None | Some(Value::None) => None,
                Some(value) => Some(string_list(value)?.iter().map(|c| col(c)).collect()),
            };
            Ok(Value::Frame(df.lazy().drop_nulls(subset).collect()?))
        }
        "fillna" => {
            let fill = args.require(0, "value", name)?.to_literal()?;
            Ok(Value::Frame(df.lazy().fill_null(fill).collect()?))
        }
        "sort_values" => {
            let by = match args.get(0, "by") {
                Some(value) => string_list(value)?,
                None => last_column(&df).into_iter().collect(),
            };
            let ascending = args.bool_or(1, "ascending", true)?;
            Ok(Value::Frame(sort_frame(df, &by, !ascending)?))
        }
        "nlargest" | "nsmallest" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            let by = match args.get(1, "columns") {
                Some(value) => string_list(value)?,
                None => last_column(&df).into_iter().collect(),
            };
            let sorted = sort_frame(df, &by, name == "nlargest")?;
            Ok(Value::Frame(sorted.head(Some(n))))
        }
        "idxmax" | "idxmin" => {
            // Grouped results are (keys..., value): the "index" of the best row is its first key.
            let by: Vec<String> = last_column(&df).into_iter().collect();
            let sorted = sort_frame(df, &by, name == "idxmax")?;
            let first = sorted
                .get_columns()
                .first()
                .cloned()
                .ok_or_else(|| SnippetError::Value("attempt to get argmax of an empty frame".to_string()))?;
            series_value(&first, 0)
        }
        "reset_index" | "copy" => {
            let mut df = df;
            if let Some(Value::Str(new_name)) = args.keyword("name") {
                if let Some(last) = last_column(&df) {
                    df.rename(&last, new_name)?;
                }
            }
            Ok(Value::Frame(df))
        }
        "rename" => {
            let mut df = df;
            if let Some(Value::Dict(pairs)) = args.keyword("columns") {
                for (old, new) in pairs {
                    if let Value::Str(new) = new {
                        if has_column(&df, old) {
                            df.rename(old, new)?;
                        }
                    }
                }
            }
            Ok(Value::Frame(df))
        }
        "drop_duplicates" => Ok(Value::Frame(
            df.lazy().unique_stable(None, UniqueKeepStrategy::First).collect()?,
        )),
        "to_dict" => {
            let columns = df.get_columns();
            if columns.len() < 2 {
                return Err(SnippetError::Value("to_dict needs a key and a value column".to_string()));
            }
            let keys = series_values(&columns[0])?;
            let values = series_values(&columns[columns.len() - 1])?;
            Ok(Value::Dict(
                keys.into_iter()
                    .zip(values)
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            ))
        }
        _ => Err(no_attribute(&Value::Frame(df), name)),
    }
}

fn column_method(column: ColumnRef, name: &str, args: &Args) -> Result<Value, SnippetError> {
    let e = column.expr.clone();
    match name {
        "sum" | "mean" | "median" | "min" | "max" | "count" | "nunique" | "std" | "var" => {
            let base = if column.dtype() == Some(DataType::Boolean)
                && matches!(name, "mean" | "median" | "std" | "var")
            {
                e.cast(DataType::Float64)
            } else {
                e
            };
            column.reduce(aggregate(name, base)?)
        }
        "idxmax" => column.reduce(e.arg_max()),
        "idxmin" => column.reduce(e.arg_min()),
        "abs" => Ok(Value::Column(column.derive(e.abs()))),
        "fillna" => {
            let fill = operand_expr(&column, args.require(0, "value", name)?)?;
            Ok(Value::Column(column.derive(e.fill_null(fill))))
        }
        "round" => {
            let decimals = args.int_or(0, "decimals", 0)?.max(0) as u32;
            Ok(Value::Column(column.derive(e.round(decimals))))
        }
        "between" => {
            let low = operand_expr(&column, args.require(0, "left", name)?)?;
            let high = operand_expr(&column, args.require(1, "right", name)?)?;
            Ok(Value::Column(column.derive(e.clone().gt_eq(low).and(e.lt_eq(high)))))
        }
        "isin" => {
            let values = iterate(args.require(0, "values", name)?.clone())?;
            let candidates = candidate_series(&column, &values)?;
            Ok(Value::Column(column.derive(e.is_in(lit(candidates)))))
        }
        "notna" | "notnull" => Ok(Value::Column(column.derive(e.is_not_null()))),
        "isna" | "isnull" => Ok(Value::Column(column.derive(e.is_null()))),
        "unique" => Ok(Value::Series(column.materialize()?.unique_stable()?)),
        "value_counts" => {
            let counts = column
                .frame
                .clone()
                .lazy()
                .select([e.alias(&column.name)])
                .group_by_stable([col(&column.name)])
                .agg([len().alias("count")])
                .sort_by_exprs(
                    [col("count")],
                    SortMultipleOptions::default().with_order_descending(true),
                )
                .collect()?;
            Ok(Value::Frame(counts))
        }
        "map" | "apply" => match args.require(0, "arg", name)? {
            Value::Builtin(Builtin::MapAcquirer) => Ok(Value::Column(map_acquirer_column(&column))),
            Value::Builtin(Builtin::Str) => Ok(Value::Column(column.derive(e.cast(DataType::String)))),
            Value::Builtin(Builtin::Float) => Ok(Value::Column(column.derive(e.cast(DataType::Float64)))),
            Value::Builtin(Builtin::Int) => Ok(Value::Column(column.derive(e.cast(DataType::Int64)))),
            Value::Builtin(Builtin::Abs) => Ok(Value::Column(column.derive(e.abs()))),
            Value::Dict(pairs) => {
                let mut mapped: Option<Expr> = None;
                for (key, value) in pairs.iter().rev() {
                    let key = operand_expr(&column, &Value::Str(key.clone()))?;
                    let value = value.to_literal()?;
                    let otherwise = mapped.take().unwrap_or_else(|| lit(NULL));
                    mapped = Some(when(e.clone().cast(DataType::String).eq(key)).then(value).otherwise(otherwise));
                }
                Ok(Value::Column(column.derive(mapped.unwrap_or_else(|| lit(NULL)))))
            }
            other => Err(SnippetError::Type(format!(
                "{}() supports map_acquirer, a dict or a type, not {}",
                name,
                other.type_name()
            ))),
        },
        "astype" => {
            let target = match args.require(0, "dtype", name)? {
                Value::Builtin(Builtin::Float) => DataType::Float64,
                Value::Builtin(Builtin::Int) => DataType::Int64,
                Value::Builtin(Builtin::Str) => DataType::String,
                Value::Builtin(Builtin::Bool) => DataType::Boolean,
                Value::Str(s) => match s.as_str() {
                    "float" | "float64" | "float32" => DataType::Float64,
                    "int" | "int64" | "int32" => DataType::Int64,
                    "str" | "string" | "object" => DataType::String,
                    "bool" => DataType::Boolean,
                    other => return Err(SnippetError::Type(format!("data type '{}' not understood", other))),
                },
                other => return Err(SnippetError::Type(format!("data type '{}' not understood", other))),
            };
            Ok(Value::Column(column.derive(e.cast(target))))
        }
        "tolist" | "to_list" => Ok(Value::List(series_values(&column.materialize()?)?)),
        "head" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            Ok(Value::Column(column.derive(e.head(Some(n)))))
        }
        "tail" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            Ok(Value::Column(column.derive(e.tail(Some(n)))))
        }
        "sort_values" => {
            let ascending = args.bool_or(0, "ascending", true)?;
            Ok(Value::Column(column.derive(e.sort(SortOptions {
                descending: !ascending,
                ..Default::default()
            }))))
        }
        "nlargest" | "nsmallest" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            let sorted = e.sort(SortOptions {
                descending: name == "nlargest",
                nulls_last: true,
                ..Default::default()
            });
            Ok(Value::Column(column.derive(sorted.head(Some(n)))))
        }
        "dropna" => Ok(Value::Column(column.derive(e.drop_nulls()))),
        "reset_index" | "to_frame" => {
            let out_name = match args.keyword("name") {
                Some(Value::Str(s)) => s.clone(),
                _ => column.name.clone(),
            };
            let frame = column.frame.clone().lazy().select([e.alias(&out_name)]).collect()?;
            Ok(Value::Frame(frame))
        }
        "copy" => Ok(Value::Column(column)),
        _ => Err(no_attribute(&Value::Column(column), name)),
    }
}

fn grouped_method(grouped: Grouped, name: &str, args: &Args) -> Result<Value, SnippetError> {
    let keys: Vec<Expr> = grouped.keys.iter().map(|k| col(k)).collect();
    let aggs: Vec<Expr> = match name {
        "size" => vec![len().alias("size")],
        "agg" | "aggregate" => named_aggregations(&grouped, args)?,
        _ => {
            let targets = grouped
                .selected
                .clone()
                .unwrap_or_else(|| default_targets(&grouped, name));
            targets
                .iter()
                .map(|c| aggregate(name, col(c)))
                .collect::<Result<_, _>>()?
        }
    };
    let out = grouped
        .frame
        .lazy()
        .group_by_stable(keys)
        .agg(aggs)
        .collect()?;
    Ok(Value::Frame(out))
}

/// `.agg('sum')`, `.agg(['sum', 'mean'])`, `.agg({'col': 'sum'})` and
/// `.agg(total=('col', 'sum'))`.
fn named_aggregations(grouped: &Grouped, args: &Args) -> Result<Vec<Expr>, SnippetError> {
    let targets = grouped
        .selected
        .clone()
        .unwrap_or_else(|| default_targets(grouped, "sum"));
    let mut aggs = Vec::new();
    match args.positional.first() {
        Some(Value::Str(func)) => {
            for target in &targets {
                aggs.push(aggregate(func, col(target))?);
            }
        }
        Some(Value::List(funcs)) => {
            for target in &targets {
                for func in funcs {
                    let func = func
                        .as_str()
                        .ok_or_else(|| SnippetError::Type("aggregation names must be strings".to_string()))?;
                    let alias = if targets.len() == 1 {
                        func.to_string()
                    } else {
                        format!("{}_{}", target, func)
                    };
                    aggs.push(aggregate(func, col(target))?.alias(&alias));
                }
            }
        }
        Some(Value::Dict(pairs)) => {
            for (target, func) in pairs {
                let func = func
                    .as_str()
                    .ok_or_else(|| SnippetError::Type("aggregation names must be strings".to_string()))?;
                aggs.push(aggregate(func, col(target))?);
            }
        }
        Some(other) => {
            return Err(SnippetError::Type(format!(
                "unsupported aggregation spec of type {}",
                other.type_name()
            )))
        }
        None => {}
    }
    for (alias, spec) in &args.keyword {
        match spec {
            Value::Tuple(parts) if parts.len() == 2 => match (&parts[0], &parts[1]) {
                (Value::Str(target), Value::Str(func)) => {
                    aggs.push(aggregate(func, col(target))?.alias(alias));
                }
                _ => return Err(SnippetError::Type("named aggregation must be (column, function)".to_string())),
            },
            _ => return Err(SnippetError::Type("named aggregation must be (column, function)".to_string())),
        }
    }
    if aggs.is_empty() {
        return Err(SnippetError::Type("agg() needs at least one aggregation".to_string()));
    }
    Ok(aggs)
}

/// Non-key columns an unselected groupby aggregates; counting functions take
/// every column, arithmetic ones only numeric columns.
fn default_targets(grouped: &Grouped, func: &str) -> Vec<String> {
    let counting = matches!(func, "count" | "nunique" | "first" | "last");
    grouped
        .frame
        .get_columns()
        .iter()
        .filter(|s| !grouped.keys.iter().any(|k| k.as_str() == s.name()))
        .filter(|s| counting || s.dtype().is_numeric())
        .map(|s| s.name().to_string())
        .collect()
}

fn aggregate(func: &str, e: Expr) -> Result<Expr, SnippetError> {
    Ok(match func {
        "sum" => e.sum(),
        "mean" => e.mean(),
        "median" => e.median(),
        "min" => e.min(),
        "max" => e.max(),
        "count" => e.count(),
        "nunique" => e.n_unique(),
        "std" => e.std(1),
        "var" => e.var(1),
        "first" => e.first(),
        "last" => e.last(),
        "size" => e.len(),
        other => return Err(SnippetError::Value(format!("unsupported aggregation '{}'", other))),
    })
}

fn date_part(column: &ColumnRef, part: &str) -> Result<Value, SnippetError> {
    let e = column.expr.clone();
    let expr = match part {
        "year" => e.dt().year(),
        "month" => e.dt().month(),
        "day" => e.dt().day(),
        "week" | "weekofyear" => e.dt().week(),
        "quarter" => e.dt().quarter(),
        // pandas counts Monday as 0, polars as 1
        "weekday" | "dayofweek" => e.dt().weekday().cast(DataType::Int32) - lit(1),
        "date" => e.cast(DataType::Date),
        other => {
            return Err(SnippetError::Attribute {
                type_name: "DatetimeProperties".to_string(),
                attribute: other.to_string(),
            })
        }
    };
    Ok(Value::Column(column.derive(expr)))
}

fn string_method(column: ColumnRef, name: &str, args: &Args) -> Result<Value, SnippetError> {
    let e = column.expr.clone().cast(DataType::String);
    let pattern = || -> Result<Expr, SnippetError> {
        match args.require(0, "pat", name)? {
            Value::Str(s) => Ok(lit(s.clone())),
            other => Err(SnippetError::Type(format!("expected a string pattern, not {}", other.type_name()))),
        }
    };
    let expr = match name {
        "lower" => e.str().to_lowercase(),
        "upper" => e.str().to_uppercase(),
        "contains" => e.str().contains_literal(pattern()?),
        "startswith" => e.str().starts_with(pattern()?),
        "endswith" => e.str().ends_with(pattern()?),
        "strip" => e.str().strip_chars(lit(NULL)),
        "len" => e.str().len_chars(),
        _ => return Err(no_attribute(&Value::StrAccessor(column), name)),
    };
    Ok(Value::Column(column.derive(expr)))
}

fn dict_method(pairs: Vec<(String, Value)>, name: &str, args: &Args) -> Result<Value, SnippetError> {
    match name {
        "get" => {
            let key = args.require(0, "key", name)?;
            let default = args.get(1, "default").cloned().unwrap_or(Value::None);
            let found = match key {
                Value::Str(key) => pairs.into_iter().find(|(k, _)| k == key).map(|(_, v)| v),
                _ => None,
            };
            Ok(found.unwrap_or(default))
        }
        "keys" => Ok(Value::List(pairs.into_iter().map(|(k, _)| Value::Str(k)).collect())),
        "values" => Ok(Value::List(pairs.into_iter().map(|(_, v)| v).collect())),
        "items" => Ok(Value::List(
            pairs
                .into_iter()
                .map(|(k, v)| Value::Tuple(vec![Value::Str(k), v]))
                .collect(),
        )),
        _ => Err(no_attribute(&Value::Dict(pairs), name)),
    }
}

fn str_method(s: &str, name: &str, args: &Args) -> Result<Value, SnippetError> {
    let text_arg = |idx: usize, arg: &str| -> Result<String, SnippetError> {
        match args.require(idx, arg, name)? {
            Value::Str(v) => Ok(v.clone()),
            other => Err(SnippetError::Type(format!("expected str, not {}", other.type_name()))),
        }
    };
    match name {
        "upper" => Ok(Value::Str(s.to_uppercase())),
        "lower" => Ok(Value::Str(s.to_lowercase())),
        "strip" => Ok(Value::Str(s.trim().to_string())),
        "startswith" => Ok(Value::Bool(s.starts_with(text_arg(0, "prefix")?.as_str()))),
        "endswith" => Ok(Value::Bool(s.ends_with(text_arg(0, "suffix")?.as_str()))),
        "replace" => Ok(Value::Str(s.replace(text_arg(0, "old")?.as_str(), &text_arg(1, "new")?))),
        _ => Err(no_attribute(&Value::Str(s.to_string()), name)),
    }
}

/// `map_acquirer` applied element-wise.
pub fn map_acquirer_column(column: &ColumnRef) -> ColumnRef {
    let mapped = column.expr.clone().cast(DataType::String).map(
        |s: Series| {
            let tokens: Vec<Option<&str>> = s.str()?.into_iter().map(|v| v.map(map_acquirer)).collect();
            Ok(Some(Series::new(s.name(), tokens)))
        },
        GetOutput::from_type(DataType::String),
    );
    column.derive(mapped)
}

/// Values for `isin`, typed to match the column.
fn candidate_series(column: &ColumnRef, values: &[Value]) -> Result<Series, SnippetError> {
    let dtype = column.dtype();
    if dtype == Some(DataType::Date) {
        let days: Vec<i32> = values
            .iter()
            .filter_map(|v| v.as_str().and_then(parse_iso_date))
            .map(days_since_epoch)
            .collect();
        return Ok(Series::new("candidates", days).cast(&DataType::Date)?);
    }
    if values.iter().all(|v| matches!(v, Value::Str(_))) {
        let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
        return Ok(Series::new("candidates", strings));
    }
    if values.iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_))) && !dtype.as_ref().map_or(false, |t| t.is_float()) {
        let ints: Vec<i64> = values.iter().filter_map(|v| v.as_f64()).map(|v| v as i64).collect();
        return Ok(Series::new("candidates", ints));
    }
    let floats: Vec<f64> = values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                SnippetError::Type(format!("isin() cannot mix {} with numbers", v.type_name()))
            })
        })
        .collect::<Result<_, _>>()?;
    Ok(Series::new("candidates", floats))
}

fn column_of(df: DataFrame, name: &str) -> Result<Value, SnippetError> {
    if has_column(&df, name) {
        Ok(Value::Column(ColumnRef::new(df, name)))
    } else {
        Err(SnippetError::Key(name.to_string()))
    }
}

fn select(df: DataFrame, names: &[Value]) -> Result<Value, SnippetError> {
    let names = string_list(&Value::List(names.to_vec()))?;
    if let Some(missing) = names.iter().find(|n| !has_column(&df, n)) {
        return Err(SnippetError::Key(missing.clone()));
    }
    let exprs: Vec<Expr> = names.iter().map(|n| col(n)).collect();
    Ok(Value::Frame(df.lazy().select(exprs).collect()?))
}

fn filter(df: DataFrame, mask: &ColumnRef) -> Result<DataFrame, SnippetError> {
    Ok(df.lazy().filter(mask.expr.clone()).collect()?)
}

fn sort_frame(df: DataFrame, by: &[String], descending: bool) -> Result<DataFrame, SnippetError> {
    if let Some(missing) = by.iter().find(|n| !has_column(&df, n)) {
        return Err(SnippetError::Key(missing.clone()));
    }
    let exprs: Vec<Expr> = by.iter().map(|n| col(n)).collect();
    Ok(df
        .lazy()
        .sort_by_exprs(
            exprs,
            SortMultipleOptions::default()
                .with_order_descending(descending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?)
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| *c == name)
}

fn last_column(df: &DataFrame) -> Option<String> {
    df.get_column_names().last().map(|c| c.to_string())
}

/// A name or list of names.
fn string_list(value: &Value) -> Result<Vec<String>, SnippetError> {
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    SnippetError::Type(format!("column names must be strings, not {}", item.type_name()))
                })
            })
            .collect(),
        other => Err(SnippetError::Type(format!(
            "expected a column name or list of names, not {}",
            other.type_name()
        ))),
    }
}

fn normalize_index(idx: i64, len: usize) -> Result<usize, SnippetError> {
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved < 0 || resolved as usize >= len {
        return Err(SnippetError::Value(format!("index {} is out of range", idx)));
    }
    Ok(resolved as usize)
}

fn no_attribute(value: &Value, name: &str) -> SnippetError {
    SnippetError::Attribute {
        type_name: value.type_name().to_string(),
        attribute: name.to_string(),
    }
}
