use std::time::Instant;

use once_cell::sync::Lazy;

use super::callable::{NativeFunction, NativeResult};
use super::value::Value;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

pub fn standard_library() -> Vec<NativeFunction> {
    vec![
        NativeFunction {
            arity: 0,
            func: native_clock,
            name: "clock".to_string(),
        },
        NativeFunction {
            arity: 1,
            func: native_sqrt,
            name: "sqrt".to_string(),
        },
        NativeFunction {
            arity: 1,
            func: native_to_string,
            name: "toString".to_string(),
        },
        NativeFunction {
            arity: 1,
            func: native_len,
            name: "len".to_string(),
        },
    ]
}

fn native_clock(_args: &[Value]) -> NativeResult {
    // make sure epoch is initialized first (lazy init)
    let epoch = *EPOCH;
    let duration = Instant::now() - epoch;
    // lossy conversion to f64 here, shouldn't be an issue for a while though
    Ok((duration.as_millis() as f64).into())
}

fn native_sqrt(args: &[Value]) -> NativeResult {
    match args {
        [Value::Number(value)] => Ok(Value::from(value.sqrt())),
        _ => Err("Expected number argument for sqrt function.".to_string()),
    }
}

fn native_to_string(args: &[Value]) -> NativeResult {
    match args {
        [value] => Ok(Value::from(value.to_string())),
        _ => Err("Expected one argument for toString function.".to_string()),
    }
}

fn native_len(args: &[Value]) -> NativeResult {
    match args {
        [Value::List(list)] => Ok(Value::from(list.len() as f64)),
        [Value::String(string)] => Ok(Value::from(string.chars().count() as f64)),
        _ => Err("Expected list or string argument for len function.".to_string()),
    }
}
