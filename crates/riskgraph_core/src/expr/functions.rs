//! Built-in function library

use rand::{Rng, RngCore};

use crate::error::EvalError;
use crate::model::Value;

/// Every function name the evaluator recognises
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "floor", "ceil", "round", "sqrt", "log", "log10", "exp", "pow", "min", "max", "sin",
    "cos", "tan", "sign", "clamp", "sum", "mean", "count", "length", "first", "last", "if",
    "random", "array",
];

pub(crate) fn check_arity(
    name: &str,
    expected: &'static str,
    found: usize,
    ok: bool,
) -> Result<(), EvalError> {
    if ok {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            found,
        })
    }
}

fn unary(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
    check_arity(name, "1", args.len(), args.len() == 1)?;
    Ok(Value::Number(f(args[0].to_number())))
}

/// Numbers from all arguments, with arrays flattened
fn numbers(args: &[Value]) -> Vec<f64> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        arg.collect_numbers(&mut out);
    }
    out
}

/// NaN-propagating min/max
fn extremum(name: &str, args: &[Value], pick: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    check_arity(name, "at least 1", args.len(), !args.is_empty())?;
    let result = numbers(args)
        .into_iter()
        .reduce(|a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { pick(a, b) })
        .unwrap_or(f64::NAN);
    Ok(Value::Number(result))
}

fn sign(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() { x } else { x.signum() }
}

fn js_round(x: f64) -> f64 {
    (x + 0.5).floor()
}

pub(crate) fn call(name: &str, args: &[Value], rng: &mut dyn RngCore) -> Result<Value, EvalError> {
    match name {
        "abs" => unary(name, args, f64::abs),
        "floor" => unary(name, args, f64::floor),
        "ceil" => unary(name, args, f64::ceil),
        "round" => unary(name, args, js_round),
        "sqrt" => unary(name, args, f64::sqrt),
        "log" => unary(name, args, f64::ln),
        "log10" => unary(name, args, f64::log10),
        "exp" => unary(name, args, f64::exp),
        "sin" => unary(name, args, f64::sin),
        "cos" => unary(name, args, f64::cos),
        "tan" => unary(name, args, f64::tan),
        "sign" => unary(name, args, sign),
        "pow" => {
            check_arity(name, "2", args.len(), args.len() == 2)?;
            Ok(Value::Number(args[0].to_number().powf(args[1].to_number())))
        }
        "min" => extremum(name, args, f64::min),
        "max" => extremum(name, args, f64::max),
        "clamp" => {
            check_arity(name, "3", args.len(), args.len() == 3)?;
            let (x, lo, hi) = (
                args[0].to_number(),
                args[1].to_number(),
                args[2].to_number(),
            );
            if lo > hi {
                return Err(EvalError::InvalidArgument {
                    name: name.to_string(),
                    reason: format!("lower bound {lo} exceeds upper bound {hi}"),
                });
            }
            Ok(Value::Number(x.max(lo).min(hi)))
        }
        "sum" => Ok(Value::Number(numbers(args).iter().sum())),
        "mean" => {
            let xs = numbers(args);
            if xs.is_empty() {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(xs.iter().sum::<f64>() / xs.len() as f64))
        }
        "count" => Ok(Value::Number(numbers(args).len() as f64)),
        "length" => {
            check_arity(name, "1", args.len(), args.len() == 1)?;
            Ok(Value::Number(match &args[0] {
                Value::Array(items) => items.len() as f64,
                Value::String(s) => s.chars().count() as f64,
                Value::Object(map) => map.len() as f64,
                _ => 0.0,
            }))
        }
        "first" | "last" => {
            check_arity(name, "1", args.len(), args.len() == 1)?;
            let item = match &args[0] {
                Value::Array(items) if name == "first" => items.first(),
                Value::Array(items) => items.last(),
                _ => None,
            };
            Ok(item.cloned().unwrap_or_default())
        }
        "random" => match args {
            [] => Ok(Value::Number(rng.random::<f64>())),
            [lo, hi] => {
                let (lo, hi) = (lo.to_number(), hi.to_number());
                Ok(Value::Number(lo + rng.random::<f64>() * (hi - lo)))
            }
            _ => Err(EvalError::Arity {
                name: name.to_string(),
                expected: "0 or 2",
                found: args.len(),
            }),
        },
        "array" => Ok(Value::Array(args.to_vec())),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn run(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let mut rng = SmallRng::seed_from_u64(7);
        call(name, args, &mut rng)
    }

    fn num(name: &str, args: &[Value]) -> f64 {
        run(name, args).unwrap().to_number()
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(num("abs", &[(-3.0).into()]), 3.0);
        assert_eq!(num("round", &[2.5.into()]), 3.0);
        assert_eq!(num("round", &[(-2.5).into()]), -2.0);
        assert_eq!(num("pow", &[2.0.into(), 10.0.into()]), 1024.0);
        assert_eq!(num("sign", &[0.0.into()]), 0.0);
        assert_eq!(num("sign", &[(-4.0).into()]), -1.0);
        assert!(num("sqrt", &[(-1.0).into()]).is_nan());
        assert_eq!(num("log10", &[1000.0.into()]), 3.0);
    }

    #[test]
    fn test_statistics_flatten_arrays() {
        let xs = Value::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(num("sum", &[xs.clone(), 4.0.into()]), 10.0);
        assert_eq!(num("mean", &[xs.clone()]), 2.0);
        assert_eq!(num("count", &[xs.clone()]), 3.0);
        assert_eq!(num("max", &[xs.clone()]), 3.0);
        assert_eq!(num("min", &[5.0.into(), xs]), 1.0);
        assert_eq!(num("sum", &[]), 0.0);
        assert!(num("mean", &[Value::Array(vec![])]).is_nan());
        assert!(num("max", &[1.0.into(), f64::NAN.into()]).is_nan());
    }

    #[test]
    fn test_array_functions() {
        let xs = Value::from(vec![4.0, 5.0, 6.0]);
        assert_eq!(num("length", &[xs.clone()]), 3.0);
        assert_eq!(num("first", &[xs.clone()]), 4.0);
        assert_eq!(num("last", &[xs]), 6.0);
        assert_eq!(run("first", &[Value::Array(vec![])]).unwrap(), Value::Undefined);
        assert_eq!(num("length", &["abc".into()]), 3.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(num("clamp", &[15.0.into(), 0.0.into(), 10.0.into()]), 10.0);
        assert!(matches!(
            run("clamp", &[1.0.into(), 5.0.into(), 0.0.into()]),
            Err(EvalError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            run("nope", &[]),
            Err(EvalError::UnknownFunction("nope".into()))
        );
        assert!(matches!(
            run("sqrt", &[1.0.into(), 2.0.into()]),
            Err(EvalError::Arity { found: 2, .. })
        ));
        assert!(matches!(run("min", &[]), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_random_is_seeded() {
        let a = num("random", &[]);
        let b = num("random", &[]);
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
        let r = num("random", &[10.0.into(), 20.0.into()]);
        assert!((10.0..20.0).contains(&r));
    }
}
