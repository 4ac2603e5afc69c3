//! Argument marshalling for host functions.
//!
//! Host functions receive raw script values and declare the shape they expect
//! for each position as an [`ArgSlot`]. [`parse_args`] converts positionally
//! and fails on the first argument that does not fit; slots past the supplied
//! arguments keep whatever default the caller put there.

use crate::conversion::dynamic_to_json;
use rhai::Dynamic;
use sb_error::ArgError;
use serde_json::{Map, Value};

/// Destination for one positional argument.
#[derive(Debug)]
pub enum ArgSlot<'a> {
    /// String or character
    Str(&'a mut String),
    /// Integer that fits in 32 bits
    Int(&'a mut i32),
    /// Integer
    Int64(&'a mut i64),
    /// Float, or an integer widened to float
    Float(&'a mut f64),
    /// Boolean
    Bool(&'a mut bool),
    /// Object map
    Map(&'a mut Map<String, Value>),
    /// Array of arbitrary values
    List(&'a mut Vec<Value>),
    /// Array whose every element is an object map
    MapList(&'a mut Vec<Map<String, Value>>),
    /// Any value with a JSON form
    Value(&'a mut Value),
    /// The script value as-is
    Dynamic(&'a mut Dynamic),
}

impl ArgSlot<'_> {
    fn expected(&self) -> &'static str {
        match self {
            ArgSlot::Str(_) => "string",
            ArgSlot::Int(_) => "int32",
            ArgSlot::Int64(_) => "int64",
            ArgSlot::Float(_) => "float",
            ArgSlot::Bool(_) => "bool",
            ArgSlot::Map(_) => "object map",
            ArgSlot::List(_) => "array",
            ArgSlot::MapList(_) => "array of object maps",
            ArgSlot::Value(_) => "value",
            ArgSlot::Dynamic(_) => "dynamic",
        }
    }
}

/// Converts `args` into `slots` position by position.
///
/// # Errors
///
/// - [`ArgError::TooManyArguments`] if more arguments than slots are supplied
/// - [`ArgError::UndefinedArgument`] if a supplied argument is `()`
/// - [`ArgError::UnsupportedType`] if an argument has the wrong shape
pub fn parse_args(args: &[Dynamic], slots: &mut [ArgSlot<'_>]) -> Result<(), ArgError> {
    if args.len() > slots.len() {
        return Err(ArgError::TooManyArguments {
            supplied: args.len(),
            expected: slots.len(),
        });
    }

    for (position, (arg, slot)) in args.iter().zip(slots.iter_mut()).enumerate() {
        let arg = arg.flatten_clone();
        if arg.is_unit() {
            return Err(ArgError::UndefinedArgument { position });
        }

        let expected = slot.expected();
        let unsupported = |found: &str| ArgError::UnsupportedType {
            position,
            found: found.to_string(),
            expected,
        };
        let found = arg.type_name();

        match slot {
            ArgSlot::Str(dest) => {
                **dest = if let Ok(c) = arg.as_char() {
                    c.to_string()
                } else {
                    arg.into_string().map_err(unsupported)?
                };
            }
            ArgSlot::Int(dest) => {
                let value = arg.as_int().map_err(unsupported)?;
                **dest = i32::try_from(value).map_err(|_| unsupported("integer out of range"))?;
            }
            ArgSlot::Int64(dest) => {
                **dest = arg.as_int().map_err(unsupported)?;
            }
            ArgSlot::Float(dest) => {
                **dest = match arg.as_float() {
                    Ok(f) => f,
                    Err(_) => arg.as_int().map_err(unsupported)? as f64,
                };
            }
            ArgSlot::Bool(dest) => {
                **dest = arg.as_bool().map_err(unsupported)?;
            }
            ArgSlot::Map(dest) => {
                if !arg.is_map() {
                    return Err(unsupported(found));
                }
                match dynamic_to_json(&arg).map_err(|t| unsupported(&t))? {
                    Value::Object(fields) => **dest = fields,
                    _ => return Err(unsupported(found)),
                }
            }
            ArgSlot::List(dest) => {
                if !arg.is_array() {
                    return Err(unsupported(found));
                }
                match dynamic_to_json(&arg).map_err(|t| unsupported(&t))? {
                    Value::Array(items) => **dest = items,
                    _ => return Err(unsupported(found)),
                }
            }
            ArgSlot::MapList(dest) => {
                if !arg.is_array() {
                    return Err(unsupported(found));
                }
                let items = match dynamic_to_json(&arg).map_err(|t| unsupported(&t))? {
                    Value::Array(items) => items,
                    _ => return Err(unsupported(found)),
                };
                let mut maps = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(fields) => maps.push(fields),
                        _ => return Err(unsupported("array with non-map element")),
                    }
                }
                **dest = maps;
            }
            ArgSlot::Value(dest) => {
                **dest = dynamic_to_json(&arg).map_err(|t| unsupported(&t))?;
            }
            ArgSlot::Dynamic(dest) => {
                **dest = arg;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string(s: &str) -> Dynamic {
        Dynamic::from(s.to_string())
    }

    #[test]
    fn test_strings_with_defaults() {
        let mut url = String::new();
        let mut method = "GET".to_string();

        parse_args(
            &[string("http://localhost")],
            &mut [ArgSlot::Str(&mut url), ArgSlot::Str(&mut method)],
        )
        .unwrap();

        assert_eq!(url, "http://localhost");
        assert_eq!(method, "GET");
    }

    #[test]
    fn test_char_fills_string_slot() {
        let mut s = String::new();
        parse_args(&[Dynamic::from('x')], &mut [ArgSlot::Str(&mut s)]).unwrap();
        assert_eq!(s, "x");
    }

    #[test]
    fn test_too_many_arguments() {
        let mut key = String::new();
        let err = parse_args(&[string("a"), string("b")], &mut [ArgSlot::Str(&mut key)])
            .unwrap_err();

        assert_eq!(
            err,
            ArgError::TooManyArguments {
                supplied: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn test_unit_argument_is_undefined() {
        let mut key = String::new();
        let mut value = String::new();
        let err = parse_args(
            &[string("k"), Dynamic::UNIT],
            &mut [ArgSlot::Str(&mut key), ArgSlot::Str(&mut value)],
        )
        .unwrap_err();

        assert_eq!(err, ArgError::UndefinedArgument { position: 1 });
    }

    #[test]
    fn test_number_into_string_slot_is_rejected() {
        let mut key = String::new();
        let err = parse_args(&[Dynamic::from(5_i64)], &mut [ArgSlot::Str(&mut key)]).unwrap_err();

        assert!(matches!(
            err,
            ArgError::UnsupportedType {
                position: 0,
                expected: "string",
                ..
            }
        ));
    }

    #[test]
    fn test_numeric_slots() {
        let mut small = 0_i32;
        let mut big = 0_i64;
        let mut ratio = 0.0_f64;
        let mut flag = false;

        parse_args(
            &[
                Dynamic::from(7_i64),
                Dynamic::from(1_i64 << 40),
                Dynamic::from(3_i64),
                Dynamic::from(true),
            ],
            &mut [
                ArgSlot::Int(&mut small),
                ArgSlot::Int64(&mut big),
                ArgSlot::Float(&mut ratio),
                ArgSlot::Bool(&mut flag),
            ],
        )
        .unwrap();

        assert_eq!(small, 7);
        assert_eq!(big, 1 << 40);
        assert_eq!(ratio, 3.0);
        assert!(flag);
    }

    #[test]
    fn test_int32_range_is_checked() {
        let mut small = 0_i32;
        let err =
            parse_args(&[Dynamic::from(1_i64 << 40)], &mut [ArgSlot::Int(&mut small)]).unwrap_err();
        assert!(matches!(err, ArgError::UnsupportedType { position: 0, .. }));
    }

    #[test]
    fn test_float_is_not_narrowed_to_int() {
        let mut n = 0_i64;
        let err = parse_args(&[Dynamic::from(1.5_f64)], &mut [ArgSlot::Int64(&mut n)]).unwrap_err();
        assert!(matches!(err, ArgError::UnsupportedType { .. }));
    }

    #[test]
    fn test_structured_slots() {
        let engine = rhai::Engine::new();
        let map: Dynamic = engine.eval(r#"#{ a: 1 }"#).unwrap();
        let list: Dynamic = engine.eval(r#"[1, "x"]"#).unwrap();
        let maps: Dynamic = engine.eval(r#"[#{ a: 1 }, #{ b: 2 }]"#).unwrap();

        let mut m = Map::new();
        let mut l = Vec::new();
        let mut ml = Vec::new();
        let mut v = Value::Null;

        parse_args(
            &[map, list, maps, Dynamic::from(false)],
            &mut [
                ArgSlot::Map(&mut m),
                ArgSlot::List(&mut l),
                ArgSlot::MapList(&mut ml),
                ArgSlot::Value(&mut v),
            ],
        )
        .unwrap();

        assert_eq!(Value::Object(m), json!({"a": 1}));
        assert_eq!(l, vec![json!(1), json!("x")]);
        assert_eq!(ml.len(), 2);
        assert_eq!(v, json!(false));
    }

    #[test]
    fn test_map_list_rejects_mixed_array() {
        let engine = rhai::Engine::new();
        let mixed: Dynamic = engine.eval(r#"[#{ a: 1 }, 2]"#).unwrap();
        let mut ml = Vec::new();

        let err = parse_args(&[mixed], &mut [ArgSlot::MapList(&mut ml)]).unwrap_err();
        assert!(matches!(err, ArgError::UnsupportedType { .. }));
        assert!(ml.is_empty());
    }

    #[test]
    fn test_dynamic_passthrough() {
        let mut d = Dynamic::UNIT;
        parse_args(&[Dynamic::from(9_i64)], &mut [ArgSlot::Dynamic(&mut d)]).unwrap();
        assert_eq!(d.as_int(), Ok(9));
    }
}
