use std::io::Write;
use std::rc::Rc;

use carrion_core::{Token, Type};

use crate::callable::{Arity, BoxedFunction};
use crate::interpreter::Interpreter;
use crate::limits::MAX_SEQUENCE_LENGTH;
use crate::ops;
use crate::trace::{BasicError, CustomError, ErrorObject};
use crate::value::{format_float, Value};

pub(crate) fn register(interpreter: &mut Interpreter) {
    let stdout = interpreter.stdout();
    let print: BoxedFunction = Box::new(move |args: &[Value]| -> Result<Value, BasicError> {
        let line = args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<String>>()
            .join(" ");
        writeln!(stdout.borrow_mut(), "{}", line)
            .map_err(|err| BasicError::new(format!("cannot write output: {}", err)))?;
        Ok(Value::None)
    });

    interpreter.register_builtin("print", Arity::Variadic, print);
    interpreter.register_builtin("len", Arity::Fixed(1), Box::new(len));
    interpreter.register_builtin("type", Arity::Fixed(1), Box::new(type_of));
    interpreter.register_builtin("str", Arity::Fixed(1), Box::new(to_str));
    interpreter.register_builtin("int", Arity::Fixed(1), Box::new(int));
    interpreter.register_builtin("float", Arity::Fixed(1), Box::new(float));
    interpreter.register_builtin("bool", Arity::Fixed(1), Box::new(to_bool));
    interpreter.register_builtin("range", Arity::Range(1, 3), Box::new(range));
    interpreter.register_builtin("abs", Arity::Fixed(1), Box::new(abs));
    interpreter.register_builtin("max", Arity::Variadic, Box::new(max));
    interpreter.register_builtin("min", Arity::Variadic, Box::new(min));
    interpreter.register_builtin("enumerate", Arity::Fixed(1), Box::new(enumerate));
    interpreter.register_builtin("pairs", Arity::Fixed(1), Box::new(pairs));
    interpreter.register_builtin("list", Arity::Fixed(1), Box::new(to_list));
    interpreter.register_builtin("tuple", Arity::Fixed(1), Box::new(to_tuple));
    interpreter.register_builtin("ord", Arity::Fixed(1), Box::new(ord));
    interpreter.register_builtin("chr", Arity::Fixed(1), Box::new(chr));
    interpreter.register_builtin("Error", Arity::Range(1, 2), Box::new(error));
}

fn elements(value: &Value, name: &str) -> Result<Vec<Value>, BasicError> {
    value.elements().ok_or_else(|| {
        BasicError::new(format!(
            "type mismatch: {}() expects a sequence, got {}",
            name,
            value.type_name()
        ))
    })
}

fn len(args: &[Value]) -> Result<Value, BasicError> {
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Array(elements) => elements.borrow().len(),
        Value::Tuple(elements) => elements.len(),
        Value::Hash(pairs) => pairs.borrow().len(),
        other => {
            return Err(BasicError::new(format!(
                "cannot take the length of {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::from(len))
}

fn to_str(args: &[Value]) -> Result<Value, BasicError> {
    Ok(Value::from(args[0].to_string()))
}

fn to_bool(args: &[Value]) -> Result<Value, BasicError> {
    Ok(Value::Boolean(args[0].is_truthy()))
}

fn to_list(args: &[Value]) -> Result<Value, BasicError> {
    Ok(Value::array(elements(&args[0], "list")?))
}

fn to_tuple(args: &[Value]) -> Result<Value, BasicError> {
    Ok(Value::tuple(elements(&args[0], "tuple")?))
}

fn type_of(args: &[Value]) -> Result<Value, BasicError> {
    let name = match &args[0] {
        Value::Integer(_) => "Integer",
        Value::Float(_) => "Float",
        Value::Str(_) => "String",
        Value::Boolean(_) => "Boolean",
        Value::Array(_) => "Array",
        Value::Hash(_) => "Map",
        Value::Tuple(_) => "Tuple",
        Value::None => "None",
        Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_) => "Function",
        Value::Grimoire(_) => "Grimoire",
        Value::Namespace(_) => "Namespace",
        Value::Error(_) | Value::Caught(_) => "Error",
        Value::Instance(instance) => return Ok(Value::from(instance.grimoire.name.as_str())),
    };
    Ok(Value::from(name))
}

fn int(args: &[Value]) -> Result<Value, BasicError> {
    let convert_err = || BasicError::new(format!("cannot convert {} to Integer", repr(&args[0])));
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Float(n) if n.is_finite() && n.abs() < i64::MAX as f64 => {
            Ok(Value::Integer(n.trunc() as i64))
        }
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(Value::Integer(n));
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(Value::Integer(n.trunc() as i64)),
                _ => Err(convert_err()),
            }
        }
        _ => Err(convert_err()),
    }
}

fn float(args: &[Value]) -> Result<Value, BasicError> {
    match &args[0] {
        Value::Integer(n) => Ok(Value::Float(*n as f64)),
        Value::Float(n) => Ok(Value::Float(*n)),
        Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| BasicError::new(format!("cannot convert {} to Float", repr(&args[0])))),
        other => Err(BasicError::new(format!(
            "cannot convert {} to Float",
            repr(other)
        ))),
    }
}

fn range(args: &[Value]) -> Result<Value, BasicError> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Integer(n) => bounds.push(*n),
            other => {
                return Err(BasicError::new(format!(
                    "type mismatch: range() expects INTEGER, got {}",
                    other.type_name()
                )))
            }
        }
    }

    let (start, stop, step) = match bounds[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => return Err(BasicError::new("wrong number of arguments: want=1..=3")),
    };
    if step == 0 {
        return Err(BasicError::new("range() step must not be zero"));
    }

    // Counted in i128 so that extreme bounds cannot overflow
    let span = i128::from(stop) - i128::from(start);
    let step_wide = i128::from(step);
    let count = if span == 0 || (span > 0) != (step_wide > 0) {
        0
    } else {
        (span.abs() + step_wide.abs() - 1) / step_wide.abs()
    };
    if count > MAX_SEQUENCE_LENGTH as i128 {
        return Err(BasicError::new(format!(
            "range too large: {} elements",
            count
        )));
    }

    let values = (0..count as i64)
        .map(|i| Value::Integer(start + i * step))
        .collect();
    Ok(Value::array(values))
}

fn abs(args: &[Value]) -> Result<Value, BasicError> {
    match &args[0] {
        Value::Integer(n) => n
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| BasicError::new("integer overflow")),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        other => Err(BasicError::new(format!(
            "type mismatch: abs() expects a number, got {}",
            other.type_name()
        ))),
    }
}

fn max(args: &[Value]) -> Result<Value, BasicError> {
    extreme(args, Type::Greater, "max")
}

fn min(args: &[Value]) -> Result<Value, BasicError> {
    extreme(args, Type::Less, "min")
}

// A single sequence argument is searched element-wise, otherwise the arguments themselves
fn extreme(args: &[Value], ordering: Type, name: &str) -> Result<Value, BasicError> {
    let candidates = match args {
        [single @ (Value::Array(_) | Value::Tuple(_))] => elements(single, name)?,
        _ => args.to_vec(),
    };

    let operator = Token::synthetic(ordering, if ordering == Type::Greater { ">" } else { "<" });
    let mut candidates = candidates.into_iter();
    let mut best = candidates
        .next()
        .ok_or_else(|| BasicError::new(format!("{}() of an empty sequence", name)))?;
    for candidate in candidates {
        if ops::binary_op(&operator, &candidate, &best)?.is_truthy() {
            best = candidate;
        }
    }
    Ok(best)
}

fn enumerate(args: &[Value]) -> Result<Value, BasicError> {
    let pairs = elements(&args[0], "enumerate")?
        .into_iter()
        .enumerate()
        .map(|(i, element)| Value::tuple(vec![Value::from(i), element]))
        .collect();
    Ok(Value::array(pairs))
}

fn pairs(args: &[Value]) -> Result<Value, BasicError> {
    match &args[0] {
        Value::Hash(pairs) => Ok(Value::array(
            Value::sorted_pairs(&pairs.borrow())
                .into_iter()
                .map(|(key, value)| Value::tuple(vec![key, value]))
                .collect(),
        )),
        other => Err(BasicError::new(format!(
            "type mismatch: pairs() expects MAP, got {}",
            other.type_name()
        ))),
    }
}

fn ord(args: &[Value]) -> Result<Value, BasicError> {
    if let Value::Str(s) = &args[0] {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(Value::from(c as u32));
        }
    }
    Err(BasicError::new(format!(
        "ord() expects a single character, got {}",
        repr(&args[0])
    )))
}

fn chr(args: &[Value]) -> Result<Value, BasicError> {
    match &args[0] {
        Value::Integer(n) => u32::try_from(*n)
            .ok()
            .and_then(char::from_u32)
            .map(|c| Value::from(c.to_string()))
            .ok_or_else(|| BasicError::new(format!("chr() code point out of range: {}", n))),
        other => Err(BasicError::new(format!(
            "type mismatch: chr() expects INTEGER, got {}",
            other.type_name()
        ))),
    }
}

// `Error(name)` or `Error(name, message)`, inert until raised
fn error(args: &[Value]) -> Result<Value, BasicError> {
    let name = match &args[0] {
        Value::Str(name) => name.to_string(),
        other => {
            return Err(BasicError::new(format!(
                "type mismatch: Error() name must be STRING, got {}",
                other.type_name()
            )))
        }
    };
    let message = args.get(1).map(|message| message.to_string()).unwrap_or_default();
    Ok(Value::Error(Rc::new(ErrorObject::Custom(CustomError::new(
        &name, &message,
    )))))
}

fn repr(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s),
        Value::Float(n) => format_float(*n),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::builtins::{chr, enumerate, error, extreme, int, len, ord, range, type_of};
    use crate::value::Value;
    use carrion_core::Type;

    #[test]
    fn test_len() {
        assert_eq!(len(&[Value::from("héllo")]).unwrap(), Value::from(5));
        assert_eq!(len(&[Value::from(vec![Value::None])]).unwrap(), Value::from(1));
        assert_eq!(
            len(&[Value::from(1)]).unwrap_err().message,
            "cannot take the length of INTEGER"
        );
    }

    #[test]
    fn test_type_names() {
        let tests = [
            (Value::from(1), "Integer"),
            (Value::from(1.5), "Float"),
            (Value::from("s"), "String"),
            (Value::from(true), "Boolean"),
            (Value::array(Vec::new()), "Array"),
            (Value::hash(Vec::new()).unwrap(), "Map"),
            (Value::tuple(Vec::new()), "Tuple"),
            (Value::None, "None"),
        ];

        for (value, expected) in tests {
            assert_eq!(type_of(&[value]).unwrap(), Value::from(expected));
        }
    }

    #[test]
    fn test_conversions() {
        assert_eq!(int(&[Value::from("42")]).unwrap(), Value::from(42));
        assert_eq!(int(&[Value::from(-3.7)]).unwrap(), Value::from(-3));
        assert_eq!(int(&[Value::from(true)]).unwrap(), Value::from(1));
        assert_eq!(
            int(&[Value::from("abc")]).unwrap_err().message,
            "cannot convert \"abc\" to Integer"
        );
        assert_eq!(ord(&[Value::from("A")]).unwrap(), Value::from(65));
        assert_eq!(chr(&[Value::from(97)]).unwrap(), Value::from("a"));
    }

    #[test]
    fn test_range() {
        let tests = [
            (vec![Value::from(3)], "[0, 1, 2]"),
            (vec![Value::from(2), Value::from(5)], "[2, 3, 4]"),
            (vec![Value::from(5), Value::from(0), Value::from(-2)], "[5, 3, 1]"),
            (vec![Value::from(0)], "[]"),
        ];

        for (args, expected) in tests {
            assert_eq!(range(&args).unwrap().to_string(), expected);
        }

        let args = [Value::from(i64::MIN), Value::from(i64::MAX)];
        assert!(range(&args)
            .unwrap_err()
            .message
            .starts_with("range too large"));

        let args = [Value::from(0), Value::from(5), Value::from(0)];
        assert_eq!(
            range(&args).unwrap_err().message,
            "range() step must not be zero"
        );
    }

    #[test]
    fn test_extremes() {
        let args = [Value::from(3), Value::from(7.5), Value::from(-1)];
        assert_eq!(extreme(&args, Type::Greater, "max").unwrap(), Value::from(7.5));
        assert_eq!(extreme(&args, Type::Less, "min").unwrap(), Value::from(-1));

        let sequence = [Value::from(vec![Value::from("b"), Value::from("a")])];
        assert_eq!(extreme(&sequence, Type::Less, "min").unwrap(), Value::from("a"));
        assert!(extreme(&[Value::array(Vec::new())], Type::Less, "min").is_err());
    }

    #[test]
    fn test_enumerate() {
        let args = [Value::from(vec![Value::from("a"), Value::from("b")])];
        assert_eq!(enumerate(&args).unwrap().to_string(), "[(0, \"a\"), (1, \"b\")]");
    }

    #[test]
    fn test_error_values() {
        let value = error(&[Value::from("ValueError"), Value::from("bad input")]).unwrap();
        assert_eq!(value.to_string(), "ValueError: bad input");
        assert_eq!(value.type_name(), "ERROR");
    }
}
