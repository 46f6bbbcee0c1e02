use std::mem::discriminant;
use std::rc::Rc;

use carrion_core::{Token, Type};

use crate::limits::MAX_SEQUENCE_LENGTH;
use crate::trace::BasicError;
use crate::value::{HashKey, Value};

// Operators dispatch on the pair of runtime kinds. Anything without an explicit rule is an error,
// there are no implicit coercions apart from integer to float promotion.

pub(crate) fn binary_op(operator: &Token, left: &Value, right: &Value) -> Result<Value, BasicError> {
    match operator.ty {
        Type::Equal | Type::NotEqual => return equality(operator, left, right),
        Type::In => return membership(operator, left, right).map(Value::Boolean),
        Type::Not => return membership(operator, left, right).map(|found| Value::Boolean(!found)),
        _ => {}
    }

    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => integer_op(operator, *l, *r, left, right),
        (Value::Integer(l), Value::Float(r)) => float_op(operator, *l as f64, *r, left, right),
        (Value::Float(l), Value::Integer(r)) => float_op(operator, *l, *r as f64, left, right),
        (Value::Float(l), Value::Float(r)) => float_op(operator, *l, *r, left, right),
        (Value::Str(l), Value::Str(r)) => string_op(operator, l, r, left, right),
        (Value::Str(s), Value::Integer(n)) if operator.is(Type::Star) => {
            let count = if s.is_empty() { 0 } else { repetitions(*n) };
            let mut repeated = String::new();
            repeated
                .try_reserve(repeated_len(s.len(), count)?)
                .map_err(|_| BasicError::new("repetition too large"))?;
            for _ in 0..count {
                repeated.push_str(s);
            }
            Ok(Value::from(repeated))
        }
        (Value::Array(l), Value::Array(r)) if operator.is(Type::Plus) => {
            let mut elements = l.borrow().clone();
            elements.extend(r.borrow().iter().cloned());
            Ok(Value::array(elements))
        }
        (Value::Array(elements), Value::Integer(n)) if operator.is(Type::Star) => {
            let elements = elements.borrow();
            let count = if elements.is_empty() { 0 } else { repetitions(*n) };
            let mut repeated = Vec::new();
            repeated
                .try_reserve(repeated_len(elements.len(), count)?)
                .map_err(|_| BasicError::new("repetition too large"))?;
            for _ in 0..count {
                repeated.extend(elements.iter().cloned());
            }
            Ok(Value::array(repeated))
        }
        (Value::Tuple(l), Value::Tuple(r)) if operator.is(Type::Plus) => {
            Ok(Value::tuple(l.iter().chain(r.iter()).cloned().collect()))
        }
        (Value::Boolean(l), Value::Boolean(r)) => match operator.ty {
            Type::Ampersand => Ok(Value::Boolean(l & r)),
            Type::Pipe => Ok(Value::Boolean(l | r)),
            Type::Caret => Ok(Value::Boolean(l ^ r)),
            _ => Err(mismatch(operator, left, right)),
        },
        _ => Err(mismatch(operator, left, right)),
    }
}

pub(crate) fn unary_op(operator: &Token, right: &Value) -> Result<Value, BasicError> {
    match (operator.ty, right) {
        (Type::Bang | Type::Not, _) => Ok(Value::Boolean(!right.is_truthy())),
        (Type::Minus, Value::Integer(n)) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| BasicError::new("integer overflow")),
        (Type::Minus, Value::Float(n)) => Ok(Value::Float(-n)),
        (Type::Plus, Value::Integer(_) | Value::Float(_)) => Ok(right.clone()),
        (Type::Tilde, Value::Integer(n)) => Ok(Value::Integer(!n)),
        _ => Err(BasicError::new(format!(
            "unknown operator: {}{}",
            operator.lexeme,
            right.type_name()
        ))),
    }
}

/// The arithmetic operator a compound assignment applies, positioned at the assignment.
pub(crate) fn compound_operator(operator: &Token) -> Option<Token> {
    let (ty, lexeme) = match operator.ty {
        Type::PlusAssign | Type::Increment => (Type::Plus, "+"),
        Type::MinusAssign | Type::Decrement => (Type::Minus, "-"),
        Type::StarAssign => (Type::Star, "*"),
        Type::SlashAssign => (Type::Slash, "/"),
        _ => return None,
    };
    let mut token = Token::synthetic(ty, lexeme);
    token.line = operator.line;
    token.col = operator.col;
    Some(token)
}

/// Equality used by `case` clauses, values of different kinds never match.
pub(crate) fn matches_case(subject: &Value, case: &Value) -> bool {
    discriminant(subject) == discriminant(case) && subject == case
}

pub(crate) fn index(object: &Value, index: &Value) -> Result<Value, BasicError> {
    match (object, index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let elements = elements.borrow();
            element_at(&elements, *i).map(|position| elements[position].clone())
        }
        (Value::Tuple(elements), Value::Integer(i)) => {
            element_at(elements, *i).map(|position| elements[position].clone())
        }
        (Value::Str(s), Value::Integer(i)) => {
            let chars: Vec<char> = s.chars().collect();
            element_at(&chars, *i).map(|position| Value::from(chars[position].to_string()))
        }
        (Value::Hash(pairs), key) => {
            let key = HashKey::from_value(key)?;
            Ok(pairs
                .borrow()
                .get(&key)
                .map_or(Value::None, |(_, value)| value.clone()))
        }
        (Value::Array(_) | Value::Tuple(_) | Value::Str(_), _) => Err(BasicError::new(format!(
            "type mismatch: cannot index {} with {}",
            object.type_name(),
            index.type_name()
        ))),
        _ => Err(BasicError::new(format!(
            "cannot index value of type {}",
            object.type_name()
        ))),
    }
}

pub(crate) fn slice(
    object: &Value,
    start: Option<&Value>,
    end: Option<&Value>,
) -> Result<Value, BasicError> {
    let start = slice_bound(start)?;
    let end = slice_bound(end)?;

    match object {
        Value::Array(elements) => {
            let elements = elements.borrow();
            let (from, to) = clamp_range(start, end, elements.len());
            Ok(Value::array(elements[from..to].to_vec()))
        }
        Value::Tuple(elements) => {
            let (from, to) = clamp_range(start, end, elements.len());
            Ok(Value::tuple(elements[from..to].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = clamp_range(start, end, chars.len());
            Ok(Value::from(chars[from..to].iter().collect::<String>()))
        }
        _ => Err(BasicError::new(format!(
            "cannot slice value of type {}",
            object.type_name()
        ))),
    }
}

pub(crate) fn set_index(object: &Value, index: &Value, value: Value) -> Result<(), BasicError> {
    match (object, index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let mut elements = elements.borrow_mut();
            let position = element_at(&elements, *i)?;
            elements[position] = value;
            Ok(())
        }
        (Value::Array(_), _) => Err(BasicError::new(format!(
            "type mismatch: cannot index ARRAY with {}",
            index.type_name()
        ))),
        (Value::Hash(pairs), key) => {
            let hashed = HashKey::from_value(key)?;
            pairs.borrow_mut().insert(hashed, (key.clone(), value));
            Ok(())
        }
        _ => Err(BasicError::new(format!(
            "cannot assign to index of {}",
            object.type_name()
        ))),
    }
}

fn element_at<T>(elements: &[T], i: i64) -> Result<usize, BasicError> {
    let len = elements.len() as i64;
    let position = if i < 0 { i + len } else { i };
    if position < 0 || position >= len {
        Err(BasicError::new(format!(
            "index out of bounds: index {} for length {}",
            i, len
        )))
    } else {
        Ok(position as usize)
    }
}

fn slice_bound(bound: Option<&Value>) -> Result<Option<i64>, BasicError> {
    match bound {
        None | Some(Value::None) => Ok(None),
        Some(Value::Integer(n)) => Ok(Some(*n)),
        Some(other) => Err(BasicError::new(format!(
            "type mismatch: slice bounds must be INTEGER, got {}",
            other.type_name()
        ))),
    }
}

// Out of range bounds clamp to the sequence instead of failing
fn clamp_range(start: Option<i64>, end: Option<i64>, len: usize) -> (usize, usize) {
    let len = len as i64;
    let resolve = |bound: i64| {
        if bound < 0 {
            (bound + len).max(0)
        } else {
            bound.min(len)
        }
    };
    let from = start.map_or(0, resolve);
    let to = end.map_or(len, resolve);
    if from > to {
        (from as usize, from as usize)
    } else {
        (from as usize, to as usize)
    }
}

fn repetitions(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}

// Length of `count` copies of a sequence of `len` items, bounded by MAX_SEQUENCE_LENGTH
fn repeated_len(len: usize, count: usize) -> Result<usize, BasicError> {
    len.checked_mul(count)
        .filter(|total| *total <= MAX_SEQUENCE_LENGTH)
        .ok_or_else(|| BasicError::new("repetition too large"))
}

fn mismatch(operator: &Token, left: &Value, right: &Value) -> BasicError {
    let kind = if discriminant(left) == discriminant(right) {
        "unknown operator"
    } else {
        "type mismatch"
    };
    BasicError::new(format!(
        "{}: {} {} {}",
        kind,
        left.type_name(),
        operator.lexeme,
        right.type_name()
    ))
}

fn equality(operator: &Token, left: &Value, right: &Value) -> Result<Value, BasicError> {
    let comparable = match (left, right) {
        (Value::None, _) | (_, Value::None) => true,
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => true,
        _ => discriminant(left) == discriminant(right),
    };
    if !comparable {
        return Err(mismatch(operator, left, right));
    }

    let equal = left == right;
    Ok(Value::Boolean(if operator.is(Type::Equal) {
        equal
    } else {
        !equal
    }))
}

fn membership(operator: &Token, needle: &Value, haystack: &Value) -> Result<bool, BasicError> {
    match (needle, haystack) {
        (_, Value::Array(elements)) => Ok(elements.borrow().iter().any(|element| element == needle)),
        (_, Value::Tuple(elements)) => Ok(elements.iter().any(|element| element == needle)),
        (Value::Str(needle), Value::Str(haystack)) => Ok(haystack.contains(needle.as_ref())),
        (_, Value::Hash(pairs)) => {
            let key = HashKey::from_value(needle)?;
            Ok(pairs.borrow().contains_key(&key))
        }
        _ => Err(mismatch(operator, needle, haystack)),
    }
}

fn integer_op(
    operator: &Token,
    l: i64,
    r: i64,
    left: &Value,
    right: &Value,
) -> Result<Value, BasicError> {
    let overflow = || BasicError::new("integer overflow");
    match operator.ty {
        Type::Plus => l.checked_add(r).map(Value::Integer).ok_or_else(overflow),
        Type::Minus => l.checked_sub(r).map(Value::Integer).ok_or_else(overflow),
        Type::Star => l.checked_mul(r).map(Value::Integer).ok_or_else(overflow),
        // Truncates toward zero
        Type::Slash => {
            if r == 0 {
                return Err(BasicError::new("division by zero"));
            }
            l.checked_div(r).map(Value::Integer).ok_or_else(overflow)
        }
        // Takes the sign of the dividend
        Type::Percent => {
            if r == 0 {
                return Err(BasicError::new("modulo by zero"));
            }
            l.checked_rem(r).map(Value::Integer).ok_or_else(overflow)
        }
        Type::Power => {
            if r >= 0 {
                u32::try_from(r)
                    .ok()
                    .and_then(|exponent| l.checked_pow(exponent))
                    .map(Value::Integer)
                    .ok_or_else(overflow)
            } else {
                Ok(Value::Float((l as f64).powf(r as f64)))
            }
        }
        Type::Less => Ok(Value::Boolean(l < r)),
        Type::Greater => Ok(Value::Boolean(l > r)),
        Type::LessEqual => Ok(Value::Boolean(l <= r)),
        Type::GreaterEqual => Ok(Value::Boolean(l >= r)),
        Type::Ampersand => Ok(Value::Integer(l & r)),
        Type::Pipe => Ok(Value::Integer(l | r)),
        Type::Caret => Ok(Value::Integer(l ^ r)),
        Type::ShiftLeft | Type::ShiftRight => {
            let amount = u32::try_from(r)
                .ok()
                .filter(|amount| *amount < i64::BITS)
                .ok_or_else(|| BasicError::new("invalid shift amount"))?;
            if operator.is(Type::ShiftLeft) {
                Ok(Value::Integer(l << amount))
            } else {
                Ok(Value::Integer(l >> amount))
            }
        }
        _ => Err(mismatch(operator, left, right)),
    }
}

fn float_op(
    operator: &Token,
    l: f64,
    r: f64,
    left: &Value,
    right: &Value,
) -> Result<Value, BasicError> {
    match operator.ty {
        Type::Plus => Ok(Value::Float(l + r)),
        Type::Minus => Ok(Value::Float(l - r)),
        Type::Star => Ok(Value::Float(l * r)),
        Type::Slash => {
            if r == 0.0 {
                return Err(BasicError::new("division by zero"));
            }
            Ok(Value::Float(l / r))
        }
        Type::Percent => {
            if r == 0.0 {
                return Err(BasicError::new("modulo by zero"));
            }
            Ok(Value::Float(l % r))
        }
        Type::Power => Ok(Value::Float(l.powf(r))),
        Type::Less => Ok(Value::Boolean(l < r)),
        Type::Greater => Ok(Value::Boolean(l > r)),
        Type::LessEqual => Ok(Value::Boolean(l <= r)),
        Type::GreaterEqual => Ok(Value::Boolean(l >= r)),
        _ => Err(mismatch(operator, left, right)),
    }
}

fn string_op(
    operator: &Token,
    l: &Rc<str>,
    r: &Rc<str>,
    left: &Value,
    right: &Value,
) -> Result<Value, BasicError> {
    match operator.ty {
        Type::Plus => Ok(Value::from(format!("{}{}", l, r))),
        Type::Less => Ok(Value::Boolean(l < r)),
        Type::Greater => Ok(Value::Boolean(l > r)),
        Type::LessEqual => Ok(Value::Boolean(l <= r)),
        Type::GreaterEqual => Ok(Value::Boolean(l >= r)),
        _ => Err(mismatch(operator, left, right)),
    }
}

#[cfg(test)]
mod tests {
    use carrion_core::{Token, Type};

    use crate::ops::{binary_op, index, matches_case, set_index, slice, unary_op};
    use crate::value::Value;

    fn op(ty: Type, lexeme: &str) -> Token {
        Token::synthetic(ty, lexeme)
    }

    #[test]
    fn test_arithmetic() {
        let tests = [
            (Value::from(7), op(Type::Slash, "/"), Value::from(2), Value::from(3)),
            (Value::from(-7), op(Type::Slash, "/"), Value::from(2), Value::from(-3)),
            (Value::from(-7), op(Type::Percent, "%"), Value::from(3), Value::from(-1)),
            (Value::from(7), op(Type::Percent, "%"), Value::from(-3), Value::from(1)),
            (Value::from(2), op(Type::Power, "**"), Value::from(10), Value::from(1024)),
            (Value::from(2), op(Type::Power, "**"), Value::from(-1), Value::from(0.5)),
            (Value::from(1), op(Type::Plus, "+"), Value::from(0.5), Value::from(1.5)),
            (Value::from(7.0), op(Type::Slash, "/"), Value::from(2), Value::from(3.5)),
            (Value::from(1), op(Type::ShiftLeft, "<<"), Value::from(4), Value::from(16)),
            (Value::from(6), op(Type::Ampersand, "&"), Value::from(3), Value::from(2)),
        ];

        for (left, operator, right, expected) in tests {
            let result = binary_op(&operator, &left, &right).unwrap();
            assert_eq!(result, expected, "{} {} {}", left, operator.lexeme, right);
            assert_eq!(result.type_name(), expected.type_name());
        }
    }

    #[test]
    fn test_sequences() {
        let plus = op(Type::Plus, "+");
        let star = op(Type::Star, "*");

        let result = binary_op(&plus, &Value::from("foo"), &Value::from("bar")).unwrap();
        assert_eq!(result.to_string(), "foobar");

        let result = binary_op(&star, &Value::from("ab"), &Value::from(3)).unwrap();
        assert_eq!(result.to_string(), "ababab");

        let result = binary_op(
            &plus,
            &Value::from(vec![Value::from(1)]),
            &Value::from(vec![Value::from(2)]),
        )
        .unwrap();
        assert_eq!(result.to_string(), "[1, 2]");

        let result = binary_op(&star, &Value::from(vec![Value::from(0)]), &Value::from(3)).unwrap();
        assert_eq!(result.to_string(), "[0, 0, 0]");
    }

    #[test]
    fn test_errors() {
        let tests = [
            (Value::from(5), op(Type::Plus, "+"), Value::from(true), "type mismatch: INTEGER + BOOLEAN"),
            (Value::from("a"), op(Type::Minus, "-"), Value::from("b"), "unknown operator: STRING - STRING"),
            (Value::from(1), op(Type::Slash, "/"), Value::from(0), "division by zero"),
            (Value::from(1.5), op(Type::Slash, "/"), Value::from(0), "division by zero"),
            (Value::from(1), op(Type::Percent, "%"), Value::from(0), "modulo by zero"),
            (Value::from(i64::MAX), op(Type::Plus, "+"), Value::from(1), "integer overflow"),
            (Value::from(1), op(Type::Equal, "=="), Value::from("1"), "type mismatch: INTEGER == STRING"),
            (Value::from(1), op(Type::ShiftLeft, "<<"), Value::from(64), "invalid shift amount"),
        ];

        for (left, operator, right, expected) in tests {
            let err = binary_op(&operator, &left, &right).unwrap_err();
            assert_eq!(err.message, expected);
        }
    }

    #[test]
    fn test_equality() {
        let equal = op(Type::Equal, "==");
        let not_equal = op(Type::NotEqual, "!=");

        assert_eq!(binary_op(&equal, &Value::from(1), &Value::from(1.0)).unwrap(), Value::from(true));
        assert_eq!(binary_op(&equal, &Value::from(1), &Value::None).unwrap(), Value::from(false));
        assert_eq!(binary_op(&not_equal, &Value::None, &Value::None).unwrap(), Value::from(false));
        assert_eq!(
            binary_op(&equal, &Value::from("a"), &Value::from("a")).unwrap(),
            Value::from(true)
        );
    }

    #[test]
    fn test_membership() {
        let is_in = op(Type::In, "in");
        let not_in = op(Type::Not, "not in");
        let array = Value::from(vec![Value::from(1), Value::from("two")]);
        let hash = Value::hash(vec![(Value::from("key"), Value::from(1))]).unwrap();

        assert_eq!(binary_op(&is_in, &Value::from(1.0), &array).unwrap(), Value::from(true));
        assert_eq!(binary_op(&not_in, &Value::from("two"), &array).unwrap(), Value::from(false));
        assert_eq!(
            binary_op(&is_in, &Value::from("ell"), &Value::from("hello")).unwrap(),
            Value::from(true)
        );
        assert_eq!(binary_op(&is_in, &Value::from("key"), &hash).unwrap(), Value::from(true));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_op(&op(Type::Minus, "-"), &Value::from(3)).unwrap(), Value::from(-3));
        assert_eq!(unary_op(&op(Type::Not, "not"), &Value::from(0)).unwrap(), Value::from(false));
        assert_eq!(unary_op(&op(Type::Bang, "!"), &Value::None).unwrap(), Value::from(true));
        assert_eq!(unary_op(&op(Type::Tilde, "~"), &Value::from(0)).unwrap(), Value::from(-1));
        assert_eq!(
            unary_op(&op(Type::Minus, "-"), &Value::from("a")).unwrap_err().message,
            "unknown operator: -STRING"
        );
    }

    #[test]
    fn test_indexing() {
        let array = Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(index(&array, &Value::from(1)).unwrap(), Value::from(2));
        assert_eq!(index(&array, &Value::from(-1)).unwrap(), Value::from(3));
        assert_eq!(
            index(&array, &Value::from(3)).unwrap_err().message,
            "index out of bounds: index 3 for length 3"
        );
        assert_eq!(index(&Value::from("hello"), &Value::from(1)).unwrap(), Value::from("e"));

        let hash = Value::hash(vec![(Value::from("a"), Value::from(1))]).unwrap();
        assert_eq!(index(&hash, &Value::from("a")).unwrap(), Value::from(1));
        assert_eq!(index(&hash, &Value::from("b")).unwrap(), Value::None);
        assert_eq!(
            index(&hash, &Value::array(Vec::new())).unwrap_err().message,
            "unusable as hash key: ARRAY"
        );
    }

    #[test]
    fn test_slicing() {
        let array = Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let tests = [
            (Some(Value::from(1)), None, "[2, 3]"),
            (None, Some(Value::from(-1)), "[1, 2]"),
            (Some(Value::from(-10)), Some(Value::from(10)), "[1, 2, 3]"),
            (Some(Value::from(2)), Some(Value::from(1)), "[]"),
        ];

        for (start, end, expected) in tests {
            let result = slice(&array, start.as_ref(), end.as_ref()).unwrap();
            assert_eq!(result.to_string(), expected);
        }

        let result = slice(&Value::from("carrion"), Some(&Value::from(1)), Some(&Value::from(4)));
        assert_eq!(result.unwrap(), Value::from("arr"));
    }

    #[test]
    fn test_set_index() {
        let array = Value::from(vec![Value::from(1), Value::from(2)]);
        set_index(&array, &Value::from(-1), Value::from(5)).unwrap();
        assert_eq!(array.to_string(), "[1, 5]");

        let tuple = Value::tuple(vec![Value::from(1)]);
        assert_eq!(
            set_index(&tuple, &Value::from(0), Value::None).unwrap_err().message,
            "cannot assign to index of TUPLE"
        );
    }

    #[test]
    fn test_case_matching() {
        assert!(matches_case(&Value::from(1), &Value::from(1)));
        assert!(!matches_case(&Value::from(1), &Value::from(1.0)));
        assert!(matches_case(&Value::from("a"), &Value::from("a")));
        assert!(!matches_case(&Value::from(true), &Value::from(1)));
    }

    #[test]
    fn test_repetition_is_bounded() {
        let star = op(Type::Star, "*");
        let huge = Value::from(i64::MAX);
        let tests = [
            Value::from("ab"),
            Value::from(vec![Value::from(1), Value::from(2)]),
        ];

        for sequence in tests {
            let err = binary_op(&star, &sequence, &huge).unwrap_err();
            assert_eq!(err.message, "repetition too large");
        }

        assert_eq!(
            binary_op(&star, &Value::from(""), &huge).unwrap(),
            Value::from("")
        );
        assert_eq!(
            binary_op(&star, &Value::from("ab"), &Value::from(-3)).unwrap(),
            Value::from("")
        );
        assert_eq!(
            binary_op(&star, &Value::from("ab"), &Value::from(2)).unwrap(),
            Value::from("abab")
        );
    }
}
