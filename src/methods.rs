use crate::error::{RunResult, RuntimeError};
use crate::intern;
use crate::value::Value;
use std::rc::Rc;

// Selectors an object forwards to its internal primitive when it cannot
// answer them itself.
const DELEGATABLE_SELECTORS: [&str; 16] = [
    "equalTo:",
    "greaterThan:",
    "plus:",
    "minus:",
    "multiplyBy:",
    "divBy:",
    "asString",
    "asInteger",
    "timesRepeat:",
    "concatenateWith:",
    "startsWith:endsBefore:",
    "isNumber",
    "isString",
    "isBlock",
    "isNil",
    "print",
];

pub fn is_delegatable(selector: &str) -> bool
{
    DELEGATABLE_SELECTORS.contains(&selector)
}

/// Matches the block-invocation selectors: `value` for a parameterless
/// block, and for arity n either the keyword form `value:value:…` or the
/// colon-suffixed form `value::…`; the colon count must equal the arity.
pub fn is_value_selector(selector: &str, arity: usize) -> bool
{
    if intern::selector_arity(selector) != arity
    {
        return false;
    }
    if arity == 0
    {
        return selector == "value";
    }
    selector == "value:".repeat(arity)
        || (selector.starts_with("value")
            && selector["value".len()..].bytes().all(|b| b == b':'))
}

/// Zero-argument built-in selectors per value kind. An attribute of the same
/// name would make the getter ambiguous, so setters must refuse these.
pub fn is_known_zero_arg(value: &Value, name: &str) -> bool
{
    if matches!(name, "asString" | "isNil" | "isNumber" | "isString" | "isBlock")
    {
        return true;
    }
    match value
    {
        Value::Integer(_) => name == "asInteger",
        Value::Str(_) => matches!(name, "asInteger" | "print"),
        Value::Block(_) => name == "value",
        Value::True | Value::False => name == "not",
        _ => false,
    }
}

/// Kind-specific string form: the constants print their keyword, integers
/// their decimal form, strings themselves; blocks and objects have none.
pub fn as_string(value: &Value) -> Rc<str>
{
    match value
    {
        Value::Nil => intern::name("nil"),
        Value::True => intern::name("true"),
        Value::False => intern::name("false"),
        Value::Integer(n) => intern::name_owned(n.to_string()),
        Value::Str(s) => s.clone(),
        Value::Block(_) | Value::Object(_) => intern::name(""),
    }
}

/// The built-in method table: kind-specific methods first, then the base
/// methods every value answers. `None` means the selector is not built in
/// and the dispatcher should keep looking.
pub fn builtin(value: &Value, selector: &str, args: &[Value]) -> Option<RunResult<Value>>
{
    let kind_specific = match value
    {
        Value::Integer(n) => integer_builtin(*n, selector, args),
        Value::Str(s) => string_builtin(s, selector, args),
        Value::True => boolean_builtin(true, selector),
        Value::False => boolean_builtin(false, selector),
        _ => None,
    };
    if kind_specific.is_some()
    {
        return kind_specific;
    }
    base_builtin(value, selector, args)
}

fn int_operand(args: &[Value], selector: &str) -> RunResult<i64>
{
    match args.first()
    {
        Some(Value::Integer(n)) => Ok(*n),
        _ => Err(RuntimeError::value_error(format!(
            "{selector} expects an Integer operand"
        ))),
    }
}

fn integer_builtin(n: i64, selector: &str, args: &[Value]) -> Option<RunResult<Value>>
{
    let result = match selector
    {
        "equalTo:" => Ok(Value::boolean(
            matches!(args.first(), Some(Value::Integer(m)) if *m == n),
        )),
        "greaterThan:" => int_operand(args, selector).map(|m| Value::boolean(n > m)),
        "plus:" => int_operand(args, selector).map(|m| Value::Integer(n.wrapping_add(m))),
        "minus:" => int_operand(args, selector).map(|m| Value::Integer(n.wrapping_sub(m))),
        "multiplyBy:" => int_operand(args, selector).map(|m| Value::Integer(n.wrapping_mul(m))),
        "divBy:" => int_operand(args, selector).and_then(|m| {
            if m == 0
            {
                return Err(RuntimeError::value_error("divBy: division by zero"));
            }
            n.checked_div(m)
                .map(Value::Integer)
                .ok_or_else(|| RuntimeError::value_error("divBy: integer overflow"))
        }),
        "asString" => Ok(Value::Str(intern::name_owned(n.to_string()))),
        "asInteger" => Ok(Value::Integer(n)),
        "isNumber" => Ok(Value::True),
        _ => return None,
    };
    Some(result)
}

// An argument that behaves as a string: either a String or an object
// wrapping one.
fn string_payload(value: &Value) -> Option<Rc<str>>
{
    match value
    {
        Value::Str(s) => Some(s.clone()),
        Value::Object(obj) => match obj.internal.borrow().as_ref()
        {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn string_builtin(text: &Rc<str>, selector: &str, args: &[Value]) -> Option<RunResult<Value>>
{
    let result = match selector
    {
        "equalTo:" =>
        {
            let equal = args
                .first()
                .and_then(string_payload)
                .is_some_and(|other| other == *text);
            Ok(Value::boolean(equal))
        }
        "asString" => Ok(Value::Str(text.clone())),
        "asInteger" => match text.parse::<i64>()
        {
            Ok(n) => Ok(Value::Integer(n)),
            Err(_) => Ok(Value::Nil),
        },
        "concatenateWith:" => match args.first()
        {
            Some(Value::Str(other)) =>
            {
                let mut joined = String::with_capacity(text.len() + other.len());
                joined.push_str(text);
                joined.push_str(other);
                Ok(Value::Str(intern::name_owned(joined)))
            }
            _ => Ok(Value::Nil),
        },
        "startsWith:endsBefore:" => Ok(substring(text, args)),
        "isString" => Ok(Value::True),
        _ => return None,
    };
    Some(result)
}

// 1-based, code-point addressed, end-exclusive. Non-positive or non-Integer
// bounds answer Nil; an empty range answers the empty string.
fn substring(text: &str, args: &[Value]) -> Value
{
    let (start, end) = match (args.first(), args.get(1))
    {
        (Some(Value::Integer(s)), Some(Value::Integer(e))) if *s > 0 && *e > 0 => (*s, *e),
        _ => return Value::Nil,
    };
    if end <= start
    {
        return Value::Str(intern::name(""));
    }
    let skip = (start - 1) as usize;
    let take = (end - start) as usize;
    let slice: String = text.chars().skip(skip).take(take).collect();
    Value::Str(intern::name_owned(slice))
}

fn boolean_builtin(truth: bool, selector: &str) -> Option<RunResult<Value>>
{
    match selector
    {
        "not" => Some(Ok(Value::boolean(!truth))),
        _ => None,
    }
}

fn base_builtin(value: &Value, selector: &str, args: &[Value]) -> Option<RunResult<Value>>
{
    let result = match selector
    {
        "identicalTo:" | "equalTo:" => Ok(Value::boolean(
            args.first().is_some_and(|other| value.is_identical(other)),
        )),
        "asString" => Ok(Value::Str(as_string(value))),
        "isNil" => Ok(Value::boolean(matches!(value, Value::Nil))),
        "isNumber" => Ok(Value::boolean(matches!(value, Value::Integer(_)))),
        "isString" => Ok(Value::boolean(matches!(value, Value::Str(_)))),
        "isBlock" => Ok(Value::boolean(matches!(value, Value::Block(_)))),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn expect(value: Option<RunResult<Value>>) -> Value
    {
        value.expect("selector should be built in").expect("should succeed")
    }

    #[test]
    fn integer_arithmetic()
    {
        let n = Value::Integer(7);
        assert!(matches!(expect(builtin(&n, "plus:", &[Value::Integer(3)])), Value::Integer(10)));
        assert!(matches!(expect(builtin(&n, "minus:", &[Value::Integer(9)])), Value::Integer(-2)));
        assert!(matches!(
            expect(builtin(&n, "multiplyBy:", &[Value::Integer(-2)])),
            Value::Integer(-14)
        ));
        assert!(matches!(expect(builtin(&n, "divBy:", &[Value::Integer(2)])), Value::Integer(3)));
    }

    #[test]
    fn integer_division_guards()
    {
        let err = builtin(&Value::Integer(1), "divBy:", &[Value::Integer(0)])
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), 53);

        let err = builtin(&Value::Integer(i64::MIN), "divBy:", &[Value::Integer(-1)])
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), 53);
    }

    #[test]
    fn integer_operand_must_be_integer()
    {
        let err = builtin(&Value::Integer(1), "plus:", &[Value::Nil]).unwrap().unwrap_err();
        assert_eq!(err.code(), 53);
    }

    #[test]
    fn integer_equality_is_strict()
    {
        assert!(expect(builtin(&Value::Integer(4), "equalTo:", &[Value::Integer(4)])).is_true());
        assert!(!expect(builtin(&Value::Integer(4), "equalTo:", &[Value::Integer(5)])).is_true());
        assert!(
            !expect(builtin(&Value::Integer(4), "equalTo:", &[Value::Str(intern::name("4"))]))
                .is_true()
        );
    }

    #[test]
    fn string_as_integer_round_trip()
    {
        let s = Value::Str(intern::name("-42"));
        assert!(matches!(expect(builtin(&s, "asInteger", &[])), Value::Integer(-42)));

        let junk = Value::Str(intern::name("abc"));
        assert!(matches!(expect(builtin(&junk, "asInteger", &[])), Value::Nil));
    }

    #[test]
    fn string_concatenation()
    {
        let s = Value::Str(intern::name("foo"));
        let joined = expect(builtin(&s, "concatenateWith:", &[Value::Str(intern::name("bar"))]));
        assert!(matches!(joined, Value::Str(ref t) if **t == *"foobar"));

        let not_a_string = expect(builtin(&s, "concatenateWith:", &[Value::Integer(1)]));
        assert!(matches!(not_a_string, Value::Nil));
    }

    #[test]
    fn substring_is_code_point_addressed()
    {
        let s = Value::Str(intern::name("čermák"));
        let args = [Value::Integer(2), Value::Integer(5)];
        let out = expect(builtin(&s, "startsWith:endsBefore:", &args));
        assert!(matches!(out, Value::Str(ref t) if **t == *"erm"));
    }

    #[test]
    fn substring_edge_cases()
    {
        let s = Value::Str(intern::name("abc"));
        // Empty range.
        let out = expect(builtin(&s, "startsWith:endsBefore:", &[Value::Integer(2), Value::Integer(2)]));
        assert!(matches!(out, Value::Str(ref t) if t.is_empty()));
        // Non-positive bound.
        let out = expect(builtin(&s, "startsWith:endsBefore:", &[Value::Integer(0), Value::Integer(2)]));
        assert!(matches!(out, Value::Nil));
        // Non-integer bound.
        let out = expect(builtin(&s, "startsWith:endsBefore:", &[Value::Nil, Value::Integer(2)]));
        assert!(matches!(out, Value::Nil));
        // Range reaching past the end is clipped.
        let out = expect(builtin(&s, "startsWith:endsBefore:", &[Value::Integer(3), Value::Integer(9)]));
        assert!(matches!(out, Value::Str(ref t) if **t == *"c"));
    }

    #[test]
    fn constants_answer_their_names()
    {
        assert_eq!(&*as_string(&Value::Nil), "nil");
        assert_eq!(&*as_string(&Value::True), "true");
        assert_eq!(&*as_string(&Value::False), "false");
        assert_eq!(&*as_string(&Value::Integer(-3)), "-3");
    }

    #[test]
    fn not_flips_booleans()
    {
        assert!(!expect(builtin(&Value::True, "not", &[])).is_true());
        assert!(expect(builtin(&Value::False, "not", &[])).is_true());
    }

    #[test]
    fn kind_predicates()
    {
        assert!(expect(builtin(&Value::Nil, "isNil", &[])).is_true());
        assert!(!expect(builtin(&Value::Integer(1), "isNil", &[])).is_true());
        assert!(expect(builtin(&Value::Integer(1), "isNumber", &[])).is_true());
        assert!(expect(builtin(&Value::Str(intern::name("")), "isString", &[])).is_true());
    }

    #[test]
    fn value_selector_forms()
    {
        assert!(is_value_selector("value", 0));
        assert!(is_value_selector("value:", 1));
        assert!(is_value_selector("value:value:", 2));
        assert!(is_value_selector("value::", 2));
        assert!(!is_value_selector("value", 1));
        assert!(!is_value_selector("value:", 0));
        assert!(!is_value_selector("valueOf:", 1));
    }
}
