//! Arithmetic, bitwise and comparison semantics (§4.5 "Arithmetic semantics").

use std::cmp::Ordering;

use crate::error::{Exception, RuntimeErrorKind};
use crate::value::Value;

fn type_of(v: &Value) -> &'static str {
    v.type_name()
}

/// `ADD`/`SUB`/`MUL`/`DIV`/`MOD`: integer+integer stays integer (wide i64
/// math); any float operand promotes both sides to float. `ADD` additionally
/// recognizes string concatenation when either side is a string, by
/// stringifying the other side the way the reference's `ADD` opcode does at
/// runtime (the compiler's "constant operand is a string literal" check in
/// §4.3.4 is just an emission-time hint, not a narrower runtime contract).
pub fn add(a: &Value, b: &Value) -> Result<Value, Exception> {
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        let mut s = String::new();
        push_display(&mut s, a);
        push_display(&mut s, b);
        return Ok(Value::str(s));
    }
    numeric_binop(a, b, i64::checked_add, |x, y| x + y)
}

fn push_display(buf: &mut String, v: &Value) {
    match v {
        Value::Str(s) => buf.push_str(s),
        Value::Int(i) => buf.push_str(&i.to_string()),
        Value::Float(f) => buf.push_str(&f.to_string()),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Void => buf.push_str("void"),
        other => buf.push_str(other.type_name()),
    }
}

pub fn sub(a: &Value, b: &Value) -> Result<Value, Exception> {
    numeric_binop(a, b, i64::checked_sub, |x, y| x - y)
}

pub fn mul(a: &Value, b: &Value) -> Result<Value, Exception> {
    numeric_binop(a, b, i64::checked_mul, |x, y| x * y)
}

pub fn div(a: &Value, b: &Value) -> Result<Value, Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(Exception::from(RuntimeErrorKind::DivisionByZero));
            }
            if *x == i64::MIN && *y == -1 {
                return Err(Exception::from(RuntimeErrorKind::DivisionOverflow));
            }
            Ok(Value::Int(x / y))
        }
        _ => numeric_binop(a, b, |_, _| None, |x, y| x / y),
    }
}

pub fn modulo(a: &Value, b: &Value) -> Result<Value, Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(Exception::from(RuntimeErrorKind::DivisionByZero));
            }
            if *x == i64::MIN && *y == -1 {
                return Err(Exception::from(RuntimeErrorKind::DivisionOverflow));
            }
            Ok(Value::Int(x % y))
        }
        _ => numeric_binop(a, b, |_, _| None, |x, y| x % y),
    }
}

fn numeric_binop(
    a: &Value,
    b: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match int_op(*x, *y) {
            Some(r) => Ok(Value::Int(r)),
            None => Err(Exception::from(RuntimeErrorKind::DivisionOverflow)),
        },
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(float_op(as_f64(a), as_f64(b))))
        }
        _ => Err(Exception::from(RuntimeErrorKind::UnsupportedOperandTypes(type_of(a), type_of(b)))),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => unreachable!("caller already matched Int|Float"),
    }
}

fn as_i64_pair(a: &Value, b: &Value) -> Result<(i64, i64), Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok((*x, *y)),
        _ => Err(Exception::from(RuntimeErrorKind::UnsupportedOperandTypes(type_of(a), type_of(b)))),
    }
}

pub fn bit_and(a: &Value, b: &Value) -> Result<Value, Exception> {
    as_i64_pair(a, b).map(|(x, y)| Value::Int(x & y))
}
pub fn bit_or(a: &Value, b: &Value) -> Result<Value, Exception> {
    as_i64_pair(a, b).map(|(x, y)| Value::Int(x | y))
}
pub fn bit_xor(a: &Value, b: &Value) -> Result<Value, Exception> {
    as_i64_pair(a, b).map(|(x, y)| Value::Int(x ^ y))
}

/// Shift count magnitude >= 64 collapses to 0 or -1 per the operand sign
/// rule rather than relying on Rust's panicking shift (§4.5).
pub fn shl(a: &Value, b: &Value) -> Result<Value, Exception> {
    let (x, y) = as_i64_pair(a, b)?;
    Ok(Value::Int(if y.unsigned_abs() >= 64 { 0 } else if y >= 0 { x.wrapping_shl(y as u32) } else { x.wrapping_shr((-y) as u32) }))
}

pub fn shr(a: &Value, b: &Value) -> Result<Value, Exception> {
    let (x, y) = as_i64_pair(a, b)?;
    Ok(Value::Int(if y.unsigned_abs() >= 64 {
        if x < 0 {
            -1
        } else {
            0
        }
    } else if y >= 0 {
        x.wrapping_shr(y as u32)
    } else {
        x.wrapping_shl((-y) as u32)
    }))
}

/// Logical (unsigned) right shift: always fills with zero, regardless of sign.
pub fn shru(a: &Value, b: &Value) -> Result<Value, Exception> {
    let (x, y) = as_i64_pair(a, b)?;
    Ok(Value::Int(if y.unsigned_abs() >= 64 { 0 } else { ((x as u64).wrapping_shr(y as u32)) as i64 }))
}

pub fn bitwise_not(a: &Value) -> Result<Value, Exception> {
    match a {
        Value::Int(x) => Ok(Value::Int(!x)),
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => Err(Exception::from(RuntimeErrorKind::UnsupportedOperandTypes(type_of(a), type_of(a)))),
    }
}

/// Total order across every value kind (§4.5, §9 open question): numbers
/// compare numerically with NaN sorting greater than every other value
/// (including itself being unequal but ordered last, so NaN == NaN is false
/// but NaN is never "less than" anything) — a fixed, documented convention
/// since the source spec left the exact rule open.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (as_f64(a), as_f64(b));
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            }
        }
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Void, Value::Void) => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Cross-type fallback ordering, keyed by the `TYPE` tag position.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Int(_) => 0,
        Value::Float(_) => 1,
        Value::Str(_) => 2,
        Value::Bool(_) => 3,
        Value::Void => 4,
        Value::Object(_) => 5,
        Value::Array(_) => 6,
        Value::Buffer(_) => 7,
        Value::Function(_) => 8,
        Value::Iterator(_) => 9,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Buffer(x), Value::Buffer(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Iterator(x), Value::Iterator(y)) => std::rc::Rc::ptr_eq(x, y),
        _ => compare(a, b) == Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_concatenates_whenever_either_side_is_a_string_at_runtime() {
        let r = add(&Value::Int(7), &Value::str("x = ")).unwrap();
        assert!(matches!(r, Value::Str(s) if &*s == "7x = "));
        let r = add(&Value::str("n="), &Value::Int(3)).unwrap();
        assert!(matches!(r, Value::Str(s) if &*s == "n=3"));
    }

    #[test]
    fn add_promotes_to_float_when_either_operand_is_float() {
        let r = add(&Value::Int(2), &Value::Float(0.5)).unwrap();
        assert!(matches!(r, Value::Float(f) if f == 2.5));
    }

    #[test]
    fn integer_add_overflow_raises_division_overflow() {
        let err = add(&Value::Int(i64::MAX), &Value::Int(1)).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("overflow")));
    }

    #[test]
    fn int_div_by_zero_and_min_by_neg_one() {
        assert!(div(&Value::Int(1), &Value::Int(0)).is_err());
        assert!(div(&Value::Int(i64::MIN), &Value::Int(-1)).is_err());
        assert!(matches!(div(&Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3)));
    }

    #[test]
    fn shift_magnitude_above_63_collapses_per_sign() {
        assert!(matches!(shl(&Value::Int(1), &Value::Int(64)).unwrap(), Value::Int(0)));
        assert!(matches!(shr(&Value::Int(-1), &Value::Int(100)).unwrap(), Value::Int(-1)));
        assert!(matches!(shr(&Value::Int(5), &Value::Int(100)).unwrap(), Value::Int(0)));
        assert!(matches!(shru(&Value::Int(-1), &Value::Int(200)).unwrap(), Value::Int(0)));
    }

    #[test]
    fn nan_sorts_greater_but_is_unequal_to_itself() {
        let nan = Value::Float(f64::NAN);
        let one = Value::Float(1.0);
        assert_eq!(compare(&nan, &one), Ordering::Greater);
        assert_eq!(compare(&nan, &nan), Ordering::Equal);
        assert!(!values_equal(&nan, &nan));
    }

    #[test]
    fn cross_type_comparison_falls_back_to_type_rank() {
        assert_eq!(compare(&Value::Int(0), &Value::str("")), Ordering::Less);
        assert_eq!(compare(&Value::Bool(true), &Value::Int(1)), Ordering::Greater);
    }

    #[test]
    fn heap_values_are_equal_only_by_reference_identity() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(1)]);
        assert!(!values_equal(&a, &b));
        let a2 = a.clone();
        assert!(values_equal(&a, &a2));
    }
}
