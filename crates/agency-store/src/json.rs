//! # json
//!
//! why: the store compares and does arithmetic on json numbers that may come in as 2 or 2.0
//! relations: used by precondition.rs and operation.rs
//! what: json_eq, add_numbers

use serde_json::{Number, Value};

/// structural equality where numbers compare by value
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| json_eq(a, b)))
        }
        _ => a == b,
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    x.as_f64() == y.as_f64()
}

/// `base + step`, staying integral while both sides are and the sum fits
pub fn add_numbers(base: &Number, step: &Number) -> Value {
    if let (Some(a), Some(b)) = (base.as_i64(), step.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    let sum = base.as_f64().unwrap_or(0.0) + step.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map_or(Value::Null, Value::Number)
}

/// `-n`, for turning a decrement into an increment
pub fn negate(n: &Number) -> Number {
    if let Some(neg) = n.as_i64().and_then(i64::checked_neg) {
        return Number::from(neg);
    }
    Number::from_f64(-n.as_f64().unwrap_or(0.0)).unwrap_or_else(|| Number::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_and_float_numbers_are_equal() {
        assert!(json_eq(&json!(2), &json!(2.0)));
        assert!(json_eq(&json!([1, {"a": 2.0}]), &json!([1.0, {"a": 2}])));
        assert!(!json_eq(&json!(2), &json!(2.5)));
        assert!(!json_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn addition_stays_integral() {
        let one = Number::from(1);
        assert_eq!(add_numbers(&Number::from(41), &one), json!(42));
        assert_eq!(add_numbers(&Number::from(41), &negate(&one)), json!(40));

        let half = Number::from_f64(0.5).unwrap();
        assert_eq!(add_numbers(&Number::from(1), &half), json!(1.5));
    }

    #[test]
    fn overflow_falls_back_to_float() {
        let max = Number::from(i64::MAX);
        assert!(add_numbers(&max, &Number::from(1)).is_f64());
    }
}
