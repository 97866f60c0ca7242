use serde_json::Value;
use std::cmp::Ordering;

/// Order two values the way the expression language compares them.
///
/// Returns `None` when an ordering is meaningless (null operands, NaN).
pub fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        (Value::Number(na), Value::Number(nb)) => match (na.as_i64(), nb.as_i64()) {
            (Some(ia), Some(ib)) => Some(ia.cmp(&ib)),
            _ => na.as_f64()?.partial_cmp(&nb.as_f64()?),
        },
        (Value::Bool(ba), Value::Bool(bb)) => Some(ba.cmp(bb)),
        (Value::Number(na), Value::String(sb)) => match sb.trim().parse::<f64>() {
            Ok(db) => na.as_f64()?.partial_cmp(&db),
            Err(_) => Some(a.to_string().cmp(sb)),
        },
        (Value::String(sa), Value::Number(nb)) => match sa.trim().parse::<f64>() {
            Ok(da) => da.partial_cmp(&nb.as_f64()?),
            Err(_) => Some(sa.as_str().cmp(b.to_string().as_str())),
        },
        _ => Some(a.to_string().cmp(&b.to_string())),
    }
}

/// Equality with the same coercions as [`cmp_values`]; null equals only null.
pub fn eq_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
            a == b
        }
        _ => cmp_values(a, b) == Some(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(cmp_values(&json!(1), &json!(1.5)), Some(Ordering::Less));
        assert_eq!(cmp_values(&json!(0.2), &json!(0.25)), Some(Ordering::Less));
        assert!(eq_values(&json!(2), &json!(2.0)));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert_eq!(cmp_values(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert!(eq_values(&json!(5), &json!("5")));
    }

    #[test]
    fn null_has_no_ordering() {
        assert_eq!(cmp_values(&Value::Null, &json!(1)), None);
        assert!(eq_values(&Value::Null, &Value::Null));
        assert!(!eq_values(&Value::Null, &json!(0)));
    }

    #[test]
    fn containers_use_structural_equality() {
        assert!(eq_values(&json!([1, 2]), &json!([1, 2])));
        assert!(!eq_values(&json!({"a": 1}), &json!("{\"a\":1}")));
    }
}
