//! Monetary contribution of an event.

use serde_json::Value;

use crate::types::Properties;

/// Property names that may carry an amount, in priority order.
const AMOUNT_KEYS: [&str; 3] = ["amount", "price", "value"];

/// The positive amount an event contributes to revenue and lifetime value.
///
/// The first of `amount`, `price`, `value` that parses to a positive finite
/// number wins. Numeric strings count; anything else contributes nothing.
pub fn monetary_amount(properties: &Properties) -> Option<f64> {
    AMOUNT_KEYS
        .iter()
        .filter_map(|key| properties.get(*key))
        .filter_map(parse_amount)
        .find(|amount| *amount > 0.0)
}

fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("test properties must be an object"),
        }
    }

    #[test]
    fn amount_takes_priority_over_price() {
        let p = props(json!({"amount": 42.5, "price": 99}));
        assert_eq!(monetary_amount(&p), Some(42.5));
    }

    #[test]
    fn numeric_string_counts() {
        let p = props(json!({"price": "19.99"}));
        assert_eq!(monetary_amount(&p), Some(19.99));
    }

    #[test]
    fn zero_amount_falls_through_to_price() {
        let p = props(json!({"amount": 0, "price": 10}));
        assert_eq!(monetary_amount(&p), Some(10.0));
    }

    #[test]
    fn non_numeric_and_negative_contribute_nothing() {
        assert_eq!(monetary_amount(&props(json!({"amount": "free"}))), None);
        assert_eq!(monetary_amount(&props(json!({"amount": -5}))), None);
        assert_eq!(monetary_amount(&props(json!({"value": true}))), None);
        assert_eq!(monetary_amount(&props(json!({"amount": "NaN"}))), None);
        assert_eq!(monetary_amount(&Properties::new()), None);
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let p = props(json!({"total": 50, "cost": 20}));
        assert_eq!(monetary_amount(&p), None);
    }
}
