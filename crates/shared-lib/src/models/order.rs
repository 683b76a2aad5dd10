use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// 订单ID
///
/// 上游系统可能发送字符串或整数，这里原样保留，不做任何解释。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(i64),
    Text(String),
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderId::Number(id) => write!(f, "{id}"),
            OrderId::Text(id) => f.write_str(id),
        }
    }
}

/// 队列中的订单消息
///
/// 字段名称与上游生产者保持一致（`Id`/`Cliente`/`ValorTotal`），缺少任意字段都会解码失败。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Order {
    #[serde(rename = "Id")]
    #[validate(custom(function = "validate_order_id"))]
    pub id: OrderId,

    /// 客户名称
    #[serde(rename = "Cliente")]
    #[validate(custom(function = "validate_customer"))]
    pub customer: String,

    /// 订单总金额，不能为负数
    #[serde(
        rename = "ValorTotal",
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "deserialize_amount"
    )]
    #[validate(custom(function = "validate_total_value"))]
    pub total_value: Decimal,
}

/// 金额只接受JSON数字，或者形如 `12.50` 的纯十进制字符串
///
/// `rust_decimal` 默认的反序列化还会接受 `1_000`、`1e3` 这样的写法，这里不允许。
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a plain decimal string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Decimal, E> {
        Ok(Decimal::from(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Decimal, E> {
        Ok(Decimal::from(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Decimal, E> {
        if !value.is_finite() {
            return Err(E::invalid_value(Unexpected::Float(value), &self));
        }
        Decimal::from_str(&value.to_string()).map_err(|_| E::invalid_value(Unexpected::Float(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Decimal, E> {
        if !is_plain_decimal(value) {
            return Err(E::invalid_value(Unexpected::Str(value), &self));
        }
        Decimal::from_str(value).map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
    }
}

fn is_plain_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    all_digits(integer) && fraction.map_or(true, all_digits)
}

fn validate_order_id(id: &OrderId) -> Result<(), ValidationError> {
    match id {
        OrderId::Text(text) if text.trim().is_empty() => Err(ValidationError::new("empty_id")),
        _ => Ok(()),
    }
}

fn validate_customer(customer: &str) -> Result<(), ValidationError> {
    if customer.trim().is_empty() {
        return Err(ValidationError::new("empty_customer"));
    }
    Ok(())
}

fn validate_total_value(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_total_value"));
    }
    Ok(())
}

/// 按巴西雷亚尔格式化金额，例如 `1234.5` -> `R$1.234,50`
pub fn format_brl(value: &Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let text = format!("{:.2}", rounded.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{}R${},{}", if negative { "-" } else { "" }, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(&dec("12.50")), "R$12,50");
        assert_eq!(format_brl(&dec("12.5")), "R$12,50");
        assert_eq!(format_brl(&dec("0")), "R$0,00");
        assert_eq!(format_brl(&dec("999.999")), "R$1.000,00");
        assert_eq!(format_brl(&dec("1234567.8")), "R$1.234.567,80");
        assert_eq!(format_brl(&dec("-3.1")), "-R$3,10");
        assert_eq!(format_brl(&dec("0.125")), "R$0,13");
        assert_eq!(format_brl(&dec("2.345")), "R$2,35");
        assert_eq!(format_brl(&dec("-0.125")), "-R$0,13");
    }

    #[test]
    fn test_plain_decimal() {
        for accepted in ["0", "12", "12.50", "-3.1", "0001.5"] {
            assert!(is_plain_decimal(accepted), "{accepted}");
        }
        for rejected in ["", "-", "1_000", "1e3", "12.", ".5", " 12", "12 ", "+1", "1,5", "NaN"] {
            assert!(!is_plain_decimal(rejected), "{rejected}");
        }
    }

    #[test]
    fn test_order_id_display() {
        assert_eq!(OrderId::Number(42).to_string(), "42");
        assert_eq!(OrderId::Text("A-1".to_string()).to_string(), "A-1");
    }

    #[test]
    fn test_validation() {
        let order = Order {
            id: OrderId::Text("1".to_string()),
            customer: "Ana".to_string(),
            total_value: dec("12.50"),
        };
        assert!(order.validate().is_ok());

        let negative = Order {
            total_value: dec("-0.01"),
            ..order.clone()
        };
        assert!(negative.validate().is_err());

        let blank_customer = Order {
            customer: "   ".to_string(),
            ..order.clone()
        };
        assert!(blank_customer.validate().is_err());

        let blank_id = Order {
            id: OrderId::Text(String::new()),
            ..order
        };
        assert!(blank_id.validate().is_err());
    }
}
