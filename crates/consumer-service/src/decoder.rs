//! 订单消息解码
//!
//! 纯函数，无IO。解码失败时返回 [`DecodeError`]，由消费循环决定消息的去向。

use crate::errors::DecodeError;
use shared_lib::Order;
use validator::Validate;

/// 将消息内容解码为 [`Order`]
///
/// 以下情况会失败：
/// - 内容不是合法的UTF-8
/// - 不是JSON对象，或者缺少 `Id`/`Cliente`/`ValorTotal`
/// - `ValorTotal` 不是数字或者为负数
/// - `Cliente` 为空
pub fn decode(payload: &[u8]) -> Result<Order, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let order = serde_json::from_str::<Order>(text)?;
    order.validate()?;
    Ok(order)
}

/// 按照线上消息格式重新编码订单
pub fn encode(order: &Order) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(order)
}
