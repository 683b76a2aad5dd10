use crate::decoder::decode;
use crate::errors::HandlerError;
use crate::processor::Processor;
use async_trait::async_trait;
use shared_lib::{format_brl, Delivery, Order};
use std::sync::Arc;
use tracing::info;

/// 队列消息处理器特征
///
/// 消费循环每收到一条消息就调用一次 [`DeliveryHandler::handle`]，
/// 根据返回结果决定 ack/nack，处理器本身不接触broker。
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

/// 收到订单时输出的日志内容
pub fn order_received_message(order: &Order) -> String {
    format!(
        "Pedido recebido: ID={}, Cliente={}, Valor={}",
        order.id,
        order.customer,
        format_brl(&order.total_value)
    )
}

/// 订单消息处理器：先解码，再交给 [`Processor`]
///
/// 解码失败的消息不会进入处理器。
pub struct OrderHandler<P: Processor> {
    processor: Arc<P>,
}

impl<P: Processor> OrderHandler<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl<P: Processor> DeliveryHandler for OrderHandler<P> {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let order = decode(&delivery.payload)?;

        info!("{}", order_received_message(&order));

        self.processor.process(&order).await?;

        Ok(())
    }
}
