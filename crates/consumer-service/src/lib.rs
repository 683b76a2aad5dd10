//! 消费者服务模块
//!
//! 从RabbitMQ队列中读取订单消息并处理，手动确认，保证至少处理一次（at-least-once）。

pub mod ack;
pub mod broker;
pub mod consumer;
pub mod decoder;
pub mod errors;
pub mod handler;
pub mod processor;

use crate::consumer::{run_consumer, ConsumerStats};
use crate::errors::ConsumeError;
use crate::handler::{DeliveryHandler, OrderHandler};
use crate::processor::SimulatedProcessor;
use color_eyre::eyre::Context;
use color_eyre::Result;
use lapin::Connection;
use shared_lib::AppConfig;
use std::sync::Arc;
use tokio::sync::watch::Receiver;
use tracing::info;

/// 启动订单消费者
///
/// ## 参数说明
/// - `app_config`: 程序配置
/// - `shutdown_rx`: 用于接收关闭信号
///
/// ## 处理流程
///
/// 1. 连接RabbitMQ，创建channel
/// 2. 声明持久化队列（默认 `fila_pedidos`）
/// 3. 以手动确认模式订阅，逐条交给 [`OrderHandler`] 处理
/// 4. 收到关闭信号后取消订阅，关闭channel与连接，未确认的消息会被broker重新投递
///
/// 连接失败、消息流意外结束都是致命错误，不会自动重连。
pub async fn start_order_consumer(app_config: Arc<AppConfig>, shutdown_rx: Receiver<bool>) -> Result<()> {
    let rabbitmq = &app_config.rabbitmq;
    info!(
        "Starting order consumer with rabbitmq info {}:{}, queue {}...",
        rabbitmq.host, rabbitmq.port, rabbitmq.queue_name
    );

    let handler = OrderHandler::new(Arc::new(SimulatedProcessor::new(app_config.processing_delay)));

    let connection = broker::connect(rabbitmq).await?;
    let result = consume_on_connection(&connection, &app_config, &handler, shutdown_rx).await;
    broker::close_connection(&connection).await;

    let stats = result.context(format!("consume queue [{}]", rabbitmq.queue_name))?;

    info!("Order consumer stopped: {}", stats);

    Ok(())
}

async fn consume_on_connection<H>(
    connection: &Connection,
    app_config: &AppConfig,
    handler: &H,
    shutdown_rx: Receiver<bool>,
) -> std::result::Result<ConsumerStats, ConsumeError>
where
    H: DeliveryHandler,
{
    let rabbitmq = &app_config.rabbitmq;
    let channel = connection.create_channel().await.map_err(ConsumeError::Connection)?;

    let result = async {
        broker::declare_queue(&channel, &rabbitmq.queue_name).await?;
        let deliveries = broker::subscribe(&channel, &rabbitmq.queue_name, &rabbitmq.consumer_tag).await?;

        info!("Waiting for orders on queue {}...", rabbitmq.queue_name);

        run_consumer(
            &rabbitmq.queue_name,
            deliveries,
            handler,
            &channel,
            app_config.failure_policy,
            shutdown_rx,
        )
        .await
    }
    .await;

    broker::close_channel(&channel, &rabbitmq.consumer_tag).await;

    result
}
