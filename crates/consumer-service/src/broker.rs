//! RabbitMQ连接、队列声明与订阅

use crate::errors::ConsumeError;
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::options::{BasicCancelOptions, BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use shared_lib::{Delivery, RabbitMqConfig};
use tracing::{info, warn};

/// 正常关闭时使用的AMQP reply code
const REPLY_SUCCESS: u16 = 200;

/// 根据配置构建AMQP连接地址
///
/// 直接构建结构体而不是拼接字符串，用户名、密码、vhost中的特殊字符不需要转义。
pub fn amqp_uri(config: &RabbitMqConfig) -> AMQPUri {
    AMQPUri {
        scheme: AMQPScheme::AMQP,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config.vhost.clone(),
        query: AMQPQueryString::default(),
    }
}

/// 建立到RabbitMQ的连接，失败时直接返回错误，不做重试
pub async fn connect(config: &RabbitMqConfig) -> Result<Connection, ConsumeError> {
    let options = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);

    let connection = Connection::connect_uri(amqp_uri(config), options)
        .await
        .map_err(ConsumeError::Connection)?;

    info!("Connected to RabbitMQ {}:{}", config.host, config.port);

    Ok(connection)
}

/// 声明持久化、非独占、不自动删除的队列
///
/// 重复声明相同参数的队列不会有任何影响；如果已有同名队列但参数不同，broker会关闭channel并返回错误。
pub async fn declare_queue(channel: &Channel, queue_name: &str) -> Result<(), ConsumeError> {
    let queue = channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                passive: false,
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| ConsumeError::QueueDeclare {
            queue: queue_name.to_string(),
            source,
        })?;

    info!(
        "Queue {} declared, {} messages ready, {} consumers",
        queue_name,
        queue.message_count(),
        queue.consumer_count()
    );

    Ok(())
}

/// 以手动确认模式订阅队列
pub async fn subscribe(
    channel: &Channel,
    queue_name: &str,
    consumer_tag: &str,
) -> Result<BoxStream<'static, Result<Delivery, ConsumeError>>, ConsumeError> {
    let consumer = channel
        .basic_consume(
            queue_name,
            consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| ConsumeError::Subscribe {
            queue: queue_name.to_string(),
            source,
        })?;

    Ok(consumer
        .map(|item| item.map(into_delivery).map_err(ConsumeError::Stream))
        .boxed())
}

fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
    Delivery {
        payload: delivery.data,
        tag: delivery.delivery_tag,
        routing_key: delivery.routing_key.as_str().to_string(),
        redelivered: delivery.redelivered,
    }
}

/// 取消订阅并关闭channel
///
/// channel关闭后，所有未确认的消息都会被broker重新投递。关闭失败只记录日志。
pub async fn close_channel(channel: &Channel, consumer_tag: &str) {
    if channel.status().connected() {
        if let Err(err) = channel.basic_cancel(consumer_tag, BasicCancelOptions::default()).await {
            warn!("Cancel consumer {} failed: {}", consumer_tag, err);
        }

        if let Err(err) = channel.close(REPLY_SUCCESS, "consumer stopped").await {
            warn!("Close RabbitMQ channel failed: {}", err);
        }
    }
}

/// 关闭连接，失败只记录日志
pub async fn close_connection(connection: &Connection) {
    if connection.status().connected() {
        if let Err(err) = connection.close(REPLY_SUCCESS, "consumer stopped").await {
            warn!("Close RabbitMQ connection failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amqp_uri_from_config() {
        let config = RabbitMqConfig {
            host: "rabbit.internal".to_string(),
            port: 5673,
            username: "orders".to_string(),
            password: "p@ss/word".to_string(),
            vhost: "/".to_string(),
            queue_name: "fila_pedidos".to_string(),
            consumer_tag: "order_consumer".to_string(),
        };

        let uri = amqp_uri(&config);

        assert!(matches!(uri.scheme, AMQPScheme::AMQP));
        assert_eq!(uri.authority.host, "rabbit.internal");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "orders");
        assert_eq!(uri.authority.userinfo.password, "p@ss/word");
        assert_eq!(uri.vhost, "/");
    }
}
