//! 需要本地RabbitMQ（guest/guest@localhost:5672）的端到端测试
//!
//! 运行方式: `cargo test -p consumer-service -- --ignored`

use async_trait::async_trait;
use consumer_service::broker;
use consumer_service::consumer::{run_consumer, ConsumerStats};
use consumer_service::errors::ProcessingError;
use consumer_service::handler::OrderHandler;
use consumer_service::processor::Processor;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions, QueueDeleteOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use shared_lib::{AppConfig, FailurePolicy, Order, RabbitMqConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

struct CountingProcessor {
    calls: AtomicUsize,
}

#[async_trait]
impl Processor for CountingProcessor {
    async fn process(&self, _order: &Order) -> Result<(), ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_config() -> RabbitMqConfig {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut config = AppConfig::from_lookup(|key| std::env::var(key).ok()).unwrap().rabbitmq;
    config.queue_name = format!("fila_pedidos_test_{nanos}");
    config.consumer_tag = format!("order_consumer_test_{nanos}");
    config
}

async fn publish(channel: &Channel, queue_name: &str, payload: &[u8]) {
    channel
        .basic_publish("", queue_name, BasicPublishOptions::default(), payload, BasicProperties::default())
        .await
        .unwrap()
        .await
        .unwrap();
}

async fn ready_messages(channel: &Channel, queue_name: &str) -> u32 {
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap()
        .message_count()
}

/// 发布消息，运行消费者直到队列清空，然后关闭消费者并返回统计
async fn consume_published(payloads: &[&[u8]], processor: Arc<CountingProcessor>) -> (ConsumerStats, u32) {
    let config = test_config();
    let connection = broker::connect(&config).await.unwrap();

    let admin = connection.create_channel().await.unwrap();
    broker::declare_queue(&admin, &config.queue_name).await.unwrap();
    for payload in payloads {
        publish(&admin, &config.queue_name, payload).await;
    }

    let channel = connection.create_channel().await.unwrap();
    let deliveries = broker::subscribe(&channel, &config.queue_name, &config.consumer_tag).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queue_name = config.queue_name.clone();
    let consumer_channel = channel.clone();
    let consumer = tokio::spawn(async move {
        let handler = OrderHandler::new(processor);
        run_consumer(
            &queue_name,
            deliveries,
            &handler,
            &consumer_channel,
            FailurePolicy::Hardened,
            shutdown_rx,
        )
        .await
    });

    for _ in 0..50 {
        if ready_messages(&admin, &config.queue_name).await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // 等待最后一条消息处理完成并确认
    tokio::time::sleep(Duration::from_millis(500)).await;

    shutdown_tx.send(true).unwrap();
    let stats = consumer.await.unwrap().unwrap();
    broker::close_channel(&channel, &config.consumer_tag).await;

    // channel关闭后未确认的消息会回到队列，这里必须为0
    tokio::time::sleep(Duration::from_millis(200)).await;
    let remaining = ready_messages(&admin, &config.queue_name).await;

    admin
        .queue_delete(&config.queue_name, QueueDeleteOptions::default())
        .await
        .unwrap();
    admin.close(200, "test finished").await.unwrap();
    broker::close_connection(&connection).await;

    (stats, remaining)
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_valid_order_is_processed_and_acked() {
    let processor = Arc::new(CountingProcessor {
        calls: AtomicUsize::new(0),
    });

    let (stats, remaining) = consume_published(&[&br#"{"Id":"1","Cliente":"Ana","ValorTotal":12.50}"#[..]], Arc::clone(&processor)).await;

    assert_eq!(stats.acked, 1);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(remaining, 0);
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_malformed_order_is_dropped() {
    let processor = Arc::new(CountingProcessor {
        calls: AtomicUsize::new(0),
    });

    let (stats, remaining) = consume_published(&[&br#"{"Cliente":"Ana"}"#[..]], Arc::clone(&processor)).await;

    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.acked, 0);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(remaining, 0);
}
