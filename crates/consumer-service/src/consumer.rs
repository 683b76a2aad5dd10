//! 消费循环
//!
//! 将 解码 → 处理 → 确认 串起来：
//! - 消息按broker投递的顺序逐条处理，上一条处理完（确认或者保持pending）才会拉取下一条
//! - 只有消费循环决定消息的去向（ack / nack+requeue / nack+drop / pending）
//! - 处理器panic会在这里被捕获，不会导致整个消费者退出
//! - 收到关闭信号后不再拉取新消息，正在处理的消息会先处理完

use crate::ack::{Acknowledger, Disposition, SettleLedger};
use crate::errors::{ConsumeError, HandlerError, ProcessingError};
use crate::handler::DeliveryHandler;
use futures::{FutureExt, Stream, StreamExt};
use shared_lib::{Delivery, DeliveryTag, FailurePolicy};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::sync::watch::Receiver;
use tracing::{debug, error, info, warn};

/// 消费统计，消费循环结束时返回
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    pub rejected: u64,
    pub pending: u64,
    pub settle_failures: u64,
}

impl fmt::Display for ConsumerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} received, {} acked, {} requeued, {} rejected, {} left pending, {} settle failures",
            self.received, self.acked, self.requeued, self.rejected, self.pending, self.settle_failures
        )
    }
}

/// 根据处理结果和失败策略决定消息的去向
///
/// | 结果 | Hardened | Baseline |
/// |------|----------|----------|
/// | 成功 | ack | ack |
/// | 解码失败 | nack(requeue=false) | nack(requeue=false) |
/// | 临时错误 | nack(requeue=true) | pending |
/// | 永久错误 | nack(requeue=false) | pending |
pub fn disposition_for(outcome: &Result<(), HandlerError>, policy: FailurePolicy) -> Disposition {
    match (outcome, policy) {
        (Ok(()), _) => Disposition::Ack,
        (Err(HandlerError::Decode(_)), _) => Disposition::Reject,
        (Err(HandlerError::Processing(_)), FailurePolicy::Baseline) => Disposition::Pending,
        (Err(HandlerError::Processing(ProcessingError::Transient(_))), FailurePolicy::Hardened) => Disposition::Requeue,
        (Err(HandlerError::Processing(ProcessingError::Permanent(_))), FailurePolicy::Hardened) => Disposition::Reject,
    }
}

/// 运行消费循环，直到收到关闭信号或者出现致命错误
///
/// 只有收到关闭信号才会返回 `Ok`；消息流意外结束返回 [`ConsumeError::StreamEnded`]。
///
/// ## 参数说明
/// - `queue_name`: 队列名称，仅用于日志
/// - `deliveries`: 从broker订阅得到的消息流
/// - `handler`: 消息处理器
/// - `acker`: 与消息流属于同一个channel的确认通道
/// - `failure_policy`: 处理失败时的策略
/// - `shutdown_rx`: 用于接收关闭信号
pub async fn run_consumer<S, H, A>(
    queue_name: &str,
    mut deliveries: S,
    handler: &H,
    acker: &A,
    failure_policy: FailurePolicy,
    mut shutdown_rx: Receiver<bool>,
) -> Result<ConsumerStats, ConsumeError>
where
    S: Stream<Item = Result<Delivery, ConsumeError>> + Unpin,
    H: DeliveryHandler + ?Sized,
    A: Acknowledger + ?Sized,
{
    debug!("Order consumer on queue {} started", queue_name);

    let mut ledger = SettleLedger::default();
    let mut stats = ConsumerStats::default();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            next = deliveries.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        stats.received += 1;
                        consume_delivery(delivery, handler, acker, failure_policy, &mut ledger, &mut stats).await;
                    }
                    Some(Err(err)) => {
                        error!("Order consumer on queue {} stopped: {}", queue_name, err);
                        return Err(err);
                    }
                    None => {
                        error!("Delivery stream of queue {} ended without a shutdown signal: {}", queue_name, stats);
                        return Err(ConsumeError::StreamEnded {
                            queue: queue_name.to_string(),
                        });
                    }
                }
            }
        }
    }

    info!("Order consumer on queue {} ended: {}", queue_name, stats);

    Ok(stats)
}

async fn consume_delivery<H, A>(
    delivery: Delivery,
    handler: &H,
    acker: &A,
    failure_policy: FailurePolicy,
    ledger: &mut SettleLedger,
    stats: &mut ConsumerStats,
) where
    H: DeliveryHandler + ?Sized,
    A: Acknowledger + ?Sized,
{
    let outcome = AssertUnwindSafe(handler.handle(&delivery))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ProcessingError::Permanent(format!("handler panicked: {}", panic_message(&*panic))).into()));

    let disposition = disposition_for(&outcome, failure_policy);

    if let Err(err) = &outcome {
        // 解码错误的详细信息可能包含消息内容，只在debug级别输出
        match err {
            HandlerError::Decode(decode_err) => {
                warn!(
                    "Delivery {} (routing key {}, redelivered {}) failed: {} ({}), disposition {:?}",
                    delivery.tag,
                    delivery.routing_key,
                    delivery.redelivered,
                    err.kind(),
                    decode_err.reason(),
                    disposition
                );
                debug!("Delivery {} decode error: {}", delivery.tag, decode_err);
            }
            HandlerError::Processing(processing_err) => {
                warn!(
                    "Delivery {} (routing key {}, redelivered {}) failed: {} ({}), disposition {:?}",
                    delivery.tag,
                    delivery.routing_key,
                    delivery.redelivered,
                    err.kind(),
                    processing_err,
                    disposition
                );
            }
        }
    }

    settle(delivery.tag, disposition, acker, ledger, stats).await;
}

async fn settle<A>(tag: DeliveryTag, disposition: Disposition, acker: &A, ledger: &mut SettleLedger, stats: &mut ConsumerStats)
where
    A: Acknowledger + ?Sized,
{
    if disposition != Disposition::Pending && !ledger.try_settle(tag) {
        warn!("Delivery {} was already settled, skip {:?}", tag, disposition);
        return;
    }

    let result = match disposition {
        Disposition::Ack => acker.ack(tag).await,
        Disposition::Requeue => acker.nack(tag, true).await,
        Disposition::Reject => acker.nack(tag, false).await,
        Disposition::Pending => {
            debug!("Delivery {} left unacknowledged", tag);
            stats.pending += 1;
            return;
        }
    };

    match result {
        Ok(()) => {
            debug!("Delivery {} settled: {:?}", tag, disposition);
            match disposition {
                Disposition::Ack => stats.acked += 1,
                Disposition::Requeue => stats.requeued += 1,
                _ => stats.rejected += 1,
            }
        }
        Err(err) => {
            error!("{}", err);
            stats.settle_failures += 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
