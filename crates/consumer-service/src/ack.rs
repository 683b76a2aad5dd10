//! 消息确认通道
//!
//! ack/nack 必须在收到消息的同一个channel上发送，且每个投递标识只能确认一次（非批量）。

use crate::errors::ConsumeError;
use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::Channel;
use shared_lib::DeliveryTag;

/// 向broker确认消息的通道
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// 确认单条消息，broker会将其从队列中删除
    async fn ack(&self, tag: DeliveryTag) -> Result<(), ConsumeError>;

    /// 否认单条消息；`requeue` 为 `false` 时broker会丢弃它（或转入死信队列）
    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), ConsumeError>;
}

#[async_trait]
impl Acknowledger for Channel {
    async fn ack(&self, tag: DeliveryTag) -> Result<(), ConsumeError> {
        self.basic_ack(tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|source| ConsumeError::Acknowledge { tag, source })
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), ConsumeError> {
        self.basic_nack(tag, BasicNackOptions { multiple: false, requeue })
            .await
            .map_err(|source| ConsumeError::Acknowledge { tag, source })
    }
}

/// 消息的最终去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 处理成功，ack
    Ack,

    /// nack 并重新入队
    Requeue,

    /// nack 且不重新入队
    Reject,

    /// 不做任何确认，等channel关闭后由broker重新投递
    Pending,
}

/// 记录已经确认过的投递标识，避免重复确认
///
/// 同一个channel上的投递标识单调递增，并且消息是顺序处理的，
/// 所以只需要记住最后一次确认的标识即可。
#[derive(Debug, Default)]
pub struct SettleLedger {
    last_settled: Option<DeliveryTag>,
}

impl SettleLedger {
    /// 标识可以被确认时返回 `true` 并记录下来
    pub fn try_settle(&mut self, tag: DeliveryTag) -> bool {
        match self.last_settled {
            Some(last) if tag <= last => false,
            _ => {
                self.last_settled = Some(tag);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_refuses_duplicate_and_stale_tags() {
        let mut ledger = SettleLedger::default();

        assert!(ledger.try_settle(1));
        assert!(!ledger.try_settle(1));
        assert!(ledger.try_settle(3));
        assert!(!ledger.try_settle(2));
        assert!(ledger.try_settle(4));
    }
}
