use crate::errors::ProcessingError;
use async_trait::async_trait;
use shared_lib::Order;
use std::time::Duration;
use tracing::debug;

/// 订单业务处理器特征
///
/// 消息是至少投递一次（at-least-once）的，同一个订单可能被处理多次，
/// 所以实现需要保证幂等，或者自己去重。
///
/// 由于[`Processor`]需要在协程中执行，因此需要实现线程安全的[`Send`]和[`Sync`]
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, order: &Order) -> Result<(), ProcessingError>;
}

/// 模拟处理：等待固定时间，代替真实的库存预留、扣款等操作
pub struct SimulatedProcessor {
    delay: Duration,
}

impl SimulatedProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Processor for SimulatedProcessor {
    async fn process(&self, order: &Order) -> Result<(), ProcessingError> {
        debug!("[DEMO]processing order {} for {:?}", order.id, self.delay);

        tokio::time::sleep(self.delay).await;

        Ok(())
    }
}
