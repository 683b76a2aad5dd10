//! 🔧 共享库模块
//!
//! 这个模块包含了在多个服务之间共享的通用代码，包括：
//! - 程序配置
//! - 订单数据结构
//! - 队列消息信封

pub mod models;

// 重新导出常用类型
pub use models::{format_brl, AppConfig, Delivery, DeliveryTag, FailurePolicy, Order, OrderId, RabbitMqConfig, DEFAULT_QUEUE_NAME};
