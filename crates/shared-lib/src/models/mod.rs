pub mod config;
pub mod delivery;
pub mod order;

// 重新导出具体的类型
pub use config::{AppConfig, FailurePolicy, RabbitMqConfig, DEFAULT_QUEUE_NAME};
pub use delivery::{Delivery, DeliveryTag};
pub use order::{format_brl, Order, OrderId};
