use shared_lib::DeliveryTag;
use thiserror::Error;

/// 消息解码错误
///
/// 这类消息无论处理多少次都不会成功，因此不会重新入队。
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// JSON格式错误、缺少必填字段或字段类型不对
    #[error("payload is not a valid order: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("order failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl DecodeError {
    /// 不包含消息内容的错误原因，用于日志
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::InvalidUtf8(_) => "invalid_utf8",
            DecodeError::Malformed(_) => "malformed_json",
            DecodeError::Invalid(_) => "validation_failed",
        }
    }
}

/// 业务处理错误
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// 临时错误（例如下游服务不可用），稍后重试可能成功
    #[error("transient processing failure: {0}")]
    Transient(String),

    /// 永久错误，重试也不会成功
    #[error("permanent processing failure: {0}")]
    Permanent(String),
}

/// 消息处理器返回的错误
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl HandlerError {
    /// 日志中使用的错误类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode",
            HandlerError::Processing(ProcessingError::Transient(_)) => "processing_transient",
            HandlerError::Processing(ProcessingError::Permanent(_)) => "processing_permanent",
        }
    }
}

/// 消费者错误，除了 [`ConsumeError::Acknowledge`] 外都会终止消费循环
#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("RabbitMQ connection error: {0}")]
    Connection(#[source] lapin::Error),

    #[error("declare queue `{queue}` failed: {source}")]
    QueueDeclare {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("subscribe to queue `{queue}` failed: {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("delivery stream failed: {0}")]
    Stream(#[source] lapin::Error),

    /// 未收到关闭信号，消息流却结束了（例如broker取消了消费者或者队列被删除）
    #[error("delivery stream of queue `{queue}` ended without a shutdown signal")]
    StreamEnded { queue: String },

    #[error("acknowledge delivery {tag} failed: {source}")]
    Acknowledge {
        tag: DeliveryTag,
        #[source]
        source: lapin::Error,
    },
}
