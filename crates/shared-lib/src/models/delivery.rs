/// broker为每个channel分配的投递标识，单调递增，仅在当前channel内唯一
pub type DeliveryTag = u64;

/// 从队列中收到的一条消息
///
/// `payload` 在收到后不可修改；`tag` 只能被确认（ack/nack）一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// 消息原始内容
    pub payload: Vec<u8>,

    /// 投递标识，用于ack/nack
    pub tag: DeliveryTag,

    /// 路由键，仅用于日志
    pub routing_key: String,

    /// broker是否已经投递过这条消息
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(tag: DeliveryTag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            tag,
            routing_key: String::new(),
            redelivered: false,
        }
    }
}
