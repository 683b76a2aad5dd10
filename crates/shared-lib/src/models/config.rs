use color_eyre::eyre::{eyre, Context};
use color_eyre::{Help, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// 处理失败时的消息处置策略
///
/// 解码失败的消息不受此策略影响，始终 `nack(requeue=false)`，避免无限重投。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// 不ack也不nack，消息保持unacked状态，等连接断开后由broker重新投递
    Baseline,

    /// 显式nack：临时错误重新入队，永久错误直接丢弃（或由broker转入死信队列）
    #[default]
    Hardened,
}

impl FromStr for FailurePolicy {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(FailurePolicy::Baseline),
            "hardened" => Ok(FailurePolicy::Hardened),
            other => Err(eyre!("unknown failure policy `{other}`")),
        }
    }
}

/// RabbitMQ连接配置
#[derive(Clone)]
pub struct RabbitMqConfig {
    /// broker主机名，环境变量 `RABBITMQ_HOST`
    pub host: String,

    /// broker端口，环境变量 `RABBITMQ_PORT`
    pub port: u16,

    /// 用户名，环境变量 `RABBITMQ_USERNAME`
    pub username: String,

    /// 密码，环境变量 `RABBITMQ_PASSWORD`
    ///
    /// 打印配置时会被隐藏
    pub password: String,

    /// 虚拟主机，环境变量 `RABBITMQ_VHOST`
    pub vhost: String,

    /// 消费的队列名称，环境变量 `RABBITMQ_QUEUE`
    pub queue_name: String,

    /// 消费者标签，方便在RabbitMQ管理界面中定位，环境变量 `RABBITMQ_CONSUMER_TAG`
    pub consumer_tag: String,
}

impl fmt::Debug for RabbitMqConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMqConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"******")
            .field("vhost", &self.vhost)
            .field("queue_name", &self.queue_name)
            .field("consumer_tag", &self.consumer_tag)
            .finish()
    }
}

/// 程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// RabbitMQ配置
    pub rabbitmq: RabbitMqConfig,

    /// 模拟处理耗时，环境变量 `PROCESSING_DELAY_MS`
    pub processing_delay: Duration,

    /// 处理失败时的处置策略，环境变量 `FAILURE_POLICY`
    pub failure_policy: FailurePolicy,

    /// 日志级别，环境变量 `LOG_LEVEL`
    pub log_level: Level,
}

pub const DEFAULT_QUEUE_NAME: &str = "fila_pedidos";

impl AppConfig {
    pub fn load() -> Result<Arc<AppConfig>> {
        // 加载.env文件中的数据注入到环境变量中，方便本地测试
        // 线上环境部署时会直接使用环境变量，不需要.env文件
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err::<Arc<AppConfig>, _>(err).context("Can not load .env file");
            }
        }

        Ok(Arc::new(Self::from_lookup(|key| std::env::var(key).ok())?))
    }

    /// 通过任意的key查询函数构建配置，未设置的key使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = match lookup("RABBITMQ_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .context(format!("RABBITMQ_PORT `{raw}` is not a valid port"))
                .suggestion("设置 RABBITMQ_PORT 为 1~65535 之间的数字")?,
            None => 5672,
        };

        let processing_delay = match lookup("PROCESSING_DELAY_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse::<u64>()
                    .context(format!("PROCESSING_DELAY_MS `{raw}` is not a number"))
                    .suggestion("设置 PROCESSING_DELAY_MS 为毫秒数，例如 500")?,
            ),
            None => Duration::from_millis(500),
        };

        let failure_policy = match lookup("FAILURE_POLICY") {
            Some(raw) => raw.parse::<FailurePolicy>().suggestion("FAILURE_POLICY 仅支持 baseline 或 hardened")?,
            None => FailurePolicy::default(),
        };

        let log_level = match lookup("LOG_LEVEL") {
            Some(raw) => raw
                .trim()
                .parse::<Level>()
                .map_err(|err| eyre!("LOG_LEVEL `{raw}` is invalid: {err}"))
                .suggestion("LOG_LEVEL 可选值: trace/debug/info/warn/error")?,
            None => Level::INFO,
        };

        let queue_name = string_or("RABBITMQ_QUEUE", DEFAULT_QUEUE_NAME);
        if queue_name.trim().is_empty() {
            return Err::<AppConfig, _>(eyre!("RABBITMQ_QUEUE must not be empty")).suggestion("删除 RABBITMQ_QUEUE 以使用默认队列 fila_pedidos");
        }

        Ok(AppConfig {
            rabbitmq: RabbitMqConfig {
                host: string_or("RABBITMQ_HOST", "localhost"),
                port,
                username: string_or("RABBITMQ_USERNAME", "guest"),
                password: string_or("RABBITMQ_PASSWORD", "guest"),
                vhost: string_or("RABBITMQ_VHOST", "/"),
                queue_name,
                consumer_tag: string_or("RABBITMQ_CONSUMER_TAG", "order_consumer"),
            },
            processing_delay,
            failure_policy,
            log_level,
        })
    }
}
