use color_eyre::eyre::Context;
use color_eyre::Result;
use consumer_service::start_order_consumer;
use shared_lib::AppConfig;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let app_config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_max_level(app_config.log_level)
        .init();

    info!("Loaded config: {:?}", app_config.rabbitmq);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ctrl-C 后通知消费者停止拉取新消息
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            // 无法监听信号时保持发送端存活，消费者一直运行到进程被杀掉
            warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }

        info!("🛑 Received Ctrl-C, stopping order consumer...");
        let _ = shutdown_tx.send(true);
    });

    start_order_consumer(app_config, shutdown_rx)
        .await
        .context("Order consumer exited with error")?;

    Ok(())
}
