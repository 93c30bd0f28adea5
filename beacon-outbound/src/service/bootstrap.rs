//! 应用启动器 - 负责依赖注入和服务启动

use anyhow::Result;
use beacon_core::BeaconAppConfig;
use beacon_core::tracing::init_tracing_from_config;
use tracing::{error, info, warn};

use super::wire;
use crate::interface::runtime::EventConsumer;
use crate::interface::source::JsonLinesSource;

pub use wire::ApplicationContext;

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(app_config: BeaconAppConfig) -> Result<()> {
        init_tracing_from_config(Some(&app_config.logging));

        let context = wire::initialize(&app_config).await?;
        info!("ApplicationBootstrap created successfully");

        Self::run_with_context(context).await
    }

    /// 从标准输入消费事件，直到输入结束或收到停止信号
    pub async fn run_with_context(context: ApplicationContext) -> Result<()> {
        let ApplicationContext {
            settings,
            mut processor,
            metrics,
        } = context;

        let consumer =
            EventConsumer::new(processor.dispatcher(), settings.workers, settings.event_buffer);
        let (sender, handle) = consumer.start();

        let source = JsonLinesSource::stdin().spawn(sender)?;

        info!("Starting outbound service, reading events from stdin...");

        tokio::select! {
            result = source => match result {
                Ok(Ok(forwarded)) => info!(forwarded, "input closed"),
                Ok(Err(err)) => error!(error = %err, "failed to read events from stdin"),
                Err(_) => error!("event source thread exited without a result"),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received");
                handle.close();
            }
        }

        let summary = handle.wait().await;
        info!(
            events = summary.events,
            filtered = summary.filtered,
            delivered = summary.delivered,
            failed = summary.failed,
            dropped = summary.dropped,
            "event consumer drained"
        );

        processor.stop().await;

        match metrics.gather_text() {
            Ok(text) => info!("final metrics:\n{text}"),
            Err(err) => warn!(error = %err, "failed to render metrics"),
        }

        Ok(())
    }
}
