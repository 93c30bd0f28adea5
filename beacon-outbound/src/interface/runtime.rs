//! 事件消费运行时：有界队列 + 固定数量的分发工作协程

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::dispatcher::OutboundDispatcher;
use crate::domain::model::{DeviceEvent, DispatchReport};

#[derive(Debug, Default)]
struct ConsumerCounters {
    events: AtomicU64,
    filtered: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl ConsumerCounters {
    fn record(&self, report: &DispatchReport) {
        self.events.fetch_add(1, Ordering::Relaxed);
        match report {
            DispatchReport::Filtered => {
                self.filtered.fetch_add(1, Ordering::Relaxed);
            }
            DispatchReport::Done {
                route_error: Some(_),
                ..
            } => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            DispatchReport::Done { .. } => {
                self.delivered
                    .fetch_add(report.delivered() as u64, Ordering::Relaxed);
                self.failed
                    .fetch_add(report.failed() as u64, Ordering::Relaxed);
            }
        }
    }

    fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            events: self.events.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// 消费统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub events: u64,
    pub filtered: u64,
    /// 成功投递的路由数
    pub delivered: u64,
    /// 投递失败的路由数
    pub failed: u64,
    /// 因路由计算失败而丢弃的事件数
    pub dropped: u64,
}

pub struct EventConsumer {
    dispatcher: Arc<OutboundDispatcher>,
    workers: usize,
    buffer: usize,
}

impl EventConsumer {
    pub fn new(dispatcher: Arc<OutboundDispatcher>, workers: usize, buffer: usize) -> Self {
        Self {
            dispatcher,
            workers: workers.max(1),
            buffer: buffer.max(1),
        }
    }

    /// 启动工作协程，返回事件发送端
    ///
    /// 发送端全部释放或调用 [`ConsumerHandle::close`] 后，工作协程处理完队列中的事件即退出。
    pub fn start(self) -> (mpsc::Sender<DeviceEvent>, ConsumerHandle) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(ConsumerCounters::default());
        let (closing, closed) = watch::channel(false);

        let workers = (0..self.workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    self.dispatcher.clone(),
                    counters.clone(),
                    closed.clone(),
                ))
            })
            .collect();

        info!(workers = self.workers, buffer = self.buffer, "event consumer started");

        (
            sender,
            ConsumerHandle {
                workers,
                counters,
                closing,
            },
        )
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<DeviceEvent>>>,
    dispatcher: Arc<OutboundDispatcher>,
    counters: Arc<ConsumerCounters>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            if *closed.borrow_and_update() {
                receiver.close();
                receiver.recv().await
            } else {
                tokio::select! {
                    event = receiver.recv() => event,
                    _ = closed.changed() => {
                        // 关闭后不再接收新事件，队列中剩余事件照常处理
                        receiver.close();
                        receiver.recv().await
                    }
                }
            }
        };
        let Some(event) = next else {
            break;
        };
        let report = dispatcher.dispatch(&event).await;
        counters.record(&report);
    }
    debug!(worker_id, "event worker stopped");
}

pub struct ConsumerHandle {
    workers: Vec<JoinHandle<()>>,
    counters: Arc<ConsumerCounters>,
    closing: watch::Sender<bool>,
}

impl ConsumerHandle {
    pub fn summary(&self) -> ConsumerSummary {
        self.counters.summary()
    }

    /// 停止接收新事件，发送端仍存活时也能让工作协程退出
    pub fn close(&self) {
        if !self.closing.send_replace(true) {
            info!("event consumer closing");
        }
    }

    /// 等待所有工作协程处理完队列中的事件
    pub async fn wait(self) -> ConsumerSummary {
        let Self {
            workers,
            counters,
            closing,
        } = self;
        for result in join_all(workers).await {
            if let Err(err) = result {
                warn!(error = %err, "event worker terminated abnormally");
            }
        }
        drop(closing);
        counters.summary()
    }
}
