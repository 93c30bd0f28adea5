//! 按行读取 JSON 编码的设备事件
//!
//! 读取在独立线程上阻塞进行，运行时关闭时不会等待输入结束。

use std::io::{BufRead, BufReader, Stdin};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::model::DeviceEvent;

pub struct JsonLinesSource<R> {
    reader: R,
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl<R> JsonLinesSource<R>
where
    R: BufRead,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// 读取到 EOF 或接收端关闭为止，返回转发的事件数
    ///
    /// 空行跳过；无法解析的行记录警告后跳过。必须在运行时之外的线程调用。
    pub fn run(self, sender: mpsc::Sender<DeviceEvent>) -> std::io::Result<u64> {
        let mut line_no = 0u64;
        let mut forwarded = 0u64;

        for line in self.reader.lines() {
            let line = line?;
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: DeviceEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(err) => {
                    warn!(line = line_no, error = %err, "skipping undecodable event");
                    continue;
                }
            };

            if sender.blocking_send(event).is_err() {
                debug!("event consumer closed, stop reading input");
                break;
            }
            forwarded += 1;
        }

        info!(lines = line_no, forwarded, "event source finished");
        Ok(forwarded)
    }
}

impl<R> JsonLinesSource<R>
where
    R: BufRead + Send + 'static,
{
    /// 在独立线程上运行，返回的接收端在读取结束时得到结果
    ///
    /// 线程不被等待；阻塞在输入上的线程随进程退出。
    pub fn spawn(
        self,
        sender: mpsc::Sender<DeviceEvent>,
    ) -> std::io::Result<oneshot::Receiver<std::io::Result<u64>>> {
        let (done, finished) = oneshot::channel();
        thread::Builder::new()
            .name("event-source".to_string())
            .spawn(move || {
                let _ = done.send(self.run(sender));
            })?;
        Ok(finished)
    }
}
