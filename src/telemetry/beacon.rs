// src/telemetry/beacon.rs

use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::debug;

/// 单条上报
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub url: String,
    pub body: String,
    pub content_type: String,
}

impl Beacon {
    pub fn text(url: String, body: String) -> Self {
        Self {
            url,
            body,
            content_type: "text/plain".to_string(),
        }
    }
}

/// 尽力而为的上报能力：调用方永远拿不到失败，也不会被阻塞
pub trait BeaconSink: Send + Sync {
    fn fire(&self, beacon: Beacon);
}

/// **异步上报器**
///
/// 上报经 mpsc 通道进入后台任务，按批量或定时发送。
/// 通道满、网络失败都只记 debug 日志。
pub struct BeaconSender {
    sender: Sender<Beacon>,
}

impl BeaconSender {
    /// - `buffer_size`: 通道容量，满时丢弃新上报
    /// - `batch_size`: 攒够多少条立即发送
    /// - `flush_interval`: 定时发送间隔（毫秒）
    pub fn new(client: Client, buffer_size: usize, batch_size: usize, flush_interval: u64) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let worker = tokio::spawn(Self::background_sender(client, receiver, batch_size.max(1), flush_interval));
        (Arc::new(Self { sender }), worker)
    }

    async fn background_sender(client: Client, mut receiver: Receiver<Beacon>, batch_size: usize, flush_interval: u64) {
        let mut buffer = Vec::new();
        let mut interval = time::interval(Duration::from_millis(flush_interval.max(1)));
        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(beacon) => {
                        buffer.push(beacon);
                        if buffer.len() >= batch_size {
                            Self::flush(&client, &mut buffer).await;
                        }
                    }
                    None => {
                        Self::flush(&client, &mut buffer).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        Self::flush(&client, &mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(client: &Client, buffer: &mut Vec<Beacon>) {
        let sends = buffer.drain(..).map(|beacon| {
            let client = client.clone();
            async move {
                let result = client
                    .post(&beacon.url)
                    .header("Content-Type", beacon.content_type.as_str())
                    .body(beacon.body)
                    .send()
                    .await;
                if let Err(e) = result {
                    debug!(url = %beacon.url, "beacon delivery failed: {}", e);
                }
            }
        });
        join_all(sends).await;
    }
}

impl BeaconSink for BeaconSender {
    fn fire(&self, beacon: Beacon) {
        match self.sender.try_send(beacon) {
            Ok(()) => {}
            Err(TrySendError::Full(b)) => debug!(url = %b.url, "beacon buffer full, dropped"),
            Err(TrySendError::Closed(b)) => debug!(url = %b.url, "beacon sender closed, dropped"),
        }
    }
}
