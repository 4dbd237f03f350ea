// src/render/outstream.rs

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::model::CanonicalBid;

/// 推送给供应商播放器队列的指令
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerInstruction {
    BuildPlayer {
        renderer_id: String,
        player_url: String,
        element_id: String,
        width: Option<u32>,
        height: Option<u32>,
        vast_url: Option<String>,
        vast_xml: Option<String>,
        config: Value,
    },
}

/// 供应商脚本持有的全局工作队列。
/// 播放器脚本异步加载，实现方只能入队，不能等待播放器就绪。
pub trait PlayerQueue: Send + Sync {
    fn enqueue(&self, instruction: PlayerInstruction);
}

/// 基于 tokio mpsc 的队列实现，接收端交给播放器加载完成后消费
pub struct ChannelPlayerQueue {
    sender: UnboundedSender<PlayerInstruction>,
}

impl ChannelPlayerQueue {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<PlayerInstruction>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl PlayerQueue for ChannelPlayerQueue {
    fn enqueue(&self, instruction: PlayerInstruction) {
        if let Err(e) = self.sender.send(instruction) {
            warn!("player queue closed, instruction dropped: {:?}", e.0);
        }
    }
}

/// **outstream 延迟渲染句柄**
///
/// 绑定到某个出价的关联 ID。`render` 只会真正入队一次。
pub struct RendererHandle {
    id: String,
    url: String,
    config: Value,
    queue: Arc<dyn PlayerQueue>,
    rendered: AtomicBool,
}

impl RendererHandle {
    pub fn new(id: &str, url: &str, config: Value, queue: Arc<dyn PlayerQueue>) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            config,
            queue,
            rendered: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered.load(Ordering::Acquire)
    }

    /// 宿主确定最终投放位置后调用。`element_id` 缺省时使用广告单元代码。
    /// 返回 false 表示此前已经入队过。
    pub fn render(&self, bid: &CanonicalBid, element_id: Option<&str>) -> bool {
        if self.rendered.swap(true, Ordering::AcqRel) {
            debug!(renderer_id = %self.id, "renderer already invoked");
            return false;
        }
        let instruction = PlayerInstruction::BuildPlayer {
            renderer_id: self.id.clone(),
            player_url: self.url.clone(),
            element_id: element_id.unwrap_or(&bid.ad_unit_code).to_string(),
            width: bid.width,
            height: bid.height,
            vast_url: bid.vast_url.clone(),
            vast_xml: bid.vast_xml.clone(),
            config: self.config.clone(),
        };
        self.queue.enqueue(instruction);
        true
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererHandle")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("config", &self.config)
            .field("rendered", &self.is_rendered())
            .finish()
    }
}

/// adapter 用来生成渲染句柄的播放器配置
#[derive(Clone)]
pub struct OutstreamSupport {
    pub player_url: String,
    pub queue: Arc<dyn PlayerQueue>,
}

impl OutstreamSupport {
    pub fn new(player_url: &str, queue: Arc<dyn PlayerQueue>) -> Self {
        Self {
            player_url: player_url.to_string(),
            queue,
        }
    }

    pub fn handle(&self, request_id: &str, config: Value) -> Arc<RendererHandle> {
        Arc::new(RendererHandle::new(
            request_id,
            &self.player_url,
            config,
            self.queue.clone(),
        ))
    }
}

impl fmt::Debug for OutstreamSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutstreamSupport")
            .field("player_url", &self.player_url)
            .finish()
    }
}
