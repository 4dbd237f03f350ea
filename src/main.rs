// src/main.rs

use clap::Parser;
use reqwest::Client;
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use rust_hb::analytics::AdxcgAnalytics;
use rust_hb::auction::AuctionRunner;
use rust_hb::bidders::build_adapter;
use rust_hb::config::{ConfigAdapter, ConfigData, ConfigManager, FileConfigAdapter};
use rust_hb::logging::init_tracing;
use rust_hb::mock_vendor;
use rust_hb::model::{AuctionContext, BannerParams, BidRequest, MediaTypes, Size, VideoContext, VideoParams};
use rust_hb::render::ChannelPlayerQueue;
use rust_hb::telemetry::{BeaconSender, BeaconSink};
use rust_hb::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(author = "whiteCcinn", version = "0.1", about = "Header-bidding adapters demo against a mock vendor")]
struct CliArgs {
    /// Mock 供应商监听端口
    #[arg(short, long, default_value_t = 9001)]
    port: u16,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    #[arg(short, long, default_value = "static/bidders.json")]
    config: String,
    /// 覆盖配置中的拍卖超时（毫秒）
    #[arg(short, long)]
    timeout: Option<u64>,
    /// 跑完示例拍卖后继续提供 mock 服务，直到 Ctrl-C
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn demo_requests() -> Vec<BidRequest> {
    let params = |value: serde_json::Value| value.as_object().cloned().unwrap_or_default();
    let banner = |sizes: Vec<Size>| MediaTypes {
        banner: Some(BannerParams { sizes }),
        ..Default::default()
    };
    vec![
        BidRequest {
            bid_id: "demo-1".into(),
            ad_unit_code: "div-top-banner".into(),
            bidder: "adtelligent".into(),
            transaction_id: Some("tx-1".into()),
            media_types: banner(vec![Size::new(300, 250), Size::new(728, 90)]),
            params: params(json!({"aid": 331133})),
            ..Default::default()
        },
        BidRequest {
            bid_id: "demo-2".into(),
            ad_unit_code: "div-top-banner".into(),
            bidder: "integr8".into(),
            transaction_id: Some("tx-1".into()),
            media_types: banner(vec![Size::new(728, 90)]),
            params: params(json!({"propertyId": "105109", "placementId": "846832"})),
            ..Default::default()
        },
        BidRequest {
            bid_id: "demo-3".into(),
            ad_unit_code: "div-sidebar".into(),
            bidder: "medianet".into(),
            transaction_id: Some("tx-2".into()),
            media_types: banner(vec![Size::new(300, 600)]),
            params: params(json!({"cid": "8CUX0H51C", "crid": "358025426"})),
            ..Default::default()
        },
        BidRequest {
            bid_id: "demo-4".into(),
            ad_unit_code: "div-outstream".into(),
            bidder: "medianet".into(),
            transaction_id: Some("tx-3".into()),
            media_types: MediaTypes {
                video: Some(VideoParams {
                    context: Some(VideoContext::Outstream),
                    player_size: vec![Size::new(640, 480)],
                    ..Default::default()
                }),
                ..Default::default()
            },
            params: params(json!({"cid": "8CUX0H51C", "crid": "358025427"})),
            ..Default::default()
        },
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // 初始化全局 tracing 日志
    let _guard = init_tracing(&args.log_dir)?;

    // 读取 bidder 配置，失败时使用默认配置继续
    let data = FileConfigAdapter::new(&args.config).load().unwrap_or_else(|e| {
        warn!("{}, falling back to default config", e);
        ConfigData::default()
    });
    let config = Arc::new(ConfigManager::new(data));
    let timeout_ms = args.timeout.unwrap_or_else(|| config.timeout_ms());

    // 启动 Mock 供应商服务
    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    let vendor_server = tokio::spawn(async move {
        if let Err(e) = mock_vendor::serve_on(listener).await {
            error!("Mock vendor stopped: {}", e);
        }
    });

    let client = Client::new();
    let (beacons, beacon_worker) = BeaconSender::new(client.clone(), 1000, 50, 1000);
    let (player_queue, mut player_rx) = ChannelPlayerQueue::new();
    let player_task = tokio::spawn(async move {
        while let Some(instruction) = player_rx.recv().await {
            info!(instruction = ?instruction, "player instruction queued");
        }
    });

    let transport = Arc::new(HttpTransport::new(client, timeout_ms));
    let mut runner = AuctionRunner::new(transport, config.user_sync());
    for (code, settings) in config.snapshot().bidders {
        if !settings.enabled {
            continue;
        }
        let sink: Arc<dyn BeaconSink> = beacons.clone();
        match build_adapter(&code, settings, player_queue.clone(), Some(sink)) {
            Some(adapter) => runner = runner.with_bidder(adapter),
            None => warn!(bidder = %code, "unknown bidder in config, skipped"),
        }
    }
    if let Some(options) = config.analytics() {
        let analytics = AdxcgAnalytics::new(beacons.clone());
        if analytics.enable(options) {
            runner = runner.with_analytics(Arc::new(analytics));
        }
    }
    info!(bidders = ?runner.bidder_codes(), timeout_ms, "running demo auction");

    let ctx = AuctionContext {
        timeout: timeout_ms,
        page: Some("https://publisher.example/article".into()),
        viewport: Some(Size::new(1280, 800)),
        ..Default::default()
    };
    let result = runner.run(&demo_requests(), &ctx).await;
    for received in &result.bids {
        info!(
            bidder = %received.bidder,
            ad_unit = %received.bid.ad_unit_code,
            cpm = received.bid.cpm,
            currency = %received.bid.currency.as_str(),
            "bid received"
        );
    }
    info!(
        auction_id = %result.auction_id,
        bids = result.bids.len(),
        syncs = result.user_syncs.len(),
        timed_out = ?result.timed_out,
        "demo auction done"
    );

    // 示例：每个广告位价格最高的出价胜出
    let mut units: Vec<&str> = result.bids.iter().map(|b| b.bid.ad_unit_code.as_str()).collect();
    units.sort_unstable();
    units.dedup();
    for unit in units {
        let winner = result
            .bids
            .iter()
            .filter(|b| b.bid.ad_unit_code == unit)
            .max_by(|a, b| a.bid.cpm.total_cmp(&b.bid.cpm));
        if let Some(winner) = winner {
            runner.set_targeting(winner);
            runner.bid_won(winner);
            if let Some(renderer) = &winner.bid.renderer {
                renderer.render(&winner.bid, None);
            }
        }
    }

    if args.serve {
        info!("Serving mock vendor on port {}, press Ctrl-C to stop", args.port);
        signal::ctrl_c().await?;
        info!("Shutting down gracefully...");
    }

    drop(runner);
    drop(player_queue);
    drop(beacons);
    if timeout(Duration::from_secs(5), beacon_worker).await.is_err() {
        warn!("beacon sender did not drain in time");
    }
    vendor_server.abort();
    player_task.abort();
    Ok(())
}
