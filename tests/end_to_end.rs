// tests/end_to_end.rs

use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

use rust_hb::auction::AuctionRunner;
use rust_hb::bidders::build_adapter;
use rust_hb::config::BidderSettings;
use rust_hb::mock_vendor;
use rust_hb::model::{AuctionContext, BannerParams, BidRequest, MediaTypes, Size, VideoContext, VideoParams};
use rust_hb::render::{ChannelPlayerQueue, PlayerInstruction};
use rust_hb::sync::SyncCapabilities;
use rust_hb::transport::HttpTransport;

async fn start_vendor() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_vendor::serve_on(listener));
    format!("http://{}", addr)
}

fn request(id: &str, bidder: &str, params: serde_json::Value, media_types: MediaTypes) -> BidRequest {
    BidRequest {
        bid_id: id.into(),
        ad_unit_code: format!("unit-{}", id),
        bidder: bidder.into(),
        media_types,
        params: params.as_object().cloned().unwrap(),
        ..Default::default()
    }
}

fn banner(w: u32, h: u32) -> MediaTypes {
    MediaTypes {
        banner: Some(BannerParams { sizes: vec![Size::new(w, h)] }),
        ..Default::default()
    }
}

#[tokio::test]
async fn auction_through_mock_vendor() {
    let base = start_vendor().await;
    let (queue, mut player_rx) = ChannelPlayerQueue::new();
    let settings = |path: &str| BidderSettings {
        endpoint: Some(format!("{}{}", base, path)),
        ..Default::default()
    };

    let transport = Arc::new(HttpTransport::new(Client::new(), 2000));
    let capabilities = SyncCapabilities { iframe_enabled: false, pixel_enabled: true };
    let mut runner = AuctionRunner::new(transport, capabilities);
    for (code, path) in [("adtelligent", "/v2/auction/"), ("integr8", "/bid"), ("medianet", "/rtb/prebid")] {
        let adapter = build_adapter(code, settings(path), queue.clone(), None).unwrap();
        runner = runner.with_bidder(adapter);
    }

    let outstream = MediaTypes {
        video: Some(VideoParams {
            context: Some(VideoContext::Outstream),
            player_size: vec![Size::new(640, 480)],
            ..Default::default()
        }),
        ..Default::default()
    };
    let requests = vec![
        request("a1", "adtelligent", json!({"aid": 331133}), banner(300, 250)),
        request("a2", "adtelligent", json!({"aid": 331133}), banner(728, 90)),
        request("i1", "integr8", json!({"propertyId": "105109", "placementId": "846832"}), banner(728, 90)),
        request("m1", "medianet", json!({"cid": "8CUX0H51C"}), banner(300, 600)),
        request("m2", "medianet", json!({"cid": "8CUX0H51C"}), outstream),
        request("bad", "medianet", json!({"cid": 42}), banner(300, 250)),
    ];
    let ctx = AuctionContext {
        auction_id: "e2e-1".into(),
        timeout: 2000,
        ..Default::default()
    };

    let result = runner.run(&requests, &ctx).await;
    assert!(result.timed_out.is_empty());
    let mut ids: Vec<&str> = result.bids.iter().map(|b| b.bid.request_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a1", "a2", "i1", "m1", "m2"]);
    assert!(result.bids.iter().all(|b| b.bid.cpm > 0.0 && b.bid.has_creative()));

    let integr8 = result.bids.iter().find(|b| b.bidder == "integr8").unwrap();
    assert_eq!(integr8.bid.currency.as_str(), "EUR");
    assert_eq!(integr8.bid.width, Some(728));

    let video = result.bids.iter().find(|b| b.bid.request_id == "m2").unwrap();
    let renderer = video.bid.renderer.as_ref().unwrap();
    assert!(renderer.render(&video.bid, Some("player-slot")));
    assert!(!renderer.render(&video.bid, None));
    match player_rx.try_recv().unwrap() {
        PlayerInstruction::BuildPlayer { element_id, .. } => assert_eq!(element_id, "player-slot"),
    }
    assert!(player_rx.try_recv().is_err());

    // 每家各一个 image 同步：adtelligent 的 cookieURLs 与 media.net 的 csUrl
    assert_eq!(result.user_syncs.len(), 2);
    let again = runner.run(&requests, &AuctionContext { auction_id: "e2e-2".into(), ..ctx }).await;
    assert_eq!(again.bids.len(), 5);
    assert!(again.user_syncs.is_empty());
}

#[tokio::test]
async fn unreachable_vendor_yields_no_bids() {
    let (queue, _rx) = ChannelPlayerQueue::new();
    let settings = BidderSettings {
        endpoint: Some("http://127.0.0.1:9/bid".into()),
        ..Default::default()
    };
    let transport = Arc::new(HttpTransport::new(Client::new(), 500));
    let runner = AuctionRunner::new(transport, SyncCapabilities::default())
        .with_bidder(build_adapter("integr8", settings, queue, None).unwrap());
    let requests = vec![request("i1", "integr8", json!({"propertyId": "1", "placementId": "2"}), banner(300, 250))];
    let result = runner
        .run(&requests, &AuctionContext { timeout: 1000, ..Default::default() })
        .await;
    assert!(result.bids.is_empty());
}
