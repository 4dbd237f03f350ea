// src/mock_vendor.rs

use axum::{http::StatusCode, routing::post, serve, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::info;

/// 模拟供应商处理延迟（毫秒）
async fn simulate_latency() {
    let delay_ms = rand::thread_rng().gen_range(5..40);
    sleep(Duration::from_millis(delay_ms)).await;
}

fn random_cpm(low: f64, high: f64) -> f64 {
    let cpm: f64 = rand::thread_rng().gen_range(low..high);
    (cpm * 100.0).round() / 100.0
}

/// "300x250" → (300, 250)
fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn banner_markup(vendor: &str, id: &str) -> String {
    format!(
        "<html><body>Mock {vendor} Banner Ad<img src=\"http://vendor-tracker.local/impression?bid={id}\" style=\"display:none;\" /></body></html>",
        vendor = vendor,
        id = id
    )
}

fn vast_url(vendor: &str, id: &str) -> String {
    format!("http://vendor-tracker.local/{}/vast.xml?bid={}", vendor, id)
}

/// adtelligent 风格：`{BidRequests: [{CallbackId, AdType, Sizes}]}` → `{bids: [...], cookieURLs}`
async fn handle_adtelligent(Json(body): Json<Value>) -> Json<Value> {
    let placements = body["BidRequests"].as_array().cloned().unwrap_or_default();
    info!("Mock adtelligent received {} placements", placements.len());
    simulate_latency().await;

    let bids: Vec<Value> = placements
        .iter()
        .filter_map(|p| {
            let id = p["CallbackId"].as_str()?;
            let (w, h) = p["Sizes"]
                .as_str()
                .and_then(|s| s.split(',').next())
                .and_then(parse_size)
                .unwrap_or((300, 250));
            let mut bid = json!({
                "requestId": id,
                "cpm": random_cpm(0.5, 3.0),
                "cur": "USD",
                "width": w,
                "height": h,
                "cmpId": format!("cmp-{}", id),
                "adomain": ["advertiser.example"],
            });
            if p["AdType"] == "video" {
                bid["vastUrl"] = json!(vast_url("adtelligent", id));
            } else {
                bid["ad"] = json!(banner_markup("adtelligent", id));
            }
            Some(bid)
        })
        .collect();
    Json(json!({
        "bids": bids,
        "cookieURLs": ["http://vendor-tracker.local/adtelligent/sync.gif"],
        "cookieURLSTypes": ["image"],
    }))
}

/// integr8 风格：`{placements: [{bidid, sizes}]}` → 记录数组
async fn handle_integr8(Json(body): Json<Value>) -> Json<Value> {
    let placements = body["placements"].as_array().cloned().unwrap_or_default();
    info!("Mock integr8 received {} placements", placements.len());
    simulate_latency().await;

    let records: Vec<Value> = placements
        .iter()
        .filter_map(|p| {
            let id = p["bidid"].as_str()?;
            let (w, h) = p["sizes"]
                .as_str()
                .and_then(|s| s.split(';').next())
                .and_then(parse_size)
                .unwrap_or((300, 250));
            Some(json!({
                "BidId": id,
                "CPM": random_cpm(0.8, 2.5),
                "Currency": "EUR",
                "TTL": 300,
                "NetRevenue": true,
                "MediaType": "banner",
                "Width": w,
                "Height": h,
                "CreativeId": format!("cr-{}", id),
                "ADomain": ["advertiser.example"],
                "Ad": banner_markup("integr8", id),
            }))
        })
        .collect();
    Json(Value::Array(records))
}

/// media.net 风格：`{imp: [{id, banner, video}]}` → `{bidList: [...], ext: {csUrl}}`
async fn handle_medianet(Json(body): Json<Value>) -> Json<Value> {
    let imps = body["imp"].as_array().cloned().unwrap_or_default();
    info!("Mock medianet received {} impressions", imps.len());
    simulate_latency().await;

    let bids: Vec<Value> = imps
        .iter()
        .filter_map(|imp| {
            let id = imp["id"].as_str()?;
            let mut bid = json!({
                "requestId": id,
                "no_bid": false,
                "cpm": random_cpm(0.4, 2.0),
                "currency": "USD",
                "creativeId": format!("mn-{}", id),
                "netRevenue": true,
                "ttl": 180,
            });
            if imp.get("video").is_some() {
                bid["mediaType"] = json!("video");
                bid["vastUrl"] = json!(vast_url("medianet", id));
                bid["context"] = imp["video"]["context"].clone();
                bid["vto"] = json!(5000);
            } else {
                bid["width"] = imp["banner"][0]["w"].clone();
                bid["height"] = imp["banner"][0]["h"].clone();
                bid["ad"] = json!(banner_markup("medianet", id));
            }
            Some(bid)
        })
        .collect();
    Json(json!({
        "bidList": bids,
        "ext": {
            "csUrl": [
                {"type": "iframe", "url": "http://vendor-tracker.local/medianet/sync.html"},
                {"type": "image", "url": "http://vendor-tracker.local/medianet/sync.gif"}
            ]
        }
    }))
}

/// adxcg 风格的分析上报接收端，只记录收到的字节数
async fn handle_analytics(body: String) -> StatusCode {
    info!("Mock analytics received {} bytes", body.len());
    StatusCode::NO_CONTENT
}

/// 各供应商的竞价路由
pub fn router() -> Router {
    Router::new()
        .route("/v2/auction/", post(handle_adtelligent))
        .route("/bid", post(handle_integr8))
        .route("/rtb/prebid", post(handle_medianet))
        .route("/pbrx/v2", post(handle_analytics))
}

/// 在已绑定的监听器上提供服务
pub async fn serve_on(listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Mock vendor running at http://{}", addr);
    }
    serve(listener, router()).await
}
