// src/transport/http_client.rs

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::error::TransportError;
use crate::model::{HttpMethod, ServerRequest};

/// 传输层协作方：发送请求描述，返回解析后的响应体
pub trait Transport: Send + Sync {
    fn send(&self, request: ServerRequest) -> BoxFuture<'static, Result<Value, TransportError>>;
}

/// 基于 reqwest 的实现
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(client: Client, timeout_ms: u64) -> Self {
        Self { client, timeout_ms }
    }

    async fn execute(client: Client, request: ServerRequest, timeout_ms: u64) -> Result<Value, TransportError> {
        let start = Instant::now();
        let builder = match request.method {
            HttpMethod::Post => client
                .post(&request.url)
                .header("Content-Type", "application/json")
                .json(&request.body),
        };
        let response = timeout(Duration::from_millis(timeout_ms), builder.send())
            .await
            .map_err(|_| TransportError::Timeout {
                url: request.url.clone(),
                timeout_ms,
            })??;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: request.url,
            });
        }

        let mut bytes = response.bytes().await?.to_vec();
        debug!(
            url = %request.url,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "vendor responded"
        );
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        simd_json::serde::from_slice::<Value>(&mut bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ServerRequest) -> BoxFuture<'static, Result<Value, TransportError>> {
        Self::execute(self.client.clone(), request, self.timeout_ms).boxed()
    }
}
