// src/model/server_request.rs

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
}

/// 交给传输层的请求描述：`{method, url, body}`
#[derive(Serialize, Debug, Clone)]
pub struct ServerRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Value,
    /// 本次请求覆盖的关联 ID
    #[serde(skip)]
    pub request_ids: Vec<String>,
}

impl ServerRequest {
    pub fn post(url: String, body: Value, request_ids: Vec<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            body,
            request_ids,
        }
    }
}
