//! 审计流传输层
//!
//! 发起单个带 bearer token 的 POST 请求，把响应 body 作为有序字节流交给调用方。
//! 调用方令牌与内部超时合并为一个有效令牌，任一触发都会中止这一个请求。

use crate::config::ClientConfig;
use crate::streaming::cancel::CompositeCancellation;
use crate::streaming::error::AuditStreamError;
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 原始字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AuditStreamError>> + Send>>;

/// 一次审计运行的请求参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStreamRequest {
    pub brand_id: String,
    /// 草稿中展示的域名，服务端的最终结果会覆盖它
    #[serde(default)]
    pub domain: String,
}

impl AuditStreamRequest {
    pub fn new(brand_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            domain: domain.into(),
        }
    }
}

/// 审计流传输
#[async_trait]
pub trait AuditTransport: Send + Sync {
    /// 打开审计流
    ///
    /// 调用方取消时，返回的错误（或字节流中的错误）为 `AuditStreamError::Cancelled`。
    async fn open(
        &self,
        request: &AuditStreamRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<ByteStream, AuditStreamError>;

    /// 传输名称，用于日志
    fn transport_name(&self) -> &'static str;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpAuditTransport {
    client: reqwest::Client,
    config: ClientConfig,
    auth_token: String,
}

impl HttpAuditTransport {
    pub fn new(config: ClientConfig, auth_token: impl Into<String>) -> Result<Self, AuditStreamError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, config, auth_token))
    }

    pub fn with_client(
        client: reqwest::Client,
        config: ClientConfig,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            auth_token: auth_token.into(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl AuditTransport for HttpAuditTransport {
    async fn open(
        &self,
        request: &AuditStreamRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<ByteStream, AuditStreamError> {
        let endpoint = self.config.stream_url(&request.brand_id);
        open_stream(
            &self.client,
            &endpoint,
            &self.auth_token,
            self.config.timeout(),
            cancel,
        )
        .await
    }

    fn transport_name(&self) -> &'static str {
        "http"
    }
}

/// 打开一个审计流请求
///
/// 超时覆盖到收到成功响应头为止（非成功状态时还覆盖错误 body 的读取）；
/// 之后仅调用方令牌能中止请求。
pub async fn open_stream(
    client: &reqwest::Client,
    endpoint: &str,
    auth_token: &str,
    timeout: Duration,
    cancel: Option<CancellationToken>,
) -> Result<ByteStream, AuditStreamError> {
    let guard = CompositeCancellation::arm(timeout, cancel);
    debug!(endpoint = %endpoint, timeout_secs = timeout.as_secs(), "打开审计流");

    let send = client.post(endpoint).bearer_auth(auth_token).send();
    let response = tokio::select! {
        biased;
        _ = guard.token().cancelled() => return Err(guard.cancellation_error()),
        result = send => result.map_err(|e| guard.classify(e.into()))?,
    };

    let status = response.status();
    if !status.is_success() {
        // 读取错误 body 期间超时与调用方取消都仍然有效
        let body = tokio::select! {
            biased;
            _ = guard.token().cancelled() => return Err(guard.cancellation_error()),
            body = response.text() => body.unwrap_or_default(),
        };
        let message = error_message(status, &body);
        warn!(endpoint = %endpoint, status = status.as_u16(), message = %message, "审计流请求失败");
        return Err(AuditStreamError::transport(Some(status.as_u16()), message));
    }
    guard.disarm_timeout();

    if response.content_length() == Some(0) {
        warn!(endpoint = %endpoint, "审计流响应没有 body");
        return Err(AuditStreamError::transport(
            Some(status.as_u16()),
            "Audit stream response has no body",
        ));
    }

    let mut body = Box::pin(response.bytes_stream());
    let stream = stream! {
        // 字节流持有 guard；流被丢弃时后台监视任务随之结束
        let guard = guard;
        loop {
            let next = tokio::select! {
                biased;
                _ = guard.token().cancelled() => Err(guard.cancellation_error()),
                chunk = body.next() => Ok(chunk),
            };
            match next {
                Ok(Some(Ok(bytes))) => {
                    yield Ok(bytes);
                }
                Ok(Some(Err(e))) => {
                    yield Err(guard.classify(e.into()));
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };

    Ok(Box::pin(stream))
}

/// 从错误响应中提取消息
///
/// 优先使用 JSON body 的 `error` / `message` 字段，其次使用原始 body，
/// body 为空时由状态码合成。
pub fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("Audit request failed with HTTP {}", status.as_u16());
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }

    truncate_message(body, 200)
}

fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        message.to_string()
    } else {
        let truncated: String = message.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
