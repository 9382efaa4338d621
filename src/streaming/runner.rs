//! 审计运行入口
//!
//! 打开传输，解码事件，交给聚合器，并把快照回调给调用方。
//! 收到 `final` 后立即停止读取，丢弃字节流即关闭连接。

use crate::config::ClientConfig;
use crate::models::FinalAuditResult;
use crate::streaming::aggregator::{AggregatorStep, AuditAggregator, ProgressSnapshot};
use crate::streaming::decoder::{decode, NdjsonEventDecoder};
use crate::streaming::error::AuditStreamError;
use crate::streaming::transport::{AuditStreamRequest, AuditTransport, HttpAuditTransport};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 推送给调用方的更新
#[derive(Debug, Clone, PartialEq)]
pub enum AuditUpdate {
    Progress(ProgressSnapshot),
    Final(FinalAuditResult),
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    /// 服务端 `final.result` 原样返回
    Completed(FinalAuditResult),
    /// 调用方主动取消，不视为失败
    Cancelled,
}

impl AuditOutcome {
    pub fn result(&self) -> Option<&FinalAuditResult> {
        match self {
            AuditOutcome::Completed(result) => Some(result),
            AuditOutcome::Cancelled => None,
        }
    }
}

/// 审计流客户端
#[derive(Clone)]
pub struct AuditStreamClient {
    config: ClientConfig,
    transport: Arc<dyn AuditTransport>,
}

impl std::fmt::Debug for AuditStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStreamClient")
            .field("config", &self.config)
            .field("transport", &self.transport.transport_name())
            .finish()
    }
}

impl AuditStreamClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn AuditTransport>) -> Self {
        Self { config, transport }
    }

    /// 使用 HTTP 传输
    pub fn http(config: ClientConfig, auth_token: impl Into<String>) -> Result<Self, AuditStreamError> {
        let transport = HttpAuditTransport::new(config.clone(), auth_token)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 运行一次审计
    ///
    /// 每个进度事件回调一次 `AuditUpdate::Progress`，成功时最后回调一次
    /// `AuditUpdate::Final`。失败或取消后不再回调。调用方取消返回
    /// `Ok(AuditOutcome::Cancelled)`。
    pub async fn run_audit<F>(
        &self,
        request: &AuditStreamRequest,
        cancel: Option<CancellationToken>,
        mut on_update: F,
    ) -> Result<AuditOutcome, AuditStreamError>
    where
        F: FnMut(AuditUpdate),
    {
        info!(
            brand_id = %request.brand_id,
            transport = self.transport.transport_name(),
            "开始审计"
        );

        match self.drive(request, cancel, &mut on_update).await {
            Ok(result) => {
                info!(
                    brand_id = %request.brand_id,
                    overall_score = ?result.overall_score(),
                    "审计完成"
                );
                Ok(AuditOutcome::Completed(result))
            }
            Err(AuditStreamError::Cancelled) => {
                info!(brand_id = %request.brand_id, "审计已取消");
                Ok(AuditOutcome::Cancelled)
            }
            Err(error) => {
                warn!(
                    brand_id = %request.brand_id,
                    error_type = error.error_type(),
                    error = %error,
                    "审计失败"
                );
                Err(error)
            }
        }
    }

    async fn drive<F>(
        &self,
        request: &AuditStreamRequest,
        cancel: Option<CancellationToken>,
        on_update: &mut F,
    ) -> Result<FinalAuditResult, AuditStreamError>
    where
        F: FnMut(AuditUpdate),
    {
        let mut aggregator =
            AuditAggregator::new().with_dedup_analyzer(self.config.dedup_analyzer.clone());
        aggregator.start(&request.brand_id, &request.domain);

        let caller = cancel.clone();
        let started_at = Utc::now();
        let source = self.transport.open(request, cancel).await?;
        let decoder = NdjsonEventDecoder::new()
            .with_max_line_bytes(self.config.max_line_bytes)
            .with_flush_trailing_line(self.config.flush_trailing_line);
        let mut events = decode(source, decoder).with_started_at(started_at);

        let outcome = loop {
            let next = events.next().await;
            // 已缓冲的事件不能在取消后继续回调
            if caller.as_ref().is_some_and(|t| t.is_cancelled()) {
                break Err(AuditStreamError::Cancelled);
            }

            let step = match next {
                Some(Ok(event)) => aggregator.apply(event),
                Some(Err(error)) => match aggregator.fail(error) {
                    Some(step) => step,
                    None => continue,
                },
                None => {
                    aggregator.finish_stream();
                    break Err(AuditStreamError::missing_final());
                }
            };

            match step {
                AggregatorStep::Progress(snapshot) => on_update(AuditUpdate::Progress(snapshot)),
                AggregatorStep::Resolved(result) => {
                    on_update(AuditUpdate::Final(result.clone()));
                    break Ok(result);
                }
                AggregatorStep::Rejected(error) => break Err(error),
                AggregatorStep::Ignored => debug!("忽略事件"),
            }
        };

        let mut metrics = events.metrics().clone();
        metrics.finish();
        metrics.log_metrics(&request.brand_id);
        outcome
    }
}
