//! 审计聚合状态机
//!
//! 消费解码后的事件，维护进度计数与审计草稿，最终以服务端的 `final`
//! 结果完成，或以类型化错误失败。
//!
//! 状态：`Idle → Streaming → {Resolved | Rejected}`，后两者为终态。
//! 草稿只由聚合器持有，对外只交出克隆的快照。

use crate::models::{AuditCategoryKey, AuditResult, FinalAuditResult, TestResult};
use crate::streaming::error::AuditStreamError;
use crate::streaming::events::{AuditEvent, ProgressBucket, ProgressEvent, ProgressUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 默认去重分析器：它在 semanticStructure 分桶中重复产出 "Content Depth"
pub const DEFAULT_DEDUP_ANALYZER: &str = "aeoContent";

/// 被去重的测试名
pub const CONTENT_DEPTH_TEST: &str = "Content Depth";

/// 聚合器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    Idle,
    Streaming,
    Resolved,
    Rejected,
}

impl AggregatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AggregatorState::Resolved | AggregatorState::Rejected)
    }
}

/// 单个分桶的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketProgress {
    pub completed: u32,
    pub total: u32,
}

/// 进度计数
///
/// 只用于界面展示，不影响审计结果。
///
/// 线上协议不携带分桶自己的总数，只有全局 `total`。分桶可以通过
/// `declare_bucket` 预先声明总数；未声明的分桶以最近一个事件的全局 `total`
/// 作为上限，服务端上调总数时上限随之上调。
#[derive(Debug, Clone, Default)]
pub struct ProgressCounters {
    total_expected: u32,
    per_bucket: HashMap<ProgressBucket, BucketEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketEntry {
    progress: BucketProgress,
    declared: bool,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预先声明某个分桶的总数
    pub fn declare_bucket(&mut self, bucket: ProgressBucket, total: u32) {
        let entry = self.per_bucket.entry(bucket).or_default();
        entry.declared = true;
        entry.progress.total = total;
        entry.progress.completed = entry.progress.completed.min(total);
    }

    /// 记录一个进度事件
    ///
    /// 分桶完成数加一并封顶在该分桶的上限。
    pub fn record(&mut self, bucket: ProgressBucket, event_total: u32) -> BucketProgress {
        self.total_expected = event_total;
        let entry = self.per_bucket.entry(bucket).or_default();
        if !entry.declared {
            entry.progress.total = entry.progress.total.max(event_total);
        }
        let progress = &mut entry.progress;
        progress.completed = progress.completed.saturating_add(1).min(progress.total);
        *progress
    }

    pub fn bucket(&self, bucket: ProgressBucket) -> Option<BucketProgress> {
        self.per_bucket.get(&bucket).map(|entry| entry.progress)
    }

    pub fn total_expected(&self) -> u32 {
        self.total_expected
    }
}

/// 每个进度事件后交给调用方的快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub analyzer: Option<String>,
    pub bucket: ProgressBucket,
    /// 服务端报告的全局完成数
    pub completed: u32,
    /// 服务端报告的全局总数
    pub total: u32,
    pub bucket_progress: BucketProgress,
    pub result: AuditResult,
}

/// 应用一个事件后的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorStep {
    Progress(ProgressSnapshot),
    /// 服务端的最终结果，原样交给调用方
    Resolved(FinalAuditResult),
    Rejected(AuditStreamError),
    /// 非 Streaming 状态下收到的事件
    Ignored,
}

/// 审计聚合器
#[derive(Debug)]
pub struct AuditAggregator {
    state: AggregatorState,
    draft: AuditResult,
    final_result: Option<FinalAuditResult>,
    counters: ProgressCounters,
    dedup_analyzer: String,
}

impl Default for AuditAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditAggregator {
    pub fn new() -> Self {
        Self {
            state: AggregatorState::Idle,
            draft: AuditResult::default(),
            final_result: None,
            counters: ProgressCounters::new(),
            dedup_analyzer: DEFAULT_DEDUP_ANALYZER.to_string(),
        }
    }

    pub fn with_dedup_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.dedup_analyzer = analyzer.into();
        self
    }

    pub fn with_counters(mut self, counters: ProgressCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    /// 当前草稿（或最终结果类型化视图）的快照
    pub fn snapshot(&self) -> AuditResult {
        self.draft.clone()
    }

    /// 已收到的最终结果
    pub fn final_result(&self) -> Option<&FinalAuditResult> {
        self.final_result.as_ref()
    }

    /// 开始一次运行，创建全零草稿
    pub fn start(&mut self, brand_id: &str, domain: &str) {
        if self.state != AggregatorState::Idle {
            warn!(state = ?self.state, "聚合器已启动，忽略重复的 start");
            return;
        }
        self.draft = AuditResult::draft(brand_id, domain);
        self.state = AggregatorState::Streaming;
    }

    /// 按到达顺序应用一个事件
    pub fn apply(&mut self, event: AuditEvent) -> AggregatorStep {
        if self.state != AggregatorState::Streaming {
            debug!(state = ?self.state, event_type = event.event_type(), "忽略非运行状态下的事件");
            return AggregatorStep::Ignored;
        }

        match event {
            AuditEvent::Progress(progress) => {
                let bucket = progress.bucket();
                let analyzer = progress.analyzer.clone();
                let (completed, total) = (progress.completed, progress.total);
                let bucket_progress = self.counters.record(bucket, total);

                let draft = std::mem::take(&mut self.draft);
                self.draft = reduce_draft(draft, progress, &self.dedup_analyzer);

                debug!(
                    bucket = %bucket,
                    analyzer = ?analyzer,
                    completed,
                    total,
                    overall_score = self.draft.overall_score,
                    "应用进度事件"
                );

                AggregatorStep::Progress(ProgressSnapshot {
                    analyzer,
                    bucket,
                    completed,
                    total,
                    bucket_progress,
                    result: self.draft.clone(),
                })
            }
            AuditEvent::Final(result) => {
                // 草稿被整体丢弃；类型化视图解析失败时只保留原始结果
                self.draft = result.to_audit_result().unwrap_or_default();
                self.final_result = Some(result.clone());
                self.state = AggregatorState::Resolved;
                AggregatorStep::Resolved(result)
            }
            AuditEvent::Error(message) => {
                self.state = AggregatorState::Rejected;
                AggregatorStep::Rejected(AuditStreamError::server_reported(message))
            }
        }
    }

    /// 字节流正常结束
    ///
    /// 仍在 Streaming 时转为 Rejected（没有收到 `final`）。
    pub fn finish_stream(&mut self) -> Option<AggregatorStep> {
        if self.state != AggregatorState::Streaming {
            return None;
        }
        self.state = AggregatorState::Rejected;
        Some(AggregatorStep::Rejected(AuditStreamError::missing_final()))
    }

    /// 运行途中因传输错误失败
    pub fn fail(&mut self, error: AuditStreamError) -> Option<AggregatorStep> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = AggregatorState::Rejected;
        Some(AggregatorStep::Rejected(error))
    }
}

/// 把一个进度事件归约到草稿上
pub fn reduce_draft(mut draft: AuditResult, event: ProgressEvent, dedup_analyzer: &str) -> AuditResult {
    match event.update {
        ProgressUpdate::Tests { category, tests } => {
            let tests = filter_tests(category, event.analyzer.as_deref(), tests, dedup_analyzer);
            draft.append_tests(category, tests);
        }
        ProgressUpdate::BotAccess(statuses) => draft.replace_bot_access(statuses),
    }
    draft
}

/// 分类专属过滤规则
///
/// semanticStructure 分桶中来自去重分析器的 "Content Depth" 被丢弃，
/// 其余分桶不过滤。
fn filter_tests(
    category: AuditCategoryKey,
    analyzer: Option<&str>,
    tests: Vec<TestResult>,
    dedup_analyzer: &str,
) -> Vec<TestResult> {
    if category != AuditCategoryKey::SemanticStructure || analyzer != Some(dedup_analyzer) {
        return tests;
    }
    tests
        .into_iter()
        .filter(|t| t.name != CONTENT_DEPTH_TEST)
        .collect()
}
