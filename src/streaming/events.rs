//! 审计流事件
//!
//! 每行一个 JSON 文档，通过 `type` 字段区分 `progress` / `final` / `error`。
//! 未知类型、缺少字段或分桶不合法的行一律视为格式错误，由解码器丢弃。

use crate::models::{AuditCategoryKey, BotAccessStatus, FinalAuditResult, TestResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 进度事件所属的分桶：五个加权分类加上不计分的爬虫访问
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressBucket {
    TechnicalCrawlability,
    ContentQuality,
    SemanticStructure,
    AccessibilityAndBrand,
    AeoOptimization,
    BotAccess,
}

impl ProgressBucket {
    /// 对应的加权分类；爬虫访问返回 None
    pub fn category(&self) -> Option<AuditCategoryKey> {
        match self {
            ProgressBucket::TechnicalCrawlability => Some(AuditCategoryKey::TechnicalCrawlability),
            ProgressBucket::ContentQuality => Some(AuditCategoryKey::ContentQuality),
            ProgressBucket::SemanticStructure => Some(AuditCategoryKey::SemanticStructure),
            ProgressBucket::AccessibilityAndBrand => Some(AuditCategoryKey::AccessibilityAndBrand),
            ProgressBucket::AeoOptimization => Some(AuditCategoryKey::AeoOptimization),
            ProgressBucket::BotAccess => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressBucket::BotAccess => "botAccess",
            other => other.category().map(|k| k.as_str()).unwrap_or_default(),
        }
    }
}

impl From<AuditCategoryKey> for ProgressBucket {
    fn from(key: AuditCategoryKey) -> Self {
        match key {
            AuditCategoryKey::TechnicalCrawlability => ProgressBucket::TechnicalCrawlability,
            AuditCategoryKey::ContentQuality => ProgressBucket::ContentQuality,
            AuditCategoryKey::SemanticStructure => ProgressBucket::SemanticStructure,
            AuditCategoryKey::AccessibilityAndBrand => ProgressBucket::AccessibilityAndBrand,
            AuditCategoryKey::AeoOptimization => ProgressBucket::AeoOptimization,
        }
    }
}

impl fmt::Display for ProgressBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进度事件携带的增量
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// 追加到某个加权分类的测试
    Tests {
        category: AuditCategoryKey,
        tests: Vec<TestResult>,
    },
    /// 爬虫访问状态的完整替换列表
    BotAccess(Vec<BotAccessStatus>),
}

/// 进度事件
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// 产生该事件的服务端分析器
    pub analyzer: Option<String>,
    pub update: ProgressUpdate,
    /// 服务端报告的全局完成数
    pub completed: u32,
    /// 服务端报告的全局总数
    pub total: u32,
}

impl ProgressEvent {
    pub fn bucket(&self) -> ProgressBucket {
        match &self.update {
            ProgressUpdate::Tests { category, .. } => (*category).into(),
            ProgressUpdate::BotAccess(_) => ProgressBucket::BotAccess,
        }
    }
}

/// 解码后的审计事件
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Progress(ProgressEvent),
    /// 服务端的最终结果，原样保留
    Final(FinalAuditResult),
    Error(String),
}

impl AuditEvent {
    /// 解析一行 JSON
    ///
    /// 任何不符合三种事件形状的文档都返回 None。
    pub fn parse_line(line: &str) -> Option<AuditEvent> {
        let wire: WireEvent = serde_json::from_str(line).ok()?;
        wire.into_event()
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::Progress(_) => "progress",
            AuditEvent::Final(_) => "final",
            AuditEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Progress(WireProgress),
    Final { result: FinalAuditResult },
    Error { error: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProgress {
    #[serde(default)]
    analyzer: Option<String>,
    bucket: ProgressBucket,
    #[serde(default)]
    tests: Option<Vec<TestResult>>,
    #[serde(default)]
    bot_access_status: Option<Vec<BotAccessStatus>>,
    #[serde(default)]
    completed: u32,
    #[serde(default)]
    total: u32,
}

impl WireEvent {
    fn into_event(self) -> Option<AuditEvent> {
        match self {
            WireEvent::Progress(progress) => {
                let update = match progress.bucket.category() {
                    Some(category) => ProgressUpdate::Tests {
                        category,
                        tests: progress.tests?,
                    },
                    None => ProgressUpdate::BotAccess(progress.bot_access_status?),
                };
                Some(AuditEvent::Progress(ProgressEvent {
                    analyzer: progress.analyzer,
                    update,
                    completed: progress.completed,
                    total: progress.total,
                }))
            }
            WireEvent::Final { result } => Some(AuditEvent::Final(result)),
            WireEvent::Error { error } => Some(AuditEvent::Error(error)),
        }
    }
}
