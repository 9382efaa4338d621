//! 数据模型

pub mod audit;

pub use audit::{
    category_score, overall_score, AuditCategoryKey, AuditResult, BotAccessStatus,
    CategoryState, DetailedResults, FinalAuditResult, ScoreBreakdown, TestResult, TestStatus,
};
