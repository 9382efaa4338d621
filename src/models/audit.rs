//! 审计结果数据模型
//!
//! 定义就绪度审计的分类、测试结果以及加权评分规则。
//! 服务端通过流式事件发送的 JSON 与这些类型一一对应（camelCase 字段）。

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 参与加权评分的五个审计分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditCategoryKey {
    TechnicalCrawlability,
    ContentQuality,
    SemanticStructure,
    AccessibilityAndBrand,
    AeoOptimization,
}

impl AuditCategoryKey {
    /// 全部分类，顺序即评分表的展示顺序
    pub const ALL: [AuditCategoryKey; 5] = [
        AuditCategoryKey::TechnicalCrawlability,
        AuditCategoryKey::ContentQuality,
        AuditCategoryKey::SemanticStructure,
        AuditCategoryKey::AccessibilityAndBrand,
        AuditCategoryKey::AeoOptimization,
    ];

    /// 分类权重，五项之和为 1.0
    pub fn weight(&self) -> f64 {
        match self {
            AuditCategoryKey::TechnicalCrawlability => 0.20,
            AuditCategoryKey::ContentQuality => 0.30,
            AuditCategoryKey::SemanticStructure => 0.25,
            AuditCategoryKey::AccessibilityAndBrand => 0.15,
            AuditCategoryKey::AeoOptimization => 0.10,
        }
    }

    /// 线上协议中使用的标识
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategoryKey::TechnicalCrawlability => "technicalCrawlability",
            AuditCategoryKey::ContentQuality => "contentQuality",
            AuditCategoryKey::SemanticStructure => "semanticStructure",
            AuditCategoryKey::AccessibilityAndBrand => "accessibilityAndBrand",
            AuditCategoryKey::AeoOptimization => "aeoOptimization",
        }
    }
}

impl fmt::Display for AuditCategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单项测试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Warning,
    Info,
    /// 服务端新增但客户端尚未识别的状态
    #[serde(other)]
    Unknown,
}

/// 单项测试结果
///
/// 由服务端产生，接收后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    /// 0..=100
    pub score: f64,
    #[serde(default)]
    pub message: String,
    /// 服务端附带的其他字段（如 `details`），原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestResult {
    pub fn new(name: impl Into<String>, status: TestStatus, score: f64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            score,
            message: message.into(),
            extra: Map::new(),
        }
    }
}

/// 单个分类的状态
///
/// `score` 始终等于 `tests` 分数均值四舍五入；没有测试时为 0。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryState {
    pub score: f64,
    pub tests: Vec<TestResult>,
}

impl CategoryState {
    /// 按到达顺序追加测试并重新计算分数
    pub fn append_tests<I>(&mut self, tests: I)
    where
        I: IntoIterator<Item = TestResult>,
    {
        self.tests.extend(tests);
        self.score = category_score(&self.tests);
    }
}

/// 爬虫访问状态
///
/// 不参与加权评分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotAccessStatus {
    pub bot_name: String,
    pub allowed: bool,
    /// 数字或数字字符串；其他形式视为缺失
    #[serde(default, deserialize_with = "lenient_http_status")]
    pub http_status: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_http_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// 五个分类的分数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub technical_crawlability: f64,
    pub content_quality: f64,
    pub semantic_structure: f64,
    pub accessibility_and_brand: f64,
    pub aeo_optimization: f64,
}

impl ScoreBreakdown {
    pub fn get(&self, key: AuditCategoryKey) -> f64 {
        match key {
            AuditCategoryKey::TechnicalCrawlability => self.technical_crawlability,
            AuditCategoryKey::ContentQuality => self.content_quality,
            AuditCategoryKey::SemanticStructure => self.semantic_structure,
            AuditCategoryKey::AccessibilityAndBrand => self.accessibility_and_brand,
            AuditCategoryKey::AeoOptimization => self.aeo_optimization,
        }
    }

    pub fn set(&mut self, key: AuditCategoryKey, score: f64) {
        let slot = match key {
            AuditCategoryKey::TechnicalCrawlability => &mut self.technical_crawlability,
            AuditCategoryKey::ContentQuality => &mut self.content_quality,
            AuditCategoryKey::SemanticStructure => &mut self.semantic_structure,
            AuditCategoryKey::AccessibilityAndBrand => &mut self.accessibility_and_brand,
            AuditCategoryKey::AeoOptimization => &mut self.aeo_optimization,
        };
        *slot = score;
    }
}

/// 五个分类的明细
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetailedResults {
    pub technical_crawlability: CategoryState,
    pub content_quality: CategoryState,
    pub semantic_structure: CategoryState,
    pub accessibility_and_brand: CategoryState,
    pub aeo_optimization: CategoryState,
}

impl DetailedResults {
    pub fn get(&self, key: AuditCategoryKey) -> &CategoryState {
        match key {
            AuditCategoryKey::TechnicalCrawlability => &self.technical_crawlability,
            AuditCategoryKey::ContentQuality => &self.content_quality,
            AuditCategoryKey::SemanticStructure => &self.semantic_structure,
            AuditCategoryKey::AccessibilityAndBrand => &self.accessibility_and_brand,
            AuditCategoryKey::AeoOptimization => &self.aeo_optimization,
        }
    }

    pub fn get_mut(&mut self, key: AuditCategoryKey) -> &mut CategoryState {
        match key {
            AuditCategoryKey::TechnicalCrawlability => &mut self.technical_crawlability,
            AuditCategoryKey::ContentQuality => &mut self.content_quality,
            AuditCategoryKey::SemanticStructure => &mut self.semantic_structure,
            AuditCategoryKey::AccessibilityAndBrand => &mut self.accessibility_and_brand,
            AuditCategoryKey::AeoOptimization => &mut self.aeo_optimization,
        }
    }
}

/// 审计结果（聚合根）
///
/// 运行开始时创建为全零草稿，之后只通过按顺序应用事件来修改，
/// 最终被服务端的 `final` 结果整体替换。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditResult {
    pub brand_id: String,
    pub domain: String,
    pub timestamp: String,
    pub overall_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub detailed_results: DetailedResults,
    pub bot_access_status: Vec<BotAccessStatus>,
    /// 服务端附带的其他字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditResult {
    /// 创建空草稿
    pub fn draft(brand_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            domain: domain.into(),
            timestamp: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    /// 向分类追加测试并刷新该分类分数与总分
    pub fn append_tests<I>(&mut self, key: AuditCategoryKey, tests: I)
    where
        I: IntoIterator<Item = TestResult>,
    {
        let category = self.detailed_results.get_mut(key);
        category.append_tests(tests);
        let score = category.score;
        self.score_breakdown.set(key, score);
        self.overall_score = overall_score(&self.score_breakdown);
    }

    /// 整体替换爬虫访问状态（后写覆盖）
    pub fn replace_bot_access(&mut self, statuses: Vec<BotAccessStatus>) {
        self.bot_access_status = statuses;
    }

    /// 由明细重新计算所有派生分数
    pub fn recompute_scores(&mut self) {
        for key in AuditCategoryKey::ALL {
            let category = self.detailed_results.get_mut(key);
            category.score = category_score(&category.tests);
            let score = category.score;
            self.score_breakdown.set(key, score);
        }
        self.overall_score = overall_score(&self.score_breakdown);
    }
}

/// 服务端 `final` 事件携带的最终结果
///
/// 保存原始 JSON 对象，序列化时原样输出（整数不会变成浮点数，
/// 未识别的嵌套字段也不会丢失）。类型化视图按需宽松解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalAuditResult(Map<String, Value>);

impl FinalAuditResult {
    /// 只接受 JSON 对象
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn brand_id(&self) -> Option<&str> {
        self.0.get("brandId").and_then(Value::as_str)
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.0.get("overallScore").and_then(Value::as_f64)
    }

    /// 类型化视图；字段类型不符时返回 None，不影响原始结果
    pub fn to_audit_result(&self) -> Option<AuditResult> {
        serde_json::from_value(Value::Object(self.0.clone())).ok()
    }
}

/// 分类分数：测试分数均值四舍五入，空列表为 0
pub fn category_score(tests: &[TestResult]) -> f64 {
    if tests.is_empty() {
        return 0.0;
    }
    let sum: f64 = tests.iter().map(|t| t.score).sum();
    (sum / tests.len() as f64).round()
}

/// 总分：五个分类分数按权重求和后四舍五入
pub fn overall_score(breakdown: &ScoreBreakdown) -> f64 {
    AuditCategoryKey::ALL
        .iter()
        .map(|key| breakdown.get(*key) * key.weight())
        .sum::<f64>()
        .round()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(name: &str, score: f64) -> TestResult {
        TestResult::new(name, TestStatus::Pass, score, "")
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = AuditCategoryKey::ALL.iter().map(|k| k.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_score_empty_is_zero() {
        assert_eq!(category_score(&[]), 0.0);
    }

    #[test]
    fn test_category_score_rounds_mean() {
        let tests = vec![test("a", 80.0), test("b", 71.0)];
        assert_eq!(category_score(&tests), 76.0);
        let tests = vec![test("a", 80.0), test("b", 70.0), test("c", 70.0)];
        assert_eq!(category_score(&tests), 73.0);
    }

    #[test]
    fn test_append_tests_updates_overall() {
        let mut result = AuditResult::draft("brand-1", "example.com");
        result.append_tests(AuditCategoryKey::TechnicalCrawlability, vec![test("T1", 80.0)]);

        assert_eq!(result.detailed_results.technical_crawlability.score, 80.0);
        assert_eq!(result.score_breakdown.technical_crawlability, 80.0);
        assert_eq!(result.overall_score, 16.0);

        result.append_tests(AuditCategoryKey::ContentQuality, vec![test("C1", 90.0)]);
        // 80 * 0.2 + 90 * 0.3 = 43
        assert_eq!(result.overall_score, 43.0);
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut state = CategoryState::default();
        state.append_tests(vec![test("first", 10.0)]);
        state.append_tests(vec![test("second", 20.0), test("third", 30.0)]);
        let names: Vec<_> = state.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(state.score, 20.0);
    }

    #[test]
    fn test_recompute_scores_matches_incremental() {
        let mut result = AuditResult::draft("b", "d");
        result.append_tests(AuditCategoryKey::SemanticStructure, vec![test("s", 55.0)]);
        result.append_tests(AuditCategoryKey::AeoOptimization, vec![test("a", 99.0)]);
        let mut recomputed = result.clone();
        recomputed.recompute_scores();
        assert_eq!(result, recomputed);
    }

    #[test]
    fn test_audit_result_deserialize_camel_case() {
        let json = serde_json::json!({
            "brandId": "b1",
            "domain": "example.com",
            "timestamp": "2024-01-01T00:00:00Z",
            "overallScore": 72,
            "scoreBreakdown": {"technicalCrawlability": 80, "contentQuality": 70},
            "detailedResults": {
                "technicalCrawlability": {
                    "score": 80,
                    "tests": [{"name": "T1", "status": "pass", "score": 80, "message": "ok"}]
                }
            },
            "botAccessStatus": [
                {"botName": "GPTBot", "allowed": false, "httpStatus": 403, "message": "blocked"}
            ],
            "reportVersion": 3
        });
        let result: AuditResult = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(result.brand_id, "b1");
        assert_eq!(result.score_breakdown.content_quality, 70.0);
        assert_eq!(result.score_breakdown.aeo_optimization, 0.0);
        assert_eq!(result.detailed_results.technical_crawlability.tests.len(), 1);
        assert_eq!(result.bot_access_status[0].http_status, Some(403));
        assert_eq!(result.extra.get("reportVersion"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_final_result_is_verbatim() {
        let wire = r#"{"brandId":"b1","overallScore":74,"detailedResults":{"contentQuality":{"score":60,"tests":[{"name":"C1","status":"pass","score":60,"message":"","details":{"words":812}}]}},"botAccessStatus":[{"botName":"GPTBot","allowed":true,"httpStatus":"200","message":"","userAgent":"GPTBot/1.0"}]}"#;
        let value: Value = serde_json::from_str(wire).unwrap();
        let result = FinalAuditResult::from_value(value.clone()).unwrap();

        assert_eq!(serde_json::to_value(&result).unwrap(), value);
        assert_eq!(serde_json::to_string(&result).unwrap(), serde_json::to_string(&value).unwrap());
        assert_eq!(result.brand_id(), Some("b1"));
        assert_eq!(result.overall_score(), Some(74.0));

        let typed = result.to_audit_result().unwrap();
        let first = &typed.detailed_results.content_quality.tests[0];
        assert_eq!(first.extra.get("details"), Some(&serde_json::json!({"words": 812})));
        let bot = &typed.bot_access_status[0];
        assert_eq!(bot.http_status, Some(200));
        assert_eq!(bot.extra.get("userAgent"), Some(&serde_json::json!("GPTBot/1.0")));

        assert!(FinalAuditResult::from_value(serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn test_lenient_http_status() {
        let parse = |status: &str| -> Option<u16> {
            let json = format!(r#"{{"botName":"b","allowed":true,"httpStatus":{}}}"#, status);
            serde_json::from_str::<BotAccessStatus>(&json).unwrap().http_status
        };
        assert_eq!(parse("403"), Some(403));
        assert_eq!(parse(r#"" 404 ""#), Some(404));
        assert_eq!(parse(r#""n/a""#), None);
        assert_eq!(parse("null"), None);
        assert_eq!(parse("70000"), None);
    }

    #[test]
    fn test_unknown_test_status() {
        let t: TestResult =
            serde_json::from_str(r#"{"name":"x","status":"skipped","score":0}"#).unwrap();
        assert_eq!(t.status, TestStatus::Unknown);
        assert_eq!(t.message, "");
    }

    #[test]
    fn test_category_key_serde_names() {
        for key in AuditCategoryKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }
}
