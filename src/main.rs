use anyhow::{bail, Context, Result};
use audit_stream_lib::config::{load_config, resolve_config_path, CONFIG_PATH_ENV};
use audit_stream_lib::streaming::{
    AuditOutcome, AuditSessionRegistry, AuditStreamClient, AuditStreamRequest, AuditUpdate,
};
use audit_stream_lib::telemetry::init_logging;
use clap::Parser;
use tracing::{info, warn};

/// 访问令牌环境变量
const TOKEN_ENV: &str = "AUDIT_STREAM_TOKEN";

#[derive(Parser)]
#[command(name = "audit-stream", about = "运行一次流式就绪度审计")]
struct Cli {
    /// 品牌 ID
    brand_id: String,

    /// 草稿中展示的域名
    #[arg(long, default_value = "")]
    domain: String,

    /// 配置文件路径
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<String>,

    /// 访问令牌
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.display()))?;
    init_logging(&config.logging);

    if cli.token.trim().is_empty() {
        bail!("{} 不能为空", TOKEN_ENV);
    }

    let client = AuditStreamClient::http(config.client.clone(), cli.token)?;
    let registry = AuditSessionRegistry::new();
    let session = registry.begin(&cli.brand_id);

    let interrupt = session.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，取消审计");
            interrupt.cancel();
        }
    });

    let request = AuditStreamRequest::new(cli.brand_id.clone(), cli.domain);
    let outcome = client
        .run_audit(&request, Some(session.token()), |update| match update {
            AuditUpdate::Progress(snapshot) => eprintln!(
                "[{}/{}] {} 总分 {}",
                snapshot.completed, snapshot.total, snapshot.bucket, snapshot.result.overall_score
            ),
            AuditUpdate::Final(_) => eprintln!("审计完成"),
        })
        .await;
    registry.finish(&session);

    match outcome? {
        AuditOutcome::Completed(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        AuditOutcome::Cancelled => info!(brand_id = %cli.brand_id, "审计已取消"),
    }
    Ok(())
}
