//! Mirai服务器主程序

use anyhow::{Context, Result};
use clap::Parser;
use mirai_admin::{init_logging, MiraiConfig};
use mirai_database::{DatabasePool, SqliteStudyRepository, StudyRepository};
use mirai_integration::{DispatchSettings, RemoteDispatcher};
use mirai_storage::{StorageLayout, StorageManager};
use mirai_web::{AppState, WebServer};
use mirai_workflow::{DocumentArchive, IngestionGateway, ReportComposer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Mirai服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "mirai-server")]
#[command(about = "Mirai 乳腺影像上传、分析转发与报告服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = MiraiConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging)?;
    info!("启动Mirai服务器...");

    // 存储目录
    let storage = StorageManager::new(StorageLayout {
        uploads: config.storage.uploads_dir.clone(),
        previews: config.storage.previews_dir.clone(),
        archives: config.storage.archives_dir.clone(),
        reports: config.storage.reports_dir.clone(),
    });
    storage
        .ensure_layout()
        .await
        .context("Failed to create storage directories")?;

    // 数据库
    let pool = DatabasePool::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database: {}", config.database.url))?;
    let repository = SqliteStudyRepository::new(pool);
    repository
        .create_tables()
        .await
        .context("Failed to create database tables")?;
    let repository: Arc<dyn StudyRepository> = Arc::new(repository);

    let settings = DispatchSettings {
        endpoint: config.dispatch.endpoint.clone(),
        batch_size: config.dispatch.batch_size,
        connect_timeout: config.dispatch.connect_timeout(),
        request_timeout: config.dispatch.request_timeout(),
        max_retries: config.dispatch.max_retries,
        retry_backoff: config.dispatch.retry_backoff(),
    };

    let state = AppState {
        ingestion: IngestionGateway::new(storage.clone()),
        archive: DocumentArchive::new(storage.clone(), repository.clone()),
        composer: ReportComposer::new(storage.clone(), repository),
        dispatcher: RemoteDispatcher::new(storage.clone(), settings)?,
        storage,
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address: {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("Mirai服务器配置:");
    info!("  监听地址: {}", addr);
    info!("  数据库: {}", config.database.url);
    info!("  分析服务: {}", config.dispatch.endpoint);

    if let Err(e) = WebServer::new(addr, state, config.server.max_body_bytes).run().await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
