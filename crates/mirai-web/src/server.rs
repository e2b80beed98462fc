//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use mirai_core::{MiraiError, Result};
use mirai_integration::RemoteDispatcher;
use mirai_storage::{StorageArea, StorageManager};
use mirai_workflow::{DocumentArchive, IngestionGateway, ReportComposer};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    generate_report_pdf, health, list_studies, process_recent_dicoms, upload_dicoms, upload_pdfs,
};

/// 请求体默认上限 150 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 150 * 1024 * 1024;

/// 处理器共享的组件
#[derive(Debug, Clone)]
pub struct AppState {
    pub storage: StorageManager,
    pub ingestion: IngestionGateway,
    pub archive: DocumentArchive,
    pub composer: ReportComposer,
    pub dispatcher: RemoteDispatcher,
}

pub type SharedState = Arc<AppState>;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, max_body_bytes: usize) -> Self {
        let app = create_app(Arc::new(state), max_body_bytes);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| MiraiError::Internal(format!("Failed to start web server: {}", e)))?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: SharedState, max_body_bytes: usize) -> Router {
    let layout = state.storage.layout().clone();

    Router::new()
        // 健康检查
        .route("/health", get(health))
        // 业务接口
        .route("/upload", post(upload_dicoms))
        .route("/upload_pdf", post(upload_pdfs))
        .route("/generate_report_pdf", post(generate_report_pdf))
        .route("/process_recent_dicoms", post(process_recent_dicoms))
        .route("/studies", get(list_studies))
        .with_state(state)
        // 文件访问
        .nest_service("/previews", ServeDir::new(layout.dir(StorageArea::Previews)))
        .nest_service("/uploads", ServeDir::new(layout.dir(StorageArea::Uploads)))
        .nest_service("/static/reports", ServeDir::new(layout.dir(StorageArea::Reports)))
        // 全局中间件
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}
