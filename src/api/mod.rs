pub mod context;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::core::EnvCenter;
use crate::error::Result;

/// 在 localhost:<port> 上启动本地服务，直到进程退出
pub async fn serve(center: EnvCenter, port: u16) -> Result<()> {
    let project_dir = center.project_dir().display().to_string();
    let router = routes::create_router(Arc::new(center));
    let listener = tokio::net::TcpListener::bind(("localhost", port)).await?;
    tracing::info!("服务已启动: http://localhost:{}", port);
    tracing::info!("扫描目录: {}", project_dir);
    axum::serve(listener, router).await?;
    Ok(())
}
