use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::core::EnvCenter;
use crate::models::ProjectConfig;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 单个请求的上下文：项目配置在这里读取一次，之后整个请求只用这一份
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub center: Arc<EnvCenter>,
    pub config: Arc<ProjectConfig>,
}

/// 构建请求上下文并挂到 request extensions 上
pub async fn request_context(
    State(center): State<Arc<EnvCenter>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    tracing::debug!(
        "请求 {} {} ({})",
        request.method(),
        request.uri().path(),
        request_id
    );

    // 只有 API 请求需要读取项目配置
    let config = if request.uri().path().starts_with("/api/") {
        center.project_config()
    } else {
        ProjectConfig::new(center.project_dir())
    };

    request.extensions_mut().insert(RequestContext {
        request_id,
        config: Arc::new(config),
        center,
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
