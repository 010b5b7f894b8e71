use std::collections::BTreeMap;

use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use super::context::RequestContext;
use crate::core::LoadedVariables;
use crate::error::EnvClientError;
use crate::models::{
    EnvClientConfig, EnvConfigData, EnvFile, EnvVariablesData, Environment, ExtractionResult,
    Issue,
};
use crate::storage::dotenv;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

// ---- 请求 / 响应结构体 ----

#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentQuery {
    #[serde(default)]
    pub environment: Environment,
}

/// /api/env：新结构 + 平铺的旧字段
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvResponse {
    pub env_config_data: EnvConfigData,
    pub env_variables_data: EnvVariablesData,
    pub project_path: String,
    pub env_client_config: EnvClientConfig,
    pub files: BTreeMap<String, EnvFile>,
    pub variables: BTreeMap<String, String>,
    pub process_env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub issues: Vec<Issue>,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub content: Option<String>,
    pub variables: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---- EnvClientError -> HTTP Response ----

impl EnvClientError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EnvClientError::ProjectDirNotFound(_) => StatusCode::NOT_FOUND,
            EnvClientError::WritePermissionDenied => StatusCode::FORBIDDEN,
            EnvClientError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EnvClientError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

// ---- 处理器 ----

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api/env
pub async fn get_env(
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<EnvironmentQuery>,
) -> Json<EnvResponse> {
    let env_config_data = ctx.center.config_data();
    let env_variables_data = ctx.center.variables_data(query.environment);
    Json(EnvResponse {
        project_path: env_config_data.project_path.clone(),
        env_client_config: env_config_data.env_client_config.clone(),
        files: env_variables_data.files.clone(),
        variables: env_variables_data.variables.clone(),
        process_env: env_variables_data.process_env.clone(),
        env_config_data,
        env_variables_data,
    })
}

/// GET /api/schema
pub async fn get_schema(Extension(ctx): Extension<RequestContext>) -> Json<ExtractionResult> {
    Json(ctx.center.extract_schema(&ctx.config).await)
}

/// GET /api/variables?environment=development|production
pub async fn get_variables(
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<EnvironmentQuery>,
) -> Json<LoadedVariables> {
    Json(ctx.center.load_variables(&ctx.config, query.environment).await)
}

/// POST /api/validate
pub async fn validate(
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    let issues = ctx.center.validate(&ctx.config, &req.variables).await;
    Json(ValidateResponse { issues })
}

/// POST /api/preview：按写回格式生成文本，不落盘
pub async fn preview(Json(req): Json<ValidateRequest>) -> Json<PreviewResponse> {
    Json(PreviewResponse {
        content: dotenv::render(&req.variables),
    })
}

/// POST /api/write：`content` 原样写入，否则按 `variables` 生成
pub async fn write(
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<WriteRequest>,
) -> Response {
    let result = match (req.content, req.variables) {
        (Some(content), _) => ctx.center.write_env_file(&ctx.config, &content),
        (None, Some(variables)) => ctx.center.write_variables(&ctx.config, &variables),
        (None, None) => Err(EnvClientError::InvalidRequest(
            "expected `content` or `variables`".to_string(),
        )),
    };

    match result {
        Ok(path) => Json(WriteResponse {
            success: true,
            path: Some(path.display().to_string()),
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("写入失败 ({}): {}", ctx.request_id, e);
            let body = WriteResponse {
                success: false,
                path: None,
                error: Some(e.to_string()),
            };
            (e.status_code(), Json(body)).into_response()
        }
    }
}
