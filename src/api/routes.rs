use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use super::context::request_context;
use super::handlers::{get_env, get_schema, get_variables, index, preview, validate, write};
use crate::core::EnvCenter;

/// 共享状态类型
pub type AppState = Arc<EnvCenter>;

/// 创建路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/env", get(get_env))
        .route("/api/schema", get(get_schema))
        .route("/api/variables", get(get_variables))
        .route("/api/validate", post(validate))
        .route("/api/preview", post(preview))
        .route("/api/write", post(write))
        .layer(middleware::from_fn_with_state(state.clone(), request_context))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::REQUEST_ID_HEADER;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ENVS: &str = r#"import { createEnv } from "@t3-oss/env-nextjs";
import { z } from "zod";

export const envs = createEnv({
  client: { NEXT_PUBLIC_URL: z.string().url() },
  server: { SECRET: z.string().min(8) },
  runtimeEnv: process.env,
});
"#;

    fn project(write_permission: bool) -> (TempDir, Router) {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("env-client.config.ts"),
            format!(
                "export default {{ envsPath: './src/env.ts', writePermission: {} }};",
                write_permission
            ),
        )
        .unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src").join("env.ts"), ENVS).unwrap();
        fs::write(tmp.path().join(".env"), "SECRET=short\nEXTRA=1\n").unwrap();
        fs::write(tmp.path().join(".env.production"), "EXTRA=prod\n").unwrap();

        let center = EnvCenter::new(tmp.path())
            .unwrap()
            .with_process_env(BTreeMap::new());
        (tmp, create_router(Arc::new(center)))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let (_tmp, router) = project(false);
        let response = router.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("<html"));
    }

    #[tokio::test]
    async fn test_env_endpoint() {
        let (_tmp, router) = project(false);
        let (status, body) = send(router, get("/api/env")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["envConfigData"]["envClientConfig"]["envsPath"], "./src/env.ts");
        assert_eq!(body["envVariablesData"]["variables"]["EXTRA"], "1");
        assert_eq!(body["variables"]["SECRET"], "short");
        assert_eq!(body["files"][".env"]["exists"], true);
        assert_eq!(body["projectPath"], body["envConfigData"]["projectPath"]);
    }

    #[tokio::test]
    async fn test_schema_endpoint() {
        let (_tmp, router) = project(false);
        let (status, body) = send(router, get("/api/schema")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert!(body["schema"]["client"]["NEXT_PUBLIC_URL"].is_object());
        assert!(body["schema"]["server"]["SECRET"].is_object());
    }

    #[tokio::test]
    async fn test_variables_endpoint_by_environment() {
        let (_tmp, router) = project(false);
        let (status, body) = send(router.clone(), get("/api/variables?environment=production")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["extraction"]["status"], "success");
        assert_eq!(body["variables"]["EXTRA"]["value"], "prod");
        assert_eq!(body["variables"]["EXTRA"]["required"], false);
        assert_eq!(body["variables"]["NEXT_PUBLIC_URL"]["group"], "client");
        assert_eq!(body["variables"]["NEXT_PUBLIC_URL"]["value"], "");

        let (_, dev) = send(router, get("/api/variables")).await;
        assert_eq!(dev["variables"]["EXTRA"]["value"], "1");
    }

    #[tokio::test]
    async fn test_validate_endpoint() {
        let (_tmp, router) = project(false);
        let (status, body) = send(
            router,
            post_json(
                "/api/validate",
                serde_json::json!({ "variables": { "NEXT_PUBLIC_URL": "nope", "SECRET": "long-enough" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let issues = body["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["path"][0], "NEXT_PUBLIC_URL");
        assert_eq!(issues[0]["message"], "Invalid url");
    }

    #[tokio::test]
    async fn test_preview_endpoint() {
        let (tmp, router) = project(false);
        let (status, body) = send(
            router,
            post_json(
                "/api/preview",
                serde_json::json!({ "variables": { "DB_HOST": "h", "DB_PORT": "1", "NODE_ENV": "x" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["content"],
            "# Environment Variables\n\n# Db\nDB_HOST=h\nDB_PORT=1\n"
        );
        assert!(!tmp.path().join(".env.local").exists());
    }

    #[tokio::test]
    async fn test_write_forbidden_without_permission() {
        let (tmp, router) = project(false);
        let (status, body) = send(
            router,
            post_json("/api/write", serde_json::json!({ "content": "A=1\n" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(
            body["error"],
            "Write permission is disabled in env-client.config.ts"
        );
        assert!(!tmp.path().join(".env.local").exists());
    }

    #[tokio::test]
    async fn test_write_variables() {
        let (tmp, router) = project(true);
        let (status, body) = send(
            router.clone(),
            post_json("/api/write", serde_json::json!({ "variables": { "SECRET": "s3cret value" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(
            fs::read_to_string(tmp.path().join(".env.local")).unwrap(),
            "# Environment Variables\n\nSECRET=\"s3cret value\"\n"
        );

        let (status, body) = send(router, post_json("/api/write", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
