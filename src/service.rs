//! HTTP facade: `POST /run?task=…` and `GET /read?path=…`.

use std::io;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::{Dispatcher, ErrorKind, OperationResult};
use crate::sandbox::AccessIntent;

#[derive(Debug, Deserialize)]
pub struct RunParams {
    pub task: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub path: Option<String>,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/run", post(run_task))
        .route("/read", get(read_file))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn error_response(status: StatusCode, kind: ErrorKind, detail: impl Into<String>) -> Response {
    (status, Json(OperationResult::error(kind, detail))).into_response()
}

pub async fn run_task(
    State(dispatcher): State<Arc<Dispatcher>>,
    Query(params): Query<RunParams>,
) -> Response {
    let Some(task) = params.task.filter(|t| !t.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::InvalidArguments,
            "missing `task` query parameter",
        );
    };

    let result = dispatcher.execute(&task).await;
    let status = match result.error_kind() {
        None => StatusCode::OK,
        Some(kind) => status_for(kind),
    };
    (status, Json(result)).into_response()
}

pub async fn read_file(
    State(dispatcher): State<Arc<Dispatcher>>,
    Query(params): Query<ReadParams>,
) -> Response {
    let Some(raw) = params.path.filter(|p| !p.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::InvalidArguments,
            "missing `path` query parameter",
        );
    };

    let path = match dispatcher.guard().validate(&raw, AccessIntent::Read) {
        Ok(path) => path,
        Err(denied) => {
            return error_response(
                StatusCode::FORBIDDEN,
                ErrorKind::AccessDenied,
                denied.to_string(),
            )
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            info!("Serving {} ({} bytes)", path.display(), bytes.len());
            let content_type = if std::str::from_utf8(&bytes).is_ok() {
                "text/plain; charset=utf-8"
            } else {
                "application/octet-stream"
            };
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Read of missing file {}", path.display());
            error_response(
                StatusCode::NOT_FOUND,
                ErrorKind::NotFound,
                format!("file not found: {raw}"),
            )
        }
        Err(e) => {
            error!("Cannot read {}: {e}", path.display());
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::HandlerFailure,
                format!("cannot read {raw}: {e}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InstructionPlanner;
    use crate::llm::scripted::ScriptedLlm;
    use crate::operations::{builtin, testing, OperationRegistry};
    use serde_json::Value;
    use std::time::Duration;

    fn dispatcher(root: &std::path::Path, reply: &str) -> Arc<Dispatcher> {
        let mut registry = OperationRegistry::new();
        for op in builtin::all() {
            registry.register(op).unwrap();
        }
        let planner = InstructionPlanner::new(
            Arc::new(ScriptedLlm::text(reply)),
            &registry,
            Duration::from_secs(5),
        );
        let context = Arc::new(testing::context(root));
        Arc::new(Dispatcher::new(planner, Arc::new(registry), context))
    }

    async fn body(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn json_body(response: Response) -> Value {
        serde_json::from_slice(&body(response).await).unwrap()
    }

    fn run_params(task: &str) -> Query<RunParams> {
        Query(RunParams {
            task: Some(task.to_string()),
        })
    }

    fn read_params(path: &str) -> Query<ReadParams> {
        Query(ReadParams {
            path: Some(path.to_string()),
        })
    }

    #[tokio::test]
    async fn test_run_success_is_200() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dates.txt"), "2024-01-03\n").unwrap();
        let d = dispatcher(dir.path(), r#"{"operation": "count_weekday"}"#);

        let response = run_task(State(d), run_params("count wednesdays")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["operation"], "count_weekday");
    }

    #[tokio::test]
    async fn test_run_access_denied_is_403() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            dir.path(),
            r#"{"operation": "count_weekday", "arguments": {"input": "/etc/passwd"}}"#,
        );

        let response = run_task(State(d), run_params("count wednesdays in /etc/passwd")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "access_denied");
    }

    #[tokio::test]
    async fn test_run_other_errors_are_400() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), r#"{"operation": "unsupported"}"#);

        let response = run_task(State(d.clone()), run_params("make coffee")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "unknown_operation");

        let response = run_task(State(d), Query(RunParams { task: None })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "invalid_arguments");
    }

    #[tokio::test]
    async fn test_read_text_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "42").unwrap();
        let d = dispatcher(dir.path(), "{}");

        let response = read_file(State(d), read_params("out.txt")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body(response).await, b"42");
    }

    #[tokio::test]
    async fn test_read_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xffu8, 0xfe, 0x00]).unwrap();
        let d = dispatcher(dir.path(), "{}");

        let response = read_file(State(d), read_params("blob.bin")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body(response).await, vec![0xffu8, 0xfe, 0x00]);
    }

    #[tokio::test]
    async fn test_read_missing_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), "{}");

        let response = read_file(State(d), read_params("nope.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_read_outside_workspace_is_403() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), "{}");

        for path in ["../secret.txt", "/etc/passwd", "a/../../b"] {
            let response = read_file(State(d.clone()), read_params(path)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
            assert_eq!(json_body(response).await["kind"], "access_denied");
        }
    }

    #[tokio::test]
    async fn test_read_directory_is_500() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let d = dispatcher(dir.path(), "{}");

        let response = read_file(State(d), read_params("sub")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["kind"], "handler_failure");
    }
}
