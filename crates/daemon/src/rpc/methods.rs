use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use folio_common::error::EditError;
use folio_common::protocol::jsonrpc::{
    Request, RequestId, Response, RpcError, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use folio_common::protocol::rpc_methods;
use folio_common::types::VersionSummary;

use crate::service::DocumentEditingService;

#[derive(Clone)]
pub struct RpcServerState {
    service: Arc<DocumentEditingService>,
    shutdown_notifier: Option<broadcast::Sender<()>>,
}

impl RpcServerState {
    pub fn new(service: Arc<DocumentEditingService>) -> Self {
        Self { service, shutdown_notifier: None }
    }

    pub fn with_shutdown_notifier(mut self, notifier: broadcast::Sender<()>) -> Self {
        self.shutdown_notifier = Some(notifier);
        self
    }

    pub fn service(&self) -> &DocumentEditingService {
        &self.service
    }
}

pub async fn handle_raw_request(raw: &[u8], state: &RpcServerState) -> Response {
    let request = match serde_json::from_slice::<Request>(raw) {
        Ok(request) => request,
        Err(error) => {
            return Response::error(
                RequestId::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({ "reason": error.to_string() })),
                },
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return Response::error(
            request.id,
            RpcError { code: INVALID_REQUEST, message: "Invalid Request".to_string(), data: None },
        );
    }

    dispatch_request(request, state).await
}

pub async fn dispatch_request(request: Request, state: &RpcServerState) -> Response {
    match request.method.as_str() {
        rpc_methods::RPC_PING => Response::success(
            request.id,
            json!({
                "ok": true,
            }),
        ),
        rpc_methods::DAEMON_SHUTDOWN => {
            if let Some(notifier) = &state.shutdown_notifier {
                let _ = notifier.send(());
            }
            Response::success(
                request.id,
                json!({
                    "ok": true,
                }),
            )
        }
        rpc_methods::LOCK_ACQUIRE => handle_lock_acquire(request, state),
        rpc_methods::LOCK_RELEASE => handle_lock_release(request, state),
        rpc_methods::LOCK_STATUS => handle_lock_status(request, state),
        rpc_methods::DOC_SAVE => handle_doc_save(request, state),
        rpc_methods::VERSION_LIST => handle_version_list(request, state),
        rpc_methods::VERSION_CONTENT => handle_version_content(request, state),
        rpc_methods::VERSION_TAG => handle_version_tag(request, state),
        rpc_methods::VERSION_ROLLBACK => handle_version_rollback(request, state),
        rpc_methods::VERSION_DIFF => handle_version_diff(request, state),
        _ => Response::error(
            request.id,
            RpcError {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: None,
            },
        ),
    }
}

// ── Lease methods ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LockHolderParams {
    doc_id: Uuid,
    holder_id: String,
}

#[derive(Debug, Deserialize)]
struct LockStatusParams {
    doc_id: Uuid,
}

fn handle_lock_acquire(request: Request, state: &RpcServerState) -> Response {
    let params: LockHolderParams =
        match parse_params(rpc_methods::LOCK_ACQUIRE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.acquire_lock(params.doc_id, &params.holder_id, Utc::now()) {
        Ok(lease) => Response::success(request.id, json!({ "lease": lease })),
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_lock_release(request: Request, state: &RpcServerState) -> Response {
    let params: LockHolderParams =
        match parse_params(rpc_methods::LOCK_RELEASE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.release_lock(params.doc_id, &params.holder_id, Utc::now()) {
        Ok(()) => Response::success(request.id, json!({ "released": true })),
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_lock_status(request: Request, state: &RpcServerState) -> Response {
    let params: LockStatusParams =
        match parse_params(rpc_methods::LOCK_STATUS, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.lock_status(params.doc_id, Utc::now()) {
        Ok(status) => Response::success(request.id, json!(status)),
        Err(error) => edit_error_response(request.id, &error),
    }
}

// ── Document content ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DocSaveParams {
    doc_id: Uuid,
    holder_id: String,
    content: String,
    message: String,
}

fn handle_doc_save(request: Request, state: &RpcServerState) -> Response {
    let params: DocSaveParams =
        match parse_params(rpc_methods::DOC_SAVE, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.save(
        params.doc_id,
        &params.holder_id,
        &params.content,
        &params.message,
        Utc::now(),
    ) {
        Ok(version) => {
            Response::success(request.id, json!({ "version": VersionSummary::from(version) }))
        }
        Err(error) => edit_error_response(request.id, &error),
    }
}

// ── Version chain ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VersionListParams {
    doc_id: Uuid,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VersionRefParams {
    doc_id: Uuid,
    version_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct VersionTagParams {
    doc_id: Uuid,
    version_id: Uuid,
    tag: String,
}

#[derive(Debug, Deserialize)]
struct VersionRollbackParams {
    doc_id: Uuid,
    version_id: Uuid,
    author_id: String,
}

#[derive(Debug, Deserialize)]
struct VersionDiffParams {
    doc_id: Uuid,
    version_a: Uuid,
    version_b: Uuid,
}

fn handle_version_list(request: Request, state: &RpcServerState) -> Response {
    let params: VersionListParams =
        match parse_params(rpc_methods::VERSION_LIST, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.list_versions(
        params.doc_id,
        params.page.unwrap_or(0),
        params.limit.unwrap_or(0),
    ) {
        Ok(page) => Response::success(request.id, json!(page)),
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_version_content(request: Request, state: &RpcServerState) -> Response {
    let params: VersionRefParams =
        match parse_params(rpc_methods::VERSION_CONTENT, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.get_version_content(params.doc_id, params.version_id) {
        Ok(content) => Response::success(request.id, json!({ "content": content })),
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_version_tag(request: Request, state: &RpcServerState) -> Response {
    let params: VersionTagParams =
        match parse_params(rpc_methods::VERSION_TAG, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.tag_version(params.doc_id, params.version_id, &params.tag) {
        Ok(()) => Response::success(request.id, json!({ "tagged": true })),
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_version_rollback(request: Request, state: &RpcServerState) -> Response {
    let params: VersionRollbackParams =
        match parse_params(rpc_methods::VERSION_ROLLBACK, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.rollback(params.doc_id, params.version_id, &params.author_id, Utc::now())
    {
        Ok(version) => {
            Response::success(request.id, json!({ "version": VersionSummary::from(version) }))
        }
        Err(error) => edit_error_response(request.id, &error),
    }
}

fn handle_version_diff(request: Request, state: &RpcServerState) -> Response {
    let params: VersionDiffParams =
        match parse_params(rpc_methods::VERSION_DIFF, request.params, request.id.clone()) {
            Ok(params) => params,
            Err(response) => return response,
        };

    match state.service.diff(params.doc_id, params.version_a, params.version_b) {
        Ok(entries) => Response::success(request.id, json!({ "entries": entries })),
        Err(error) => edit_error_response(request.id, &error),
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

fn parse_params<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<serde_json::Value>,
    request_id: RequestId,
) -> Result<T, Response> {
    let Some(params) = params else {
        return Err(invalid_params_response(request_id, format!("{method} requires params")));
    };

    serde_json::from_value::<T>(params).map_err(|error| {
        invalid_params_response(request_id, format!("failed to decode {method} params: {error}"))
    })
}

fn invalid_params_response(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(json!({ "reason": reason })),
        },
    )
}

fn edit_error_response(request_id: RequestId, error: &EditError) -> Response {
    Response::error(
        request_id,
        RpcError { code: error.code(), message: error.to_string(), data: Some(error.data()) },
    )
}
