// End-to-end editing flow over the Unix socket transport:
// lock, save, list, diff, tag, rollback, release.

#![cfg(unix)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use uuid::Uuid;

use folio_common::protocol::jsonrpc::{Request, RequestId, Response};
use folio_daemon::config::GlobalConfig;
use folio_daemon::lock::LockManager;
use folio_daemon::rpc::methods::RpcServerState;
use folio_daemon::rpc::unix::serve_unix;
use folio_daemon::service::DocumentEditingService;
use folio_daemon::store::blobs::BlobStore;
use folio_daemon::store::meta_db::MetaDb;

struct TestDaemon {
    socket_path: PathBuf,
    server: tokio::task::JoinHandle<()>,
    _state_dir: TempDir,
}

impl TestDaemon {
    async fn start() -> Option<Self> {
        let state_dir = tempdir().expect("tempdir should be created");
        let config = GlobalConfig::default();
        let meta_db =
            MetaDb::open(state_dir.path().join("meta.db")).expect("meta db should open");
        let blobs = BlobStore::new(state_dir.path()).expect("blob store should open");
        let locks = LockManager::new(meta_db.connection(), chrono::Utc::now())
            .expect("lock manager should load");
        let service = Arc::new(DocumentEditingService::new(meta_db, blobs, locks, &config));
        let state = RpcServerState::new(service);

        let socket_path = unique_socket_path("editing-flow");
        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
                eprintln!("skipping unix socket test: bind is not permitted in this environment");
                return None;
            }
            Err(error) => panic!("failed to bind unix socket: {error}"),
        };

        let server = tokio::spawn(async move {
            let _ = serve_unix(listener, state).await;
        });

        Some(Self { socket_path, server, _state_dir: state_dir })
    }

    async fn call(&self, id: i64, method: &str, params: Value) -> Response {
        let stream =
            UnixStream::connect(&self.socket_path).await.expect("client should connect");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request = Request::new(method, Some(params), RequestId::Number(id));
        let mut encoded = serde_json::to_vec(&request).expect("request should serialize");
        encoded.push(b'\n');
        write_half.write_all(&encoded).await.expect("request write should succeed");
        write_half.flush().await.expect("request flush should succeed");

        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await.expect("response should be readable");
        serde_json::from_slice(&line).expect("response should decode")
    }

    async fn expect_result(&self, id: i64, method: &str, params: Value) -> Value {
        let response = self.call(id, method, params).await;
        assert!(response.error.is_none(), "expected success from {method}: {response:?}");
        response.result.expect("success response should carry a result")
    }

    fn stop(self) {
        self.server.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn unique_socket_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("folio-{prefix}-{nanos}.sock"))
}

fn parse_uuid(value: &Value) -> Uuid {
    serde_json::from_value(value.clone()).expect("value should be a uuid")
}

#[tokio::test]
async fn full_editing_lifecycle_over_the_socket() {
    let Some(daemon) = TestDaemon::start().await else { return };
    let doc_id = Uuid::new_v4();

    // Acquire the editing lease.
    let acquired = daemon
        .expect_result(1, "lock.acquire", json!({ "doc_id": doc_id, "holder_id": "agent-1" }))
        .await;
    assert_eq!(acquired["lease"]["holder_id"], json!("agent-1"));

    // A competing writer is turned away immediately.
    let conflict = daemon
        .call(2, "lock.acquire", json!({ "doc_id": doc_id, "holder_id": "agent-2" }))
        .await;
    let conflict_error = conflict.error.expect("competing acquire should fail");
    assert_eq!(conflict_error.code, -32001);

    // Two saves by the holder produce versions 1 and 2.
    let first = daemon
        .expect_result(
            3,
            "doc.save",
            json!({
                "doc_id": doc_id,
                "holder_id": "agent-1",
                "content": "# Title\n\nfirst body\n",
                "message": "initial draft",
            }),
        )
        .await;
    assert_eq!(first["version"]["version_number"], json!(1));
    let first_id = parse_uuid(&first["version"]["id"]);

    let second = daemon
        .expect_result(
            4,
            "doc.save",
            json!({
                "doc_id": doc_id,
                "holder_id": "agent-1",
                "content": "# Title\n\nsecond body\n",
                "message": "revise body",
            }),
        )
        .await;
    assert_eq!(second["version"]["version_number"], json!(2));
    let second_id = parse_uuid(&second["version"]["id"]);

    // Listing is newest-first with a total.
    let listed = daemon
        .expect_result(5, "version.list", json!({ "doc_id": doc_id, "limit": 10 }))
        .await;
    assert_eq!(listed["total"], json!(2));
    assert_eq!(listed["items"][0]["version_number"], json!(2));
    assert_eq!(listed["items"][1]["version_number"], json!(1));

    // Diff between the two versions.
    let diffed = daemon
        .expect_result(
            6,
            "version.diff",
            json!({ "doc_id": doc_id, "version_a": first_id, "version_b": second_id }),
        )
        .await;
    let entries = diffed["entries"].as_array().expect("entries should be an array");
    let removed: Vec<&Value> =
        entries.iter().filter(|entry| entry["kind"] == json!("removed")).collect();
    let added: Vec<&Value> =
        entries.iter().filter(|entry| entry["kind"] == json!("added")).collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0]["text"], json!("first body"));
    assert_eq!(added.len(), 1);
    assert_eq!(added[0]["text"], json!("second body"));

    // Tag the first version.
    let tagged = daemon
        .expect_result(
            7,
            "version.tag",
            json!({ "doc_id": doc_id, "version_id": first_id, "tag": "reviewed" }),
        )
        .await;
    assert_eq!(tagged["tagged"], json!(true));

    // Rollback restores version 1's bytes as version 3, no lease needed
    // by the (different) author.
    let rolled = daemon
        .expect_result(
            8,
            "version.rollback",
            json!({ "doc_id": doc_id, "version_id": first_id, "author_id": "human-1" }),
        )
        .await;
    assert_eq!(rolled["version"]["version_number"], json!(3));
    assert_eq!(rolled["version"]["message"], json!("rollback to v1"));
    let rolled_id = parse_uuid(&rolled["version"]["id"]);

    let restored = daemon
        .expect_result(
            9,
            "version.content",
            json!({ "doc_id": doc_id, "version_id": rolled_id }),
        )
        .await;
    assert_eq!(restored["content"], json!("# Title\n\nfirst body\n"));

    // Release, then the second writer can finally get in.
    let released = daemon
        .expect_result(10, "lock.release", json!({ "doc_id": doc_id, "holder_id": "agent-1" }))
        .await;
    assert_eq!(released["released"], json!(true));

    let handover = daemon
        .expect_result(11, "lock.acquire", json!({ "doc_id": doc_id, "holder_id": "agent-2" }))
        .await;
    assert_eq!(handover["lease"]["holder_id"], json!("agent-2"));

    daemon.stop();
}

#[tokio::test]
async fn save_without_lease_is_rejected_and_creates_no_version() {
    let Some(daemon) = TestDaemon::start().await else { return };
    let doc_id = Uuid::new_v4();

    let denied = daemon
        .call(
            1,
            "doc.save",
            json!({
                "doc_id": doc_id,
                "holder_id": "agent-1",
                "content": "unauthorized write",
                "message": "sneaky",
            }),
        )
        .await;
    assert_eq!(denied.error.expect("save should fail").code, -32003);

    let listed = daemon
        .expect_result(2, "version.list", json!({ "doc_id": doc_id, "limit": 10 }))
        .await;
    assert_eq!(listed["total"], json!(0));

    daemon.stop();
}

#[tokio::test]
async fn leases_are_scoped_per_document() {
    let Some(daemon) = TestDaemon::start().await else { return };
    let doc_a = Uuid::new_v4();
    let doc_b = Uuid::new_v4();

    daemon
        .expect_result(1, "lock.acquire", json!({ "doc_id": doc_a, "holder_id": "agent-1" }))
        .await;
    let other = daemon
        .expect_result(2, "lock.acquire", json!({ "doc_id": doc_b, "holder_id": "agent-2" }))
        .await;
    assert_eq!(other["lease"]["holder_id"], json!("agent-2"));

    let status_a = daemon.expect_result(3, "lock.status", json!({ "doc_id": doc_a })).await;
    assert_eq!(status_a["lease"]["holder_id"], json!("agent-1"));
    assert_eq!(status_a["expiring_soon"], json!(false));

    daemon.stop();
}
