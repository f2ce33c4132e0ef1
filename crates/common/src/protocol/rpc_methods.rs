// RPC method name constants for the editing daemon.

// ── Daemon-internal ────────────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";
pub const DAEMON_SHUTDOWN: &str = "daemon.shutdown";

// ── Editing lease ──────────────────────────────────────────────────
pub const LOCK_ACQUIRE: &str = "lock.acquire";
pub const LOCK_RELEASE: &str = "lock.release";
pub const LOCK_STATUS: &str = "lock.status";

// ── Document content ───────────────────────────────────────────────
pub const DOC_SAVE: &str = "doc.save";

// ── Version chain ──────────────────────────────────────────────────
pub const VERSION_LIST: &str = "version.list";
pub const VERSION_CONTENT: &str = "version.content";
pub const VERSION_TAG: &str = "version.tag";
pub const VERSION_ROLLBACK: &str = "version.rollback";
pub const VERSION_DIFF: &str = "version.diff";

/// All methods the daemon currently dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    RPC_PING,
    DAEMON_SHUTDOWN,
    LOCK_ACQUIRE,
    LOCK_RELEASE,
    LOCK_STATUS,
    DOC_SAVE,
    VERSION_LIST,
    VERSION_CONTENT,
    VERSION_TAG,
    VERSION_ROLLBACK,
    VERSION_DIFF,
];
