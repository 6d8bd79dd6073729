//! Crate-wide constants.

pub const APP_NAME: &str = "convoy";

/// Value stored under the fingerprint key of a served body.
pub const CANARY_VALUE: &str = "canary";

/// Header carrying the shared secret that unlocks internal error detail.
pub const DEBUG_SECRET_HEADER: &str = "x-convoy-debug-secret";

/// Header naming the user on whose behalf a write is made.
pub const USER_NAME_HEADER: &str = "x-convoy-user-name";

/// Header carrying the user's email address.
pub const USER_EMAIL_HEADER: &str = "x-convoy-user-email";

/// Completed rectifications retained per target for lookups by ID.
pub const DEFAULT_QUEUE_RETENTION: usize = 64;

/// Upper bound on a blocking wait for a rectification outcome.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

/// Concurrent cluster reads during a fan-in.
pub const DEFAULT_PARALLELISM: usize = 4;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7800";

/// File name of the GDM inside the data directory.
pub const STATE_FILENAME: &str = "gdm.json";
