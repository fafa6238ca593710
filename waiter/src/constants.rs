use std::time::Duration;

/// How long a resource is given to reach its target status.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);
/// Delay between two status checks of the same resource.
pub const DEFAULT_BUILD_INTERVAL: Duration = Duration::from_secs(1);

/// Overall deadline for reaching a guest over SSH.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(300);
/// Upper bound for a single SSH connection attempt.
pub const DEFAULT_SSH_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Cooldown after a rejected login. Credentials on a freshly booted guest can lag boot.
pub const DEFAULT_SSH_AUTH_COOLDOWN: Duration = Duration::from_secs(15);
/// How often an established connection is checked while waiting for it to drop.
pub const DEFAULT_SSH_DISCONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How many times a rate-limited request is re-sent after honoring `Retry-After`.
pub const DEFAULT_OVERLIMIT_RETRIES: u32 = 2;

// Header names
pub const HEADER_AUTH_TOKEN: &str = "x-auth-token";
pub const HEADER_DATE: &str = "date";
pub const HEADER_RETRY_AFTER: &str = "retry-after";
