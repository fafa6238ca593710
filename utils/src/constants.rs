use log::LevelFilter;

pub const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// Every setting is read from an environment variable with this prefix.
pub const ENV_PREFIX: &str = "KONG_";

/// Used when neither `KONG_SSH_USER` nor a flag names the login user.
pub const DEFAULT_SSH_USER: &str = "root";
