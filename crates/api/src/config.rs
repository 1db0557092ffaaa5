use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use gaffer_db::repositories::RecoveryPolicy;

/// One `name:secret` credential pair from the environment.
///
/// The secret is kept out of `Debug` output so a logged config can never
/// leak it.
#[derive(Clone)]
pub struct AccountEntry {
    pub name: String,
    pub secret: String,
}

impl fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountEntry")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Which credential set the status API authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiAuthMode {
    /// Dedicated operator credentials from `OPERATOR_ACCOUNTS`.
    Operators,
    /// Reuse the device account pool as API credentials.
    DevicePool,
}

/// Daemon configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except the
/// account list and the executor command, which have no sane default.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8123`).
    pub port: u16,
    /// Order store location (default: `sqlite://gaffer.db`).
    pub database_url: String,
    /// Directory receiving per-task log/trace artifacts (default: `./logs`).
    pub log_dir: PathBuf,
    /// Worker slots in the dispatch loop (default: `4`).
    pub max_concurrency: usize,
    /// Per-task executor budget in seconds (default: `300`).
    pub task_timeout_secs: u64,
    /// Drain window on shutdown before in-flight tasks are abandoned
    /// (default: `30`).
    pub shutdown_grace_secs: u64,
    /// Dispatcher fallback tick in seconds (default: `1`).
    pub poll_interval_secs: u64,
    /// The shared device accounts tasks run under. Required.
    pub device_accounts: Vec<AccountEntry>,
    /// Credential set for the status API (default: operators).
    pub api_auth: ApiAuthMode,
    /// Operator credentials, required when `api_auth` is `Operators`.
    pub operator_accounts: Vec<AccountEntry>,
    /// Command line spawned per task, whitespace-split. Required.
    pub executor_cmd: Vec<String>,
    /// What restart does with tasks found `running` (default: requeue).
    pub recovery_policy: RecoveryPolicy,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Allowed CORS origins, comma-separated (default: `http://localhost:5173`).
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `HOST`                | `0.0.0.0`               |
    /// | `PORT`                | `8123`                  |
    /// | `DATABASE_URL`        | `sqlite://gaffer.db`    |
    /// | `LOG_DIR`             | `./logs`                |
    /// | `MAX_CONCURRENCY`     | `4`                     |
    /// | `TASK_TIMEOUT_SECS`   | `300`                   |
    /// | `SHUTDOWN_GRACE_SECS` | `30`                    |
    /// | `POLL_INTERVAL_SECS`  | `1`                     |
    /// | `DEVICE_ACCOUNTS`     | required                |
    /// | `API_AUTH`            | `operators`             |
    /// | `OPERATOR_ACCOUNTS`   | required for operators  |
    /// | `EXECUTOR_CMD`        | required                |
    /// | `RECOVERY_POLICY`     | `requeue`               |
    /// | `REQUEST_TIMEOUT_SECS`| `30`                    |
    /// | `CORS_ORIGINS`        | `http://localhost:5173` |
    ///
    /// Panics on missing required variables or malformed values, which is
    /// the desired fail-fast behaviour at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8123".into())
            .parse()
            .expect("PORT must be a valid u16");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://gaffer.db".into());

        let log_dir = PathBuf::from(std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".into()));

        let max_concurrency: usize = std::env::var("MAX_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("MAX_CONCURRENCY must be a positive integer");
        assert!(max_concurrency > 0, "MAX_CONCURRENCY must be at least 1");

        let task_timeout_secs = parse_secs("TASK_TIMEOUT_SECS", 300);
        let shutdown_grace_secs = parse_secs("SHUTDOWN_GRACE_SECS", 30);
        let poll_interval_secs = parse_secs("POLL_INTERVAL_SECS", 1);
        let request_timeout_secs = parse_secs("REQUEST_TIMEOUT_SECS", 30);

        let device_accounts = parse_accounts(
            &std::env::var("DEVICE_ACCOUNTS")
                .expect("DEVICE_ACCOUNTS must be set (name:secret,name:secret)"),
        )
        .expect("DEVICE_ACCOUNTS is malformed");
        assert!(
            !device_accounts.is_empty(),
            "DEVICE_ACCOUNTS must list at least one account"
        );

        let api_auth = match std::env::var("API_AUTH")
            .unwrap_or_else(|_| "operators".into())
            .as_str()
        {
            "operators" => ApiAuthMode::Operators,
            "device-pool" => ApiAuthMode::DevicePool,
            other => panic!("API_AUTH must be 'operators' or 'device-pool', got '{other}'"),
        };

        let operator_accounts = match api_auth {
            ApiAuthMode::Operators => {
                let raw = std::env::var("OPERATOR_ACCOUNTS")
                    .expect("OPERATOR_ACCOUNTS must be set when API_AUTH=operators");
                let accounts = parse_accounts(&raw).expect("OPERATOR_ACCOUNTS is malformed");
                assert!(
                    !accounts.is_empty(),
                    "OPERATOR_ACCOUNTS must list at least one account"
                );
                accounts
            }
            ApiAuthMode::DevicePool => Vec::new(),
        };

        let executor_cmd = parse_command(
            &std::env::var("EXECUTOR_CMD").expect("EXECUTOR_CMD must be set"),
        )
        .expect("EXECUTOR_CMD must not be empty");

        let recovery_policy = RecoveryPolicy::from_str(
            &std::env::var("RECOVERY_POLICY").unwrap_or_else(|_| "requeue".into()),
        )
        .expect("RECOVERY_POLICY must be 'requeue' or 'fail'");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            database_url,
            log_dir,
            max_concurrency,
            task_timeout_secs,
            shutdown_grace_secs,
            poll_interval_secs,
            device_accounts,
            api_auth,
            operator_accounts,
            executor_cmd,
            recovery_policy,
            request_timeout_secs,
            cors_origins,
        }
    }
}

fn parse_secs(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{var} must be a valid u64"))
}

/// Parse a `name:secret,name:secret` list. Entries are trimmed; empty
/// entries (trailing commas) are skipped. The secret may itself contain
/// colons; only the first one separates name from secret.
fn parse_accounts(raw: &str) -> Result<Vec<AccountEntry>, String> {
    let mut accounts = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, secret) = entry
            .split_once(':')
            .ok_or_else(|| format!("account entry '{entry}' is not name:secret"))?;
        if name.is_empty() || secret.is_empty() {
            return Err(format!("account entry '{entry}' has an empty name or secret"));
        }
        accounts.push(AccountEntry {
            name: name.to_string(),
            secret: secret.to_string(),
        });
    }
    Ok(accounts)
}

/// Split a command line on whitespace. Errors on an empty string.
fn parse_command(raw: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err("command line is empty".into());
    }
    Ok(parts)
}
