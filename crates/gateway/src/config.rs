/// Dispatch service connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the dispatch service (default: `http://localhost:8000`).
    pub base_url: String,
    /// Per-request timeout in seconds (default: `60`). Covers a whole batch,
    /// which the service sends sequentially.
    pub timeout_secs: u64,
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `DISPATCH_BASE_URL`     | `http://localhost:8000` |
    /// | `DISPATCH_TIMEOUT_SECS` | `60`                    |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("DISPATCH_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".into());

        let timeout_secs: u64 = std::env::var("DISPATCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("DISPATCH_TIMEOUT_SECS must be a valid u64");

        Self {
            base_url,
            timeout_secs,
        }
    }
}
