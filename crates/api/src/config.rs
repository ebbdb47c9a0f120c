use std::time::Duration;

use broadcast_core::campaign::CampaignSettings;
use broadcast_core::segmenter::{SegmentPricing, DEFAULT_BASE_RATE, DEFAULT_CARRIER_FEE};

/// Largest contact file accepted by the import endpoint (5 MiB).
pub const DEFAULT_MAX_IMPORT_BYTES: usize = 5 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long a removal notice stays up before it expires (default: `6`).
    pub notice_dismiss_secs: u64,
    /// Base carrier rate per SMS segment in USD (default: `0.0083`).
    pub sms_base_rate: f64,
    /// Per-segment carrier fee in USD (default: `0.0030`).
    pub sms_carrier_fee: f64,
    /// Upload cap for contact files (default: 5 MiB).
    pub max_import_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `NOTICE_DISMISS_SECS`  | `6`                        |
    /// | `SMS_BASE_RATE`        | `0.0083`                   |
    /// | `SMS_CARRIER_FEE`      | `0.0030`                   |
    /// | `MAX_IMPORT_BYTES`     | `5242880`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let notice_dismiss_secs: u64 = std::env::var("NOTICE_DISMISS_SECS")
            .unwrap_or_else(|_| "6".into())
            .parse()
            .expect("NOTICE_DISMISS_SECS must be a valid u64");

        let sms_base_rate: f64 = std::env::var("SMS_BASE_RATE")
            .map(|v| v.parse().expect("SMS_BASE_RATE must be a valid f64"))
            .unwrap_or(DEFAULT_BASE_RATE);

        let sms_carrier_fee: f64 = std::env::var("SMS_CARRIER_FEE")
            .map(|v| v.parse().expect("SMS_CARRIER_FEE must be a valid f64"))
            .unwrap_or(DEFAULT_CARRIER_FEE);

        let max_import_bytes: usize = std::env::var("MAX_IMPORT_BYTES")
            .map(|v| v.parse().expect("MAX_IMPORT_BYTES must be a valid usize"))
            .unwrap_or(DEFAULT_MAX_IMPORT_BYTES);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            notice_dismiss_secs,
            sms_base_rate,
            sms_carrier_fee,
            max_import_bytes,
        }
    }

    pub fn pricing(&self) -> SegmentPricing {
        SegmentPricing::new(self.sms_base_rate, self.sms_carrier_fee)
    }

    /// Controller tunables derived from this configuration.
    pub fn campaign_settings(&self) -> CampaignSettings {
        CampaignSettings {
            pricing: self.pricing(),
            notice_dismiss_after: Duration::from_secs(self.notice_dismiss_secs),
        }
    }
}
