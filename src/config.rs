use crate::domain::fees::FeeSchedule;
use crate::error::{PaymentError, Result};
use crate::infrastructure::gateway::{DEFAULT_GATEWAY_URL, GatewayConfig};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every subcommand. Each can also be set from the environment.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "SPONSORPAY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL of the payment gateway API.
    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Gateway secret key, used both for API calls and webhook signatures.
    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_SECRET", hide_env_values = true)]
    pub gateway_secret: Option<String>,

    /// Where the gateway redirects the payer after checkout.
    #[arg(long, global = true, env = "SPONSORPAY_CALLBACK_URL")]
    pub callback_url: Option<String>,

    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_TIMEOUT_SECS", default_value_t = 15)]
    pub gateway_timeout_secs: u64,

    /// Proportional gateway fee, e.g. 0.015 for 1.5%.
    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_FEE_RATE")]
    pub gateway_fee_rate: Option<Decimal>,

    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_FEE_FLAT")]
    pub gateway_fee_flat: Option<Decimal>,

    #[arg(long, global = true, env = "SPONSORPAY_GATEWAY_FEE_CAP")]
    pub gateway_fee_cap: Option<Decimal>,

    /// Platform commission, e.g. 0.05 for 5%.
    #[arg(long, global = true, env = "SPONSORPAY_PLATFORM_FEE_RATE")]
    pub platform_fee_rate: Option<Decimal>,

    /// How long a processed webhook delivery is remembered.
    #[arg(long, global = true, env = "SPONSORPAY_WEBHOOK_DEDUP_TTL_SECS", default_value_t = 86_400)]
    pub webhook_dedup_ttl_secs: u64,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub fees: FeeSchedule,
    pub webhook_dedup_ttl: Duration,
}

impl Settings {
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let defaults = FeeSchedule::default();
        let fees = FeeSchedule::new(
            args.gateway_fee_rate.unwrap_or(defaults.gateway_rate),
            args.gateway_fee_flat.unwrap_or(defaults.gateway_flat),
            args.gateway_fee_cap.or(defaults.gateway_cap),
            args.platform_fee_rate.unwrap_or(defaults.platform_rate),
        )?;

        if args.gateway_timeout_secs == 0 {
            return Err(PaymentError::ValidationError(
                "gateway timeout must be at least one second".to_string(),
            ));
        }
        if args.webhook_dedup_ttl_secs == 0 {
            return Err(PaymentError::ValidationError(
                "webhook dedup TTL must be at least one second".to_string(),
            ));
        }
        if !args.gateway_url.starts_with("http://") && !args.gateway_url.starts_with("https://") {
            return Err(PaymentError::ValidationError(format!(
                "gateway URL must be http(s): '{}'",
                args.gateway_url
            )));
        }

        Ok(Self {
            gateway: GatewayConfig {
                base_url: args.gateway_url.clone(),
                secret_key: args.gateway_secret.clone().unwrap_or_default(),
                callback_url: args.callback_url.clone(),
                timeout: Duration::from_secs(args.gateway_timeout_secs),
            },
            fees,
            webhook_dedup_ttl: Duration::from_secs(args.webhook_dedup_ttl_secs),
        })
    }
}
