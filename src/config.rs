use crate::error::GateError;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Configuration loaded from CLI args, environment variables, and/or config files
///
/// Config precedence: CLI args > env vars > config file > defaults
///
/// Every field has a usable default: the gate starts with no configuration
/// at all and throttles with the stock limits against a local upstream.
#[derive(Debug)]
pub struct Config {
    pub listen_addr: String,
    pub upstream_url: String,
    pub auth_service_url: String,
    pub login_url: String,
    pub log_level: String,
    /// Allow traffic through when the counter store is unreachable.
    /// Availability over strict enforcement; set to false to fail closed.
    pub fail_open: bool,
    pub flag_threshold: u32,
    pub amount_threshold: f64,
    pub auth_max_requests: u32,
    pub auth_window_secs: u64,
    pub payment_max_requests: u32,
    pub payment_window_secs: u64,
    pub trade_create_max_requests: u32,
    pub trade_match_max_requests: u32,
    pub trade_confirm_max_requests: u32,
    pub trading_window_secs: u64,
}

/// CLI arguments structure for clap
#[derive(Debug, Parser)]
#[command(name = "tradegate")]
#[command(about = "TradeGate - rate-limiting enforcement proxy for trading platform APIs")]
pub struct CliArgs {
    /// Path to configuration file (TOML or YAML)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:3000 (overrides env/config)
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Upstream API base URL (overrides env/config)
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Auth service base URL for session verification (overrides env/config)
    #[arg(long)]
    pub auth_service_url: Option<String>,

    /// Login page URL used for auth/payment denials (overrides env/config)
    #[arg(long)]
    pub login_url: Option<String>,

    /// Logging level: trace, debug, info, warn, error (overrides env/config)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Allow requests through when the counter store fails (overrides env/config)
    #[arg(long)]
    pub fail_open: Option<bool>,

    /// Violations before an identity is flagged for review (overrides env/config)
    #[arg(long)]
    pub flag_threshold: Option<u32>,

    /// Cumulative in-window amount cap for trading operations (overrides env/config)
    #[arg(long)]
    pub amount_threshold: Option<f64>,

    /// Auth attempts allowed per window (overrides env/config)
    #[arg(long)]
    pub auth_max_requests: Option<u32>,

    /// Auth window in seconds (overrides env/config)
    #[arg(long)]
    pub auth_window_secs: Option<u64>,

    /// Payment attempts allowed per window (overrides env/config)
    #[arg(long)]
    pub payment_max_requests: Option<u32>,

    /// Payment window in seconds (overrides env/config)
    #[arg(long)]
    pub payment_window_secs: Option<u64>,

    /// Trade-create attempts allowed per window (overrides env/config)
    #[arg(long)]
    pub trade_create_max_requests: Option<u32>,

    /// Trade-match attempts allowed per window (overrides env/config)
    #[arg(long)]
    pub trade_match_max_requests: Option<u32>,

    /// Trade-confirm attempts allowed per window (overrides env/config)
    #[arg(long)]
    pub trade_confirm_max_requests: Option<u32>,

    /// Shared trading window in seconds (overrides env/config)
    #[arg(long)]
    pub trading_window_secs: Option<u64>,
}

/// Config file structure (deserialized from TOML/YAML)
#[derive(Debug, Deserialize, Clone)]
struct ConfigFile {
    #[serde(rename = "gate")]
    gate: Option<GateSection>,
    #[serde(rename = "limits")]
    limits: Option<LimitsSection>,
    #[serde(rename = "logging")]
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize, Clone)]
struct GateSection {
    listen_addr: Option<String>,
    upstream_url: Option<String>,
    auth_service_url: Option<String>,
    login_url: Option<String>,
    fail_open: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
struct LimitsSection {
    flag_threshold: Option<u32>,
    amount_threshold: Option<f64>,
    auth_max_requests: Option<u32>,
    auth_window_secs: Option<u64>,
    payment_max_requests: Option<u32>,
    payment_window_secs: Option<u64>,
    trade_create_max_requests: Option<u32>,
    trade_match_max_requests: Option<u32>,
    trade_confirm_max_requests: Option<u32>,
    trading_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
struct LoggingSection {
    level: Option<String>,
}

impl Config {
    /// Load configuration with precedence: CLI args > env vars > config file > defaults
    pub fn load(cli_args: &CliArgs) -> Result<Config, GateError> {
        // Load .env file if present (but don't override existing env vars)
        dotenv::dotenv().ok();

        // Step 1: Load config file (if specified)
        let file_config = if let Some(config_path) = &cli_args.config_file {
            Self::load_from_file(config_path)?
        } else {
            None
        };

        // Step 2: Load environment variables
        let env_config = Self::load_from_env();

        // Step 3: Apply precedence (CLI > env > file > defaults)
        let listen_addr = cli_args
            .listen_addr
            .as_ref()
            .or(env_config.listen_addr.as_ref())
            .or_else(|| file_config.as_ref().and_then(|f| f.gate.as_ref()?.listen_addr.as_ref()))
            .unwrap_or(&"0.0.0.0:3000".to_string())
            .clone();

        let upstream_url = cli_args
            .upstream_url
            .as_ref()
            .or(env_config.upstream_url.as_ref())
            .or_else(|| file_config.as_ref().and_then(|f| f.gate.as_ref()?.upstream_url.as_ref()))
            .unwrap_or(&"http://localhost:8080".to_string())
            .clone();

        let auth_service_url = cli_args
            .auth_service_url
            .as_ref()
            .or(env_config.auth_service_url.as_ref())
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.gate.as_ref()?.auth_service_url.as_ref())
            })
            .unwrap_or(&"http://localhost:8081".to_string())
            .clone();

        let login_url = cli_args
            .login_url
            .as_ref()
            .or(env_config.login_url.as_ref())
            .or_else(|| file_config.as_ref().and_then(|f| f.gate.as_ref()?.login_url.as_ref()))
            .unwrap_or(&"/auth/login".to_string())
            .clone();

        let log_level = cli_args
            .log_level
            .as_ref()
            .or(env_config.log_level.as_ref())
            .or_else(|| file_config.as_ref().and_then(|f| f.logging.as_ref()?.level.as_ref()))
            .unwrap_or(&"info".to_string())
            .clone();

        let fail_open = cli_args
            .fail_open
            .or(env_config.fail_open)
            .or_else(|| file_config.as_ref().and_then(|f| f.gate.as_ref()?.fail_open))
            .unwrap_or(true);

        use crate::limiter::{
            DEFAULT_AUTH_MAX_REQUESTS, DEFAULT_AUTH_WINDOW, DEFAULT_FLAG_THRESHOLD,
            DEFAULT_PAYMENT_MAX_REQUESTS, DEFAULT_PAYMENT_WINDOW,
        };
        use crate::trading::{
            DEFAULT_AMOUNT_THRESHOLD, DEFAULT_CONFIRM_MAX_REQUESTS, DEFAULT_CREATE_MAX_REQUESTS,
            DEFAULT_MATCH_MAX_REQUESTS, DEFAULT_TRADING_WINDOW,
        };

        let flag_threshold = cli_args
            .flag_threshold
            .or(env_config.flag_threshold)
            .or_else(|| file_config.as_ref().and_then(|f| f.limits.as_ref()?.flag_threshold))
            .unwrap_or(DEFAULT_FLAG_THRESHOLD);

        let amount_threshold = cli_args
            .amount_threshold
            .or(env_config.amount_threshold)
            .or_else(|| file_config.as_ref().and_then(|f| f.limits.as_ref()?.amount_threshold))
            .unwrap_or(DEFAULT_AMOUNT_THRESHOLD);

        let auth_max_requests = cli_args
            .auth_max_requests
            .or(env_config.auth_max_requests)
            .or_else(|| file_config.as_ref().and_then(|f| f.limits.as_ref()?.auth_max_requests))
            .unwrap_or(DEFAULT_AUTH_MAX_REQUESTS);

        let auth_window_secs = cli_args
            .auth_window_secs
            .or(env_config.auth_window_secs)
            .or_else(|| file_config.as_ref().and_then(|f| f.limits.as_ref()?.auth_window_secs))
            .unwrap_or(DEFAULT_AUTH_WINDOW.as_secs());

        let payment_max_requests = cli_args
            .payment_max_requests
            .or(env_config.payment_max_requests)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.payment_max_requests)
            })
            .unwrap_or(DEFAULT_PAYMENT_MAX_REQUESTS);

        let payment_window_secs = cli_args
            .payment_window_secs
            .or(env_config.payment_window_secs)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.payment_window_secs)
            })
            .unwrap_or(DEFAULT_PAYMENT_WINDOW.as_secs());

        let trade_create_max_requests = cli_args
            .trade_create_max_requests
            .or(env_config.trade_create_max_requests)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.trade_create_max_requests)
            })
            .unwrap_or(DEFAULT_CREATE_MAX_REQUESTS);

        let trade_match_max_requests = cli_args
            .trade_match_max_requests
            .or(env_config.trade_match_max_requests)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.trade_match_max_requests)
            })
            .unwrap_or(DEFAULT_MATCH_MAX_REQUESTS);

        let trade_confirm_max_requests = cli_args
            .trade_confirm_max_requests
            .or(env_config.trade_confirm_max_requests)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.trade_confirm_max_requests)
            })
            .unwrap_or(DEFAULT_CONFIRM_MAX_REQUESTS);

        let trading_window_secs = cli_args
            .trading_window_secs
            .or(env_config.trading_window_secs)
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.limits.as_ref()?.trading_window_secs)
            })
            .unwrap_or(DEFAULT_TRADING_WINDOW.as_secs());

        Ok(Config {
            listen_addr,
            upstream_url,
            auth_service_url,
            login_url,
            log_level,
            fail_open,
            flag_threshold,
            amount_threshold,
            auth_max_requests,
            auth_window_secs,
            payment_max_requests,
            payment_window_secs,
            trade_create_max_requests,
            trade_match_max_requests,
            trade_confirm_max_requests,
            trading_window_secs,
        })
    }

    /// Load configuration from file (TOML or YAML)
    fn load_from_file(path: &PathBuf) -> Result<Option<ConfigFile>, GateError> {
        use config::Config as ConfigBuilder;

        if !path.exists() {
            return Err(GateError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        // Determine file format from extension
        let file_source = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => config::File::from(path.as_path()).format(config::FileFormat::Toml),
            Some("yaml") | Some("yml") => {
                config::File::from(path.as_path()).format(config::FileFormat::Yaml)
            }
            _ => {
                // Auto-detect: default to TOML if extension unknown
                config::File::from(path.as_path()).format(config::FileFormat::Toml)
            }
        };

        let builder = ConfigBuilder::builder()
            .add_source(file_source)
            .build()
            .map_err(|e| GateError::ConfigError(format!("Failed to load config file: {}", e)))?;

        let config_file: ConfigFile = builder
            .try_deserialize()
            .map_err(|e| GateError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        Ok(Some(config_file))
    }

    /// Load configuration from environment variables only (for fallback/defaults)
    fn load_from_env() -> EnvConfig {
        EnvConfig {
            listen_addr: env::var("GATE_LISTEN_ADDR").ok(),
            upstream_url: env::var("GATE_UPSTREAM_URL").ok(),
            auth_service_url: env::var("GATE_AUTH_SERVICE_URL").ok(),
            login_url: env::var("GATE_LOGIN_URL").ok(),
            log_level: env::var("GATE_LOG_LEVEL").ok(),
            fail_open: env::var("GATE_FAIL_OPEN")
                .ok()
                .and_then(|v| v.parse::<bool>().ok()),
            flag_threshold: env::var("GATE_FLAG_THRESHOLD")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            amount_threshold: env::var("GATE_AMOUNT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse::<f64>().ok()),
            auth_max_requests: env::var("GATE_AUTH_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            auth_window_secs: env::var("GATE_AUTH_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            payment_max_requests: env::var("GATE_PAYMENT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            payment_window_secs: env::var("GATE_PAYMENT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            trade_create_max_requests: env::var("GATE_TRADE_CREATE_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            trade_match_max_requests: env::var("GATE_TRADE_MATCH_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            trade_confirm_max_requests: env::var("GATE_TRADE_CONFIRM_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            trading_window_secs: env::var("GATE_TRADING_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
        }
    }
}

/// Intermediate structure for env var config (all optional for precedence)
struct EnvConfig {
    listen_addr: Option<String>,
    upstream_url: Option<String>,
    auth_service_url: Option<String>,
    login_url: Option<String>,
    log_level: Option<String>,
    fail_open: Option<bool>,
    flag_threshold: Option<u32>,
    amount_threshold: Option<f64>,
    auth_max_requests: Option<u32>,
    auth_window_secs: Option<u64>,
    payment_max_requests: Option<u32>,
    payment_window_secs: Option<u64>,
    trade_create_max_requests: Option<u32>,
    trade_match_max_requests: Option<u32>,
    trade_confirm_max_requests: Option<u32>,
    trading_window_secs: Option<u64>,
}
