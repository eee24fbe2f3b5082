//! config-rs/lib.rs
//! Shared configuration utilities for the inference gateway
//! Provides port/address management and the runtime inference settings

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SERVICE_PORT: u16 = 8080;
pub const DEFAULT_SEARCH_API: &str = "https://searxng.example.com/search?q={query}&format=json";
pub const DEFAULT_MODEL_PATH: &str = "models/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf";
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF/resolve/main/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf";
pub const DEFAULT_PROBE_URL: &str = "https://1.1.1.1";

/// Loads a `.env` file from the working directory if one exists
pub fn load_dotenv() {
    if dotenv::dotenv().is_ok() {
        log::debug!("Loaded environment overrides from .env");
    }
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "INFERENCE")
/// * `default_port` - The default port to use if not specified in environment
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    match env::var(&var_name) {
        Ok(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        }),
        Err(_) => default_port,
    }
}

/// Create a SocketAddr for binding a service
///
/// `<SERVICE>_SERVICE_ADDR` wins when it holds a valid `host:port` (optionally
/// prefixed with `http://` or `https://`); otherwise binds all interfaces on
/// the configured port.
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr_str) = env::var(&var_name) {
        let trimmed = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);
        match trimmed.parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

// Reads an environment variable, falling back to `default` when unset or unparsable
fn get_env_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable value {:?} for {}", raw, name);
            default
        }),
        Err(_) => default,
    }
}

fn get_env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Runtime settings for generation, search and recovery
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Search endpoint with a `{query}` placeholder
    pub search_api: String,
    /// Local model file used by the generator
    pub model_path: PathBuf,
    /// Remote source the model is fetched from when missing
    pub model_url: String,
    /// Upper bound on a model download in seconds
    pub download_timeout_secs: u64,
    /// llama.cpp command line executable
    pub llama_cli_bin: String,
    /// Initial worker/thread count for generation
    pub threads: usize,
    pub max_tokens: u32,
    pub context_size: u32,
    /// Initial search timeout in seconds
    pub search_timeout_secs: u64,
    /// Address probed by connectivity recovery
    pub probe_url: String,
    pub backoff_unit_ms: u64,
    pub history_capacity: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            search_api: DEFAULT_SEARCH_API.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: DEFAULT_MODEL_URL.to_string(),
            download_timeout_secs: 600,
            llama_cli_bin: "llama-cli".to_string(),
            threads: 8,
            max_tokens: 150,
            context_size: 512,
            search_timeout_secs: 2,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            backoff_unit_ms: 1000,
            history_capacity: 1000,
        }
    }
}

impl InferenceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            search_api: get_env_string("SEARCH_API", &defaults.search_api),
            model_path: PathBuf::from(get_env_string("MODEL_PATH", DEFAULT_MODEL_PATH)),
            model_url: get_env_string("MODEL_URL", &defaults.model_url),
            download_timeout_secs: get_env_var("MODEL_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout_secs),
            llama_cli_bin: get_env_string("LLAMA_CLI_BIN", &defaults.llama_cli_bin),
            threads: get_env_var("LLM_THREADS", defaults.threads).max(1),
            max_tokens: get_env_var("LLM_MAX_TOKENS", defaults.max_tokens),
            context_size: get_env_var("LLM_CONTEXT_SIZE", defaults.context_size),
            search_timeout_secs: get_env_var("SEARCH_TIMEOUT_SECS", defaults.search_timeout_secs),
            probe_url: get_env_string("RECOVERY_PROBE_URL", &defaults.probe_url),
            backoff_unit_ms: get_env_var("RECOVERY_BACKOFF_UNIT_MS", defaults.backoff_unit_ms),
            history_capacity: get_env_var("ERROR_HISTORY_CAPACITY", defaults.history_capacity),
        }
    }
}

/// Logging settings read from `LOG_LEVEL`, `LOG_JSON` and `LOG_DIR`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub dir: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self {
            level: get_env_string("LOG_LEVEL", "info"),
            json: get_env_var("LOG_JSON", false),
            dir: env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
        }
    }
}
