use serde::Deserialize;
use std::convert::TryFrom;
use std::time::Duration;

/// Prefix for environment variable overrides, e.g. `THICKET_PORT`.
const ENV_PREFIX: &str = "THICKET";

/// Run mode of the dispatcher.
///
/// Debug mode logs every route registration; release and test modes stay quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Debug,
    Release,
    Test,
}

/// Routing behaviour of a [`Dispatcher`](crate::Dispatcher).
///
/// Every flag that changes how a request is matched or how a miss is handled
/// lives here and is handed to the dispatcher at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Redirect `/foo/` to `/foo` (or the reverse) when only the other form is
    /// registered. 301 for GET and HEAD, 307 otherwise. Defaults to true.
    #[serde(default = "default_true")]
    pub redirect_trailing_slash: bool,
    /// Clean the path and retry case-insensitively, redirecting to the
    /// registered spelling when found. Defaults to false.
    #[serde(default)]
    pub redirect_fixed_path: bool,
    /// Answer 405 when the path is registered under another method only.
    /// Defaults to false.
    #[serde(default)]
    pub handle_method_not_allowed: bool,
    /// Percent-decode captured parameter values when matching on the raw
    /// path. Defaults to true.
    #[serde(default = "default_true")]
    pub unescape_path_values: bool,
    /// Match on the raw (still percent-encoded) path. When false the whole
    /// path is decoded before matching. Defaults to false.
    #[serde(default)]
    pub use_raw_path: bool,
    /// Trust `X-Forwarded-For` and `X-Real-Ip` when resolving the client IP.
    /// Defaults to true.
    #[serde(default = "default_true")]
    pub forwarded_by_client_ip: bool,
    #[serde(default)]
    pub mode: Mode,
    /// Number of idle request contexts kept for reuse. Defaults to CPU count * 15.
    #[serde(default = "default_max_workers")]
    pub pool_capacity: usize,
}

impl TryFrom<config::Config> for RouterConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

impl RouterConfig {
    /// Loads the routing flags from `.env`, an optional `config` file and
    /// `THICKET_` environment variables, in increasing precedence.
    ///
    /// # Errors
    /// Returns a ConfigError if configuration loading or parsing fails.
    pub fn new() -> Result<Self, config::ConfigError> {
        load()?.try_into()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: false,
            handle_method_not_allowed: false,
            unescape_path_values: true,
            use_raw_path: false,
            forwarded_by_client_ip: true,
            mode: Mode::Debug,
            pool_capacity: default_max_workers(),
        }
    }
}

/// Configuration for the HTTP server.
///
/// This struct contains all the configuration options for both HTTP/1.x and HTTP/2
/// (when the "http2" feature is enabled). It can be initialized from environment
/// variables with the "THICKET_" prefix or from a config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Maximum number of worker threads running handler chains. Defaults to CPU count * 15.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Keep-alive duration in seconds for idle worker threads. Defaults to 6 seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub worker_keep_alive_secs: u64,
    /// Server host address. Defaults to "127.0.0.1".
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port number. Defaults to 3000.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub http1_keep_alive: bool,
    #[serde(default)]
    pub http1_half_close: bool,
    /// Maximum buffer size for HTTP/1.x requests. Defaults to 512kb (524,288 bytes).
    #[serde(default = "default_max_buf_size")]
    pub http1_max_buf_size: usize,
    #[serde(default)]
    pub http1_title_case_headers: bool,
    #[serde(default)]
    pub http1_preserve_header_case: bool,
    #[serde(default)]
    pub http1_only: bool,
    #[cfg(feature = "http2")]
    #[serde(default)]
    pub http2_only: bool,
    #[cfg(feature = "http2")]
    pub http2_initial_stream_window_size: Option<u32>,
    #[cfg(feature = "http2")]
    pub http2_initial_connection_window_size: Option<u32>,
    #[cfg(feature = "http2")]
    #[serde(default = "default_true")]
    pub http2_adaptive_window: bool,
    #[cfg(feature = "http2")]
    pub http2_max_frame_size: Option<u32>,
    #[cfg(feature = "http2")]
    pub http2_max_concurrent_streams: Option<u32>,
    #[cfg(feature = "http2")]
    #[serde(default = "default_max_buf_size")]
    pub http2_max_send_buf_size: usize,
}

impl TryFrom<config::Config> for ServerConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig instance from environment variables and config file.
    ///
    /// This method will:
    /// 1. Load environment variables from a .env file if present
    /// 2. Load configuration from a "config" file (if it exists)
    /// 3. Override with environment variables prefixed with "THICKET_"
    ///
    /// # Errors
    /// Returns a ConfigError if configuration loading or parsing fails.
    pub fn new() -> Result<Self, config::ConfigError> {
        load()?.try_into()
    }

    /// Converts the worker_keep_alive_secs value into a Duration.
    pub fn worker_keep_alive(&self) -> Duration {
        Duration::from_secs(self.worker_keep_alive_secs)
    }

    /// The `host:port` pair the server listens on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared source stack for both configuration structs.
fn load() -> Result<config::Config, config::ConfigError> {
    dotenv::dotenv().ok();

    config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .build()
}

fn default_true() -> bool {
    true
}

/// Default value for max_workers. Returns CPU count * 15.
fn default_max_workers() -> usize {
    num_cpus::get() * 15
}

fn default_keep_alive_secs() -> u64 {
    6
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Default maximum buffer size (512kb).
fn default_max_buf_size() -> usize {
    524_288
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            worker_keep_alive_secs: default_keep_alive_secs(),
            host: default_host(),
            port: default_port(),
            http1_keep_alive: true,
            http1_half_close: false,
            http1_max_buf_size: default_max_buf_size(),
            http1_title_case_headers: false,
            http1_preserve_header_case: false,
            http1_only: false,
            #[cfg(feature = "http2")]
            http2_only: false,
            #[cfg(feature = "http2")]
            http2_initial_stream_window_size: None,
            #[cfg(feature = "http2")]
            http2_initial_connection_window_size: None,
            #[cfg(feature = "http2")]
            http2_adaptive_window: true,
            #[cfg(feature = "http2")]
            http2_max_frame_size: None,
            #[cfg(feature = "http2")]
            http2_max_concurrent_streams: None,
            #[cfg(feature = "http2")]
            http2_max_send_buf_size: default_max_buf_size(),
        }
    }
}
