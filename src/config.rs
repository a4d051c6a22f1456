//! Configuration module
//!
//! CLI arguments with environment variable fallbacks, resolved into a
//! `ProxyConfig` with every derived default filled in.

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use std::time::Duration;

use crate::crypto::RsaKey;
use crate::logger::LogLevel;

/// Parse duration string (e.g., "60s", "2m", "1h") or plain seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }
    s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        format!(
            "Invalid duration '{}'. Use formats like '60s', '2m', '1h' or plain seconds",
            s
        )
    })
}

pub const DEFAULT_LOGIN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOGIN_PORT: u16 = 7171;
pub const DEFAULT_DESTINATION_LOGIN_HOST: &str = "127.0.0.1";
pub const DEFAULT_DESTINATION_LOGIN_PORT: u16 = 7172;
pub const DEFAULT_TCP_BACKLOG: i32 = 128;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// CLI arguments for the proxy
///
/// Supports environment variables with TIBIA_PROXY_ prefix
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Man-in-the-middle proxy for the Tibia login and game protocols"
)]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Address the login listener binds to
    #[arg(long, env = "TIBIA_PROXY_LISTEN_LOGIN_HOST", default_value = DEFAULT_LOGIN_HOST)]
    pub listen_login_host: String,

    /// Port the login listener binds to
    #[arg(long, env = "TIBIA_PROXY_LISTEN_LOGIN_PORT", default_value_t = DEFAULT_LOGIN_PORT)]
    pub listen_login_port: u16,

    /// Address the game listener binds to (default: login host)
    #[arg(long, env = "TIBIA_PROXY_LISTEN_GAME_HOST")]
    pub listen_game_host: Option<String>,

    /// Port the game listener binds to (default: login port - 1)
    #[arg(long, env = "TIBIA_PROXY_LISTEN_GAME_PORT")]
    pub listen_game_port: Option<u16>,

    /// Real login server host
    #[arg(
        long,
        env = "TIBIA_PROXY_DESTINATION_LOGIN_HOST",
        default_value = DEFAULT_DESTINATION_LOGIN_HOST
    )]
    pub destination_login_host: String,

    /// Real login server port
    #[arg(
        long,
        env = "TIBIA_PROXY_DESTINATION_LOGIN_PORT",
        default_value_t = DEFAULT_DESTINATION_LOGIN_PORT
    )]
    pub destination_login_port: u16,

    /// Host written into character lists (default: game listen host). Set it when behind NAT.
    #[arg(long, env = "TIBIA_PROXY_ANNOUNCE_HOST")]
    pub announce_host: Option<String>,

    /// Port written into character lists (default: game listen port)
    #[arg(long, env = "TIBIA_PROXY_ANNOUNCE_PORT")]
    pub announce_port: Option<u16>,

    /// Re-encrypt RSA blocks with the real server key instead of the open one
    #[arg(long, env = "TIBIA_PROXY_REAL_TIBIA")]
    pub real_tibia: bool,

    /// Handle one connection at a time on each listener
    #[arg(long, env = "TIBIA_PROXY_DEBUG")]
    pub debug: bool,

    /// Chat plugins in dispatch order (repeatable or comma-separated)
    #[arg(
        long = "plugin",
        env = "TIBIA_PROXY_PLUGINS",
        value_delimiter = ',',
        default_value = "greeting"
    )]
    pub plugins: Vec<String>,

    /// Forget a character's world after this long (e.g., "10m"; default: never)
    #[arg(long, env = "TIBIA_PROXY_ROUTE_TTL", value_parser = parse_duration)]
    pub route_ttl: Option<Duration>,

    /// Log mode: trace, debug, info, warn, error (default: info)
    #[arg(long, env = "TIBIA_PROXY_LOG_MODE", default_value = "info")]
    pub log_mode: String,

    // ==================== Performance Tuning ====================
    /// Timeout for connecting to upstream servers (e.g., "10s")
    #[arg(
        long,
        env = "TIBIA_PROXY_CONNECT_TIMEOUT",
        default_value = "10s",
        value_parser = parse_duration,
        help_heading = "Performance"
    )]
    pub connect_timeout: Duration,

    /// TCP listen backlog for pending connections (default: 128)
    #[arg(
        long,
        env = "TIBIA_PROXY_TCP_BACKLOG",
        default_value_t = DEFAULT_TCP_BACKLOG,
        help_heading = "Performance"
    )]
    pub tcp_backlog: i32,

    /// Enable TCP_NODELAY for lower latency (default: true)
    #[arg(
        long,
        env = "TIBIA_PROXY_TCP_NODELAY",
        default_value_t = true,
        action = ArgAction::Set,
        help_heading = "Performance"
    )]
    pub tcp_nodelay: bool,
}

impl CliArgs {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        if self.listen_login_host.is_empty() {
            return Err(anyhow!("listen_login_host must not be empty"));
        }
        if self.listen_login_port == 0 {
            return Err(anyhow!("listen_login_port must be greater than 0"));
        }
        if self.listen_game_port.is_none() && self.listen_login_port < 2 {
            return Err(anyhow!(
                "listen_game_port defaults to listen_login_port - 1, which would be 0; set it explicitly"
            ));
        }
        if self.listen_game_port == Some(0) {
            return Err(anyhow!("listen_game_port must be greater than 0"));
        }
        if matches!(self.listen_game_host.as_deref(), Some("")) {
            return Err(anyhow!("listen_game_host must not be empty"));
        }
        if self.destination_login_host.is_empty() {
            return Err(anyhow!("destination_login_host must not be empty"));
        }
        if self.destination_login_port == 0 {
            return Err(anyhow!("destination_login_port must be greater than 0"));
        }
        if matches!(self.announce_host.as_deref(), Some("")) {
            return Err(anyhow!("announce_host must not be empty"));
        }
        if self.announce_port == Some(0) {
            return Err(anyhow!("announce_port must be greater than 0"));
        }
        if self.route_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(anyhow!("route_ttl must be greater than 0"));
        }
        if self.log_mode.parse::<LogLevel>().is_err() {
            return Err(anyhow!("Invalid log_mode '{}'", self.log_mode));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than 0"));
        }
        if self.tcp_backlog <= 0 {
            return Err(anyhow!("tcp_backlog must be greater than 0"));
        }
        Ok(())
    }
}

/// Socket tuning applied to listeners and accepted connections
#[derive(Debug, Clone, Copy)]
pub struct ConnConfig {
    /// Upstream connect timeout
    pub connect_timeout: Duration,
    /// TCP listen backlog
    pub tcp_backlog: i32,
    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tcp_backlog: DEFAULT_TCP_BACKLOG,
            tcp_nodelay: true,
        }
    }
}

impl ConnConfig {
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            connect_timeout: cli.connect_timeout,
            tcp_backlog: cli.tcp_backlog,
            tcp_nodelay: cli.tcp_nodelay,
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub login_host: String,
    pub login_port: u16,
    pub game_host: String,
    pub game_port: u16,
    pub destination_login_host: String,
    pub destination_login_port: u16,
    /// Endpoint the client is told to connect to for the game
    pub announce_host: String,
    pub announce_port: u16,
    /// Key used for RSA blocks forwarded upstream
    pub rsa_key: RsaKey,
    pub debug: bool,
    pub plugins: Vec<String>,
    pub route_ttl: Option<Duration>,
    pub conn: ConnConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let game_port = DEFAULT_LOGIN_PORT - 1;
        Self {
            login_host: DEFAULT_LOGIN_HOST.to_string(),
            login_port: DEFAULT_LOGIN_PORT,
            game_host: DEFAULT_LOGIN_HOST.to_string(),
            game_port,
            destination_login_host: DEFAULT_DESTINATION_LOGIN_HOST.to_string(),
            destination_login_port: DEFAULT_DESTINATION_LOGIN_PORT,
            announce_host: DEFAULT_LOGIN_HOST.to_string(),
            announce_port: game_port,
            rsa_key: RsaKey::Open,
            debug: false,
            plugins: Vec::new(),
            route_ttl: None,
            conn: ConnConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Resolve defaults that depend on other options
    pub fn from_cli(cli: &CliArgs) -> Self {
        let game_host = cli
            .listen_game_host
            .clone()
            .unwrap_or_else(|| cli.listen_login_host.clone());
        let game_port = cli
            .listen_game_port
            .unwrap_or_else(|| cli.listen_login_port.saturating_sub(1));
        let plugins = cli
            .plugins
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            login_host: cli.listen_login_host.clone(),
            login_port: cli.listen_login_port,
            announce_host: cli.announce_host.clone().unwrap_or_else(|| game_host.clone()),
            announce_port: cli.announce_port.unwrap_or(game_port),
            game_host,
            game_port,
            destination_login_host: cli.destination_login_host.clone(),
            destination_login_port: cli.destination_login_port,
            rsa_key: RsaKey::from_real_flag(cli.real_tibia),
            debug: cli.debug,
            plugins,
            route_ttl: cli.route_ttl,
            conn: ConnConfig::from_cli(cli),
        }
    }

    pub fn login_addr(&self) -> String {
        format!("{}:{}", self.login_host, self.login_port)
    }

    pub fn game_addr(&self) -> String {
        format!("{}:{}", self.game_host, self.game_port)
    }

    pub fn destination_login_addr(&self) -> String {
        format!(
            "{}:{}",
            self.destination_login_host, self.destination_login_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cli_args() -> CliArgs {
        CliArgs {
            listen_login_host: "127.0.0.1".to_string(),
            listen_login_port: 7171,
            listen_game_host: None,
            listen_game_port: None,
            destination_login_host: "127.0.0.1".to_string(),
            destination_login_port: 7172,
            announce_host: None,
            announce_port: None,
            real_tibia: false,
            debug: false,
            plugins: vec!["greeting".to_string()],
            route_ttl: None,
            log_mode: "info".to_string(),
            connect_timeout: Duration::from_secs(10),
            tcp_backlog: 128,
            tcp_nodelay: true,
        }
    }

    #[test]
    fn test_cli_args_validate_success() {
        assert!(create_test_cli_args().validate().is_ok());
    }

    #[test]
    fn test_cli_args_parse_defaults() {
        let cli = CliArgs::try_parse_from(["tibia-proxy"]).unwrap();
        assert_eq!(cli.listen_login_host, "127.0.0.1");
        assert_eq!(cli.listen_login_port, 7171);
        assert_eq!(cli.destination_login_port, 7172);
        assert_eq!(cli.plugins, vec!["greeting".to_string()]);
        assert!(!cli.real_tibia);
        assert!(cli.tcp_nodelay);
        assert!(cli.route_ttl.is_none());
    }

    #[test]
    fn test_cli_args_parse_flags() {
        let cli = CliArgs::try_parse_from([
            "tibia-proxy",
            "--real_tibia",
            "--debug",
            "--plugin",
            "greeting,other",
            "--route_ttl",
            "10m",
            "--tcp_nodelay",
            "false",
        ])
        .unwrap();
        assert!(cli.real_tibia);
        assert!(cli.debug);
        assert_eq!(cli.plugins, vec!["greeting", "other"]);
        assert_eq!(cli.route_ttl, Some(Duration::from_secs(600)));
        assert!(!cli.tcp_nodelay);
    }

    #[test]
    fn test_cli_args_validate_empty_hosts() {
        let mut cli = create_test_cli_args();
        cli.listen_login_host = "".to_string();
        assert!(cli.validate().is_err());

        let mut cli = create_test_cli_args();
        cli.destination_login_host = "".to_string();
        assert!(cli.validate().is_err());

        let mut cli = create_test_cli_args();
        cli.announce_host = Some("".to_string());
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_args_validate_zero_ports() {
        let mut cli = create_test_cli_args();
        cli.listen_login_port = 0;
        assert!(cli.validate().is_err());

        let mut cli = create_test_cli_args();
        cli.destination_login_port = 0;
        assert!(cli.validate().is_err());

        let mut cli = create_test_cli_args();
        cli.announce_port = Some(0);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_args_validate_derived_game_port_underflow() {
        let mut cli = create_test_cli_args();
        cli.listen_login_port = 1;
        assert!(cli.validate().is_err());

        cli.listen_game_port = Some(2);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_args_validate_zero_route_ttl() {
        let mut cli = create_test_cli_args();
        cli.route_ttl = Some(Duration::ZERO);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_args_validate_zero_connect_timeout() {
        let mut cli = create_test_cli_args();
        cli.connect_timeout = Duration::ZERO;
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_args_validate_log_mode() {
        let mut cli = create_test_cli_args();
        cli.log_mode = "verbose".to_string();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_proxy_config_derived_defaults() {
        let config = ProxyConfig::from_cli(&create_test_cli_args());
        assert_eq!(config.game_host, "127.0.0.1");
        assert_eq!(config.game_port, 7170);
        assert_eq!(config.announce_host, "127.0.0.1");
        assert_eq!(config.announce_port, 7170);
        assert_eq!(config.rsa_key, RsaKey::Open);
        assert_eq!(config.login_addr(), "127.0.0.1:7171");
        assert_eq!(config.game_addr(), "127.0.0.1:7170");
        assert_eq!(config.destination_login_addr(), "127.0.0.1:7172");
    }

    #[test]
    fn test_proxy_config_explicit_values() {
        let mut cli = create_test_cli_args();
        cli.listen_game_host = Some("0.0.0.0".to_string());
        cli.listen_game_port = Some(7200);
        cli.announce_host = Some("1.2.3.4".to_string());
        cli.announce_port = Some(7000);
        cli.real_tibia = true;
        cli.plugins = vec![" greeting ".to_string(), "".to_string()];
        let config = ProxyConfig::from_cli(&cli);
        assert_eq!(config.game_addr(), "0.0.0.0:7200");
        assert_eq!(config.announce_host, "1.2.3.4");
        assert_eq!(config.announce_port, 7000);
        assert_eq!(config.rsa_key, RsaKey::Real);
        assert_eq!(config.plugins, vec!["greeting".to_string()]);
    }

    #[test]
    fn test_announce_follows_game_listener() {
        let mut cli = create_test_cli_args();
        cli.listen_game_host = Some("10.1.1.1".to_string());
        let config = ProxyConfig::from_cli(&cli);
        assert_eq!(config.announce_host, "10.1.1.1");
    }

    #[test]
    fn test_proxy_config_default_matches_cli_defaults() {
        let from_cli = ProxyConfig::from_cli(&CliArgs::try_parse_from(["tibia-proxy"]).unwrap());
        let default = ProxyConfig::default();
        assert_eq!(from_cli.login_addr(), default.login_addr());
        assert_eq!(from_cli.game_addr(), default.game_addr());
        assert_eq!(from_cli.announce_port, default.announce_port);
        assert_eq!(from_cli.conn.tcp_backlog, default.conn.tcp_backlog);
        assert_eq!(from_cli.conn.connect_timeout, default.conn.connect_timeout);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("120").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("").is_err());
    }
}
