use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter directive used when RUST_LOG is unset
fn default_directive(level: LogLevel) -> String {
    format!("tibia_proxy={}", level.as_str())
}

/// Install the global subscriber. RUST_LOG takes precedence over `log_mode`.
pub fn init_logger(log_mode: &str) {
    let filter = if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        env_filter
    } else {
        let level = log_mode.parse::<LogLevel>().unwrap_or_default();
        EnvFilter::new(default_directive(level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(true)
                .with_ansi(true)
                .compact(),
        )
        .init();
}

pub mod log {
    pub use tracing::{debug, enabled, error, info, trace, warn, Level};

    use crate::error::ProxyError;
    use std::net::SocketAddr;

    /// Log connection event
    pub fn connection(listener: &str, peer: SocketAddr, event: &str) {
        info!(listener = listener, peer = %peer, event = event, "Connection");
    }

    /// Level a session-ending error is logged at
    pub fn session_error_level(err: &ProxyError) -> Level {
        if err.is_peer_closed() {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Log a session that ended with an error
    ///
    /// The error text carries the failing step. A peer hanging up is routine
    /// and logged at info; everything else is a warning.
    pub fn session_error(listener: &str, peer: SocketAddr, err: &ProxyError) {
        if session_error_level(err) == Level::INFO {
            info!(listener = listener, peer = %peer, kind = err.kind(), error = %err, "Session ended by peer");
        } else {
            warn!(listener = listener, peer = %peer, kind = err.kind(), error = %err, "Session failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("Warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_default_and_display() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(LogLevel::Trace), "tibia_proxy=trace");
    }

    #[test]
    fn test_session_error_level() {
        use crate::error::ProxyError;
        use std::io;

        let closed = ProxyError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "early eof"));
        assert_eq!(log::session_error_level(&closed), log::Level::INFO);

        let reset = ProxyError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(log::session_error_level(&reset), log::Level::WARN);

        let short = ProxyError::UnexpectedEof {
            needed: 4,
            remaining: 0,
        };
        assert_eq!(log::session_error_level(&short), log::Level::WARN);

        let upstream = ProxyError::Upstream("forward login request: broken pipe".to_string());
        assert_eq!(log::session_error_level(&upstream), log::Level::WARN);
    }
}
