use std::io;
use thiserror::Error;

/// Unified error type for the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Read past the end of a message
    #[error("Unexpected end of message: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// Frame length, padding or checksum does not add up
    #[error("Framing error: {0}")]
    Framing(String),

    /// Decrypted handshake structure failed a sanity check
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Real server closed or failed mid-handshake
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Game connection without a login-derived route
    #[error("Routing error: no world recorded for character {0:?}")]
    Routing(String),
}

impl ProxyError {
    /// Short label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Io(_) => "io",
            ProxyError::Config(_) => "config",
            ProxyError::UnexpectedEof { .. } | ProxyError::Framing(_) => "framing",
            ProxyError::Handshake(_) => "handshake",
            ProxyError::Upstream(_) => "upstream",
            ProxyError::Routing(_) => "routing",
        }
    }
}

impl ProxyError {
    /// The peer closed its side before the session finished
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, ProxyError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Attach the session step that failed to an I/O error
pub trait StepContext<T> {
    /// I/O against the client; stays `Io` with the step as prefix
    fn client_step(self, step: &str) -> Result<T>;

    /// I/O against the real server; becomes `Upstream`
    fn upstream_step(self, step: &str) -> Result<T>;
}

impl<T, E> StepContext<T> for std::result::Result<T, E>
where
    E: Into<ProxyError>,
{
    fn client_step(self, step: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            ProxyError::Io(io) => {
                ProxyError::Io(io::Error::new(io.kind(), format!("{}: {}", step, io)))
            }
            other => other,
        })
    }

    fn upstream_step(self, step: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            ProxyError::Io(io) => ProxyError::Upstream(format!("{}: {}", step, io)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err: ProxyError = io_err.into();
        let display = format!("{}", err);
        assert!(display.contains("IO error"));
        assert!(display.contains("reset by peer"));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_unexpected_eof_display() {
        let err = ProxyError::UnexpectedEof {
            needed: 4,
            remaining: 1,
        };
        let display = format!("{}", err);
        assert!(display.contains("needed 4 bytes"));
        assert!(display.contains("1 remaining"));
        assert_eq!(err.kind(), "framing");
    }

    #[test]
    fn test_framing_error_display() {
        let err = ProxyError::Framing("checksum mismatch".to_string());
        assert!(format!("{}", err).contains("Framing error"));
        assert_eq!(err.kind(), "framing");
    }

    #[test]
    fn test_handshake_error_display() {
        let err = ProxyError::Handshake("gamemaster flag set".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Handshake error"));
        assert!(display.contains("gamemaster flag set"));
        assert_eq!(err.kind(), "handshake");
    }

    #[test]
    fn test_upstream_error_display() {
        let err = ProxyError::Upstream("login server closed".to_string());
        assert!(format!("{}", err).contains("Upstream error"));
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn test_routing_error_display() {
        let err = ProxyError::Routing("Bob".to_string());
        let display = format!("{}", err);
        assert!(display.contains("\"Bob\""));
        assert_eq!(err.kind(), "routing");
    }

    #[test]
    fn test_config_error_kind() {
        let err = ProxyError::Config("invalid port".to_string());
        assert!(format!("{}", err).contains("Configuration error"));
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_error_into_anyhow() {
        fn fails() -> anyhow::Result<()> {
            Err(ProxyError::Routing("Alice".to_string()))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("Alice"));
    }

    #[test]
    fn test_client_step_keeps_kind() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "early eof"));
        let err = res.client_step("read game login").unwrap_err();
        assert_eq!(err.kind(), "io");
        assert!(err.is_peer_closed());
        assert!(err.to_string().contains("read game login: early eof"));
    }

    #[test]
    fn test_upstream_step_reclassifies_io() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        let err = res.upstream_step("forward login request").unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert!(!err.is_peer_closed());
        assert!(err.to_string().contains("forward login request: broken pipe"));
    }

    #[test]
    fn test_steps_leave_protocol_errors_alone() {
        let res: Result<()> = Err(ProxyError::Framing("bad checksum".to_string()));
        assert_eq!(res.upstream_step("read reply").unwrap_err().kind(), "framing");
        let res: Result<()> = Err(ProxyError::Routing("Bob".to_string()));
        assert_eq!(res.client_step("read game login").unwrap_err().kind(), "routing");
    }
}
