use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Main error type for the ring join protocol
#[derive(Debug)]
pub enum RingJoinError {
    /// Configuration or CLI argument errors
    Config(String),

    /// No response arrived before the backoff delay exceeded its maximum
    PeerUnreachable {
        peer: SocketAddr,
        attempts: u32,
        waited: Duration,
    },

    /// Transport layer failures other than a timeout
    Transport(String),

    /// A message did not match what the current protocol step expects
    ProtocolViolation(String),

    /// Every identifier in the pool has been handed out
    PoolExhausted { capacity: u32 },

    /// System I/O errors
    Io(std::io::Error),
}

impl fmt::Display for RingJoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingJoinError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RingJoinError::PeerUnreachable {
                peer,
                attempts,
                waited,
            } => write!(
                f,
                "Peer unreachable: {} did not answer {} attempts over {:?}",
                peer, attempts, waited
            ),
            RingJoinError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RingJoinError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            RingJoinError::PoolExhausted { capacity } => write!(
                f,
                "Identifier pool exhausted: all {} identifiers are allocated",
                capacity
            ),
            RingJoinError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for RingJoinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RingJoinError::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, RingJoinError>;

impl RingJoinError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            RingJoinError::Config(_) => "configuration_error",
            RingJoinError::PeerUnreachable { .. } => "peer_unreachable",
            RingJoinError::Transport(_) => "transport_error",
            RingJoinError::ProtocolViolation(_) => "protocol_violation",
            RingJoinError::PoolExhausted { .. } => "pool_exhausted",
            RingJoinError::Io(_) => "io_error",
        }
    }

    /// Whether the rendezvous loop may keep serving after this error.
    pub fn is_per_request(&self) -> bool {
        matches!(
            self,
            RingJoinError::ProtocolViolation(_) | RingJoinError::PoolExhausted { .. }
        )
    }
}

// Conversions from common error types
impl From<std::io::Error> for RingJoinError {
    fn from(err: std::io::Error) -> Self {
        RingJoinError::Io(err)
    }
}

impl From<std::net::AddrParseError> for RingJoinError {
    fn from(err: std::net::AddrParseError) -> Self {
        RingJoinError::ProtocolViolation(format!("Invalid address: {}", err))
    }
}

impl From<std::num::ParseIntError> for RingJoinError {
    fn from(err: std::num::ParseIntError) -> Self {
        RingJoinError::ProtocolViolation(format!("Invalid identifier: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::RingJoinError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RingJoinError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_violation {
    ($msg:expr) => {
        $crate::error::RingJoinError::ProtocolViolation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RingJoinError::ProtocolViolation(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::RingJoinError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RingJoinError::Transport(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = RingJoinError::Config("Invalid port".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: Invalid port");

        let io_err = RingJoinError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(io_err.to_string().contains("I/O error"));

        let exhausted = RingJoinError::PoolExhausted { capacity: 50 };
        assert!(exhausted.to_string().contains("all 50 identifiers"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: RingJoinError = io_err.into();
        assert!(matches!(err, RingJoinError::Io(_)));

        let parse_err = "nope".parse::<u32>().unwrap_err();
        let err: RingJoinError = parse_err.into();
        assert_eq!(err.error_type(), "protocol_violation");
    }

    #[test]
    fn test_per_request_errors() {
        assert!(protocol_violation!("bad").is_per_request());
        assert!(RingJoinError::PoolExhausted { capacity: 1 }.is_per_request());
        assert!(!transport_error!("socket closed").is_per_request());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Port {} is invalid", 65536);
        assert_eq!(
            err.to_string(),
            "Configuration error: Port 65536 is invalid"
        );

        let err = protocol_violation!("unexpected reply");
        assert_eq!(err.to_string(), "Protocol violation: unexpected reply");
    }
}
