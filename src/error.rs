use thiserror::Error;
use tokio::time::error::Elapsed;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if we received a packet that does not have a type known to us.
    #[error("unknown rcon packet type: {0}")]
    UnknownPacketType(i32),
    /// Returned if the header is mangled in some way (bad offsets, size field
    /// out of range).
    #[error("packet header malformed (can't parse size, id or type)")]
    MalformedPacketHeader,
    /// Returned if the declared size of a packet disagrees with the number of
    /// bytes that actually arrived.
    #[error("packet declares {declared} bytes but {available} are available")]
    SizeMismatch { declared: i32, available: usize },
    /// Returned if the two trailing null bytes are missing.
    #[error("packet is not null terminated")]
    MissingTerminator,
    /// Returned if the body is mangled in some way.
    #[error("packet body malformed (not valid ascii or utf-8)")]
    MalformedPacketBody(#[from] std::str::Utf8Error),
    /// Returned if the server answered with a request id we never sent.
    #[error("unexpected response id {actual}, expected {expected}")]
    UnexpectedResponseId { expected: i32, actual: i32 },
    /// Returned before sending if a body would not fit in a single packet.
    #[error("packet body of {0} bytes is too large to send")]
    OversizedPacket(usize),
    /// Returned if the test console cannot listen on the requested address.
    #[error("cannot bind listener")]
    BindError(#[source] std::io::Error),
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// The stream was successfully established, but there was a problem
    /// writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// The stream was successfully established, but there was a problem
    /// reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// Returned if you can't remember the password.
    #[error("bad password")]
    AuthenticationError,
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    TimeoutError(#[from] Elapsed),
}

/// Coarse classification of a [RconError], used by callers to decide whether
/// a delivery is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Protocol,
    Authentication,
    Timeout,
}

impl RconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RconError::UnreachableHost(_)
            | RconError::BindError(_)
            | RconError::SendError(_)
            | RconError::ReceiveError(_) => ErrorKind::Connection,
            RconError::UnknownPacketType(_)
            | RconError::MalformedPacketHeader
            | RconError::SizeMismatch { .. }
            | RconError::MissingTerminator
            | RconError::MalformedPacketBody(_)
            | RconError::UnexpectedResponseId { .. }
            | RconError::OversizedPacket(_) => ErrorKind::Protocol,
            RconError::AuthenticationError => ErrorKind::Authentication,
            RconError::TimeoutError(_) => ErrorKind::Timeout,
        }
    }

    /// Connection drops and timeouts may go away on their own; a bad password
    /// or a server speaking a different dialect will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn connection_errors_are_retryable() {
        let err = RconError::UnreachableHost(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.is_retryable());
    }

    #[test]
    fn bad_password_is_not_retryable() {
        assert_eq!(RconError::AuthenticationError.kind(), ErrorKind::Authentication);
        assert!(!RconError::AuthenticationError.is_retryable());
    }

    #[test]
    fn size_mismatch_is_a_protocol_error() {
        let err = RconError::SizeMismatch {
            declared: 100,
            available: 12,
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(
            err.to_string(),
            "packet declares 100 bytes but 12 are available"
        );
    }
}
