use std::time::Duration;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the core can
/// tell a QR handshake timeout apart from a failing remote service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The QR code expired before it was scanned, or was scanned but never confirmed.
    #[error("login timed out: uuid={uuid}, status={status}")]
    LoginTimeout { uuid: String, status: String },

    #[error("no login session uuid after {waited:?}")]
    UuidUnavailable { waited: Duration },

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_login_timeout(&self) -> bool {
        matches!(self, Error::LoginTimeout { .. })
    }
}

// `std::io::Error` is not `Clone`; the copy keeps its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::LoginTimeout { uuid, status } => Error::LoginTimeout {
                uuid: uuid.clone(),
                status: status.clone(),
            },
            Error::UuidUnavailable { waited } => Error::UuidUnavailable { waited: *waited },
            Error::Config(m) => Error::Config(m.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Protocol(m) => Error::Protocol(m.clone()),
            Error::External(m) => Error::External(m.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_timeout_is_recognized() {
        let e = Error::LoginTimeout {
            uuid: "u1".to_string(),
            status: "408".to_string(),
        };
        assert!(e.is_login_timeout());
        assert!(!Error::External("down".to_string()).is_login_timeout());
    }

    #[test]
    fn cloned_io_error_keeps_kind_and_message() {
        let e = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "qr.png missing",
        ));
        let copy = e.clone();
        assert!(matches!(&copy, Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound));
        assert_eq!(copy.to_string(), e.to_string());
    }
}
