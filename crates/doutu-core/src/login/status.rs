use crate::domain::SessionUuid;

/// Status code emitted by the remote login service while a QR session is polled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginStatus {
    /// `0`: the session uuid is confirmed and its QR image can be shown.
    Confirmed,
    /// `201`: scanned, waiting for the user to confirm on the phone.
    Scanned,
    /// `200`: login accepted.
    LoggedIn,
    /// `408`: one polling window elapsed without a scan.
    ExpiredWaitingScan,
    /// `400`: the QR code expired.
    ExpiredUnconfirmed,
    /// Anything else is transient and passed through untouched.
    Other(String),
}

impl LoginStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => Self::Confirmed,
            "201" => Self::Scanned,
            "200" => Self::LoggedIn,
            "408" => Self::ExpiredWaitingScan,
            "400" => Self::ExpiredUnconfirmed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Confirmed => "0",
            Self::Scanned => "201",
            Self::LoggedIn => "200",
            Self::ExpiredWaitingScan => "408",
            Self::ExpiredUnconfirmed => "400",
            Self::Other(code) => code,
        }
    }
}

/// One `(uuid, status, qr image)` triple reported during login.
#[derive(Clone, Debug)]
pub struct QrEvent {
    pub uuid: SessionUuid,
    pub status: LoginStatus,
    /// PNG bytes of the QR code; empty when the service sent none with this status.
    pub qr_image: Vec<u8>,
}

impl QrEvent {
    pub fn new(uuid: impl Into<String>, status: LoginStatus, qr_image: Vec<u8>) -> Self {
        Self {
            uuid: SessionUuid(uuid.into()),
            status,
            qr_image,
        }
    }
}
