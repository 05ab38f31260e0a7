use crate::{errors::Error, login::status::{LoginStatus, QrEvent}, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingScan,
    Confirmed,
    TimedOut,
}

/// Timeout-counting state machine for one QR login attempt.
///
/// Every status event goes through [`Handshake::on_event`]. Each `408`
/// status is counted and the attempt fails once the count exceeds
/// `timeout_max`; a single `400` fails it immediately. The counter is never
/// reset: retrying means building a new `Handshake`.
#[derive(Debug)]
pub struct Handshake {
    timeout_max: u32,
    timeouts: u32,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(timeout_max: u32) -> Self {
        Self {
            timeout_max,
            timeouts: 0,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Feed one status event.
    ///
    /// Returns `Ok(())` when the event should be forwarded to the caller's
    /// observer, or `Error::LoginTimeout` when the attempt must stop.
    pub fn on_event(&mut self, event: &QrEvent) -> Result<()> {
        if self.state == HandshakeState::TimedOut {
            return Err(timeout_error(event));
        }

        match event.status {
            LoginStatus::ExpiredWaitingScan => {
                self.timeouts = self.timeouts.saturating_add(1);
                if self.timeouts > self.timeout_max {
                    self.state = HandshakeState::TimedOut;
                    return Err(timeout_error(event));
                }
            }
            LoginStatus::ExpiredUnconfirmed => {
                self.state = HandshakeState::TimedOut;
                return Err(timeout_error(event));
            }
            LoginStatus::LoggedIn => self.state = HandshakeState::Confirmed,
            _ => {}
        }

        if self.state == HandshakeState::Idle {
            self.state = HandshakeState::AwaitingScan;
        }
        Ok(())
    }

    /// The remote service reported a fully completed login.
    pub fn complete(&mut self) {
        if self.state != HandshakeState::TimedOut {
            self.state = HandshakeState::Confirmed;
        }
    }
}

fn timeout_error(event: &QrEvent) -> Error {
    Error::LoginTimeout {
        uuid: event.uuid.0.clone(),
        status: event.status.code().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(status: &str) -> QrEvent {
        QrEvent::new("uuid-1", LoginStatus::from_code(status), Vec::new())
    }

    #[test]
    fn tolerates_up_to_timeout_max_expirations() {
        for max in [1u32, 3, 15] {
            let mut h = Handshake::new(max);
            for _ in 0..max {
                h.on_event(&ev("408")).unwrap();
            }
            assert_eq!(h.timeouts(), max);
            assert_eq!(h.state(), HandshakeState::AwaitingScan);

            let err = h.on_event(&ev("408")).unwrap_err();
            match err {
                Error::LoginTimeout { uuid, status } => {
                    assert_eq!(uuid, "uuid-1");
                    assert_eq!(status, "408");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(h.state(), HandshakeState::TimedOut);
        }
    }

    #[test]
    fn expired_unconfirmed_fails_immediately() {
        let mut h = Handshake::new(15);
        let err = h.on_event(&ev("400")).unwrap_err();
        assert!(matches!(err, Error::LoginTimeout { ref status, .. } if status == "400"));

        let mut h = Handshake::new(15);
        h.on_event(&ev("0")).unwrap();
        h.on_event(&ev("408")).unwrap();
        let err = h.on_event(&ev("400")).unwrap_err();
        assert!(matches!(err, Error::LoginTimeout { ref status, .. } if status == "400"));
    }

    #[test]
    fn other_statuses_do_not_count() {
        let mut h = Handshake::new(1);
        for code in ["0", "201", "1102", "0"] {
            h.on_event(&ev(code)).unwrap();
        }
        assert_eq!(h.timeouts(), 0);
        h.on_event(&ev("200")).unwrap();
        assert_eq!(h.state(), HandshakeState::Confirmed);
    }

    #[test]
    fn counter_is_not_reset_by_other_statuses() {
        let mut h = Handshake::new(2);
        h.on_event(&ev("408")).unwrap();
        h.on_event(&ev("201")).unwrap();
        h.on_event(&ev("408")).unwrap();
        assert!(h.on_event(&ev("408")).is_err());
    }

    #[test]
    fn timed_out_stays_timed_out() {
        let mut h = Handshake::new(15);
        let _ = h.on_event(&ev("400"));
        h.complete();
        assert_eq!(h.state(), HandshakeState::TimedOut);
        assert!(h.on_event(&ev("0")).is_err());
    }
}
