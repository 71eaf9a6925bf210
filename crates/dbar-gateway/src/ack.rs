//! # Gateway Acknowledgement Protocol
//!
//! The gateway reads only the response body: `1|OK` stops redelivery,
//! anything else schedules a retry. Every failure carries a 4xx status;
//! `Reject` and `Retry` differ only in the code, for logs and proxies.

/// Acknowledgement returned to the gateway for one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// `1|OK`: received; do not redeliver.
    Ok,
    /// `0|FAIL` with 400: the callback was not accepted
    /// (unauthenticated, unconfigured tenant, malformed).
    Reject,
    /// `0|FAIL` with 409: transient failure; redelivery is expected and
    /// safe.
    Retry,
}

impl Ack {
    /// Exact response body.
    pub fn body(self) -> &'static str {
        match self {
            Self::Ok => "1|OK",
            Self::Reject | Self::Retry => "0|FAIL",
        }
    }

    /// HTTP status code to send alongside the body.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Reject => 400,
            Self::Retry => 409,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}
