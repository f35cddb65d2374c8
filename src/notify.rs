//! OTP delivery.

use async_trait::async_trait;

use crate::error::Result;
use crate::principal::PrincipalKind;

/// Port to push a code to the owner of a phone number.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, kind: PrincipalKind, username: &str, otp: &str) -> Result<()>;
}

/// Sender that only writes a log line. Codes are redacted unless the
/// instance runs outside production.
#[derive(Clone, Debug, Default)]
pub struct LogSender {
    pub reveal: bool,
}

#[async_trait]
impl OtpSender for LogSender {
    async fn send(&self, kind: PrincipalKind, username: &str, otp: &str) -> Result<()> {
        if self.reveal {
            tracing::info!(%kind, %username, %otp, "otp delivered");
        } else {
            tracing::info!(%kind, %username, "otp delivered");
        }

        Ok(())
    }
}

/// Sender recording every delivery.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSender {
    pub sent: std::sync::Mutex<Vec<(PrincipalKind, String, String)>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl OtpSender for RecordingSender {
    async fn send(&self, kind: PrincipalKind, username: &str, otp: &str) -> Result<()> {
        if self.fail {
            return Err(crate::error::ServerError::http(
                axum::http::StatusCode::BAD_GATEWAY,
                "OTP delivery failed",
            ));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((kind, username.to_owned(), otp.to_owned()));
        }
        Ok(())
    }
}
