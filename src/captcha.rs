//! Captcha checks on signup and password reset.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::cache::Cache;
use crate::deadline::bounded;
use crate::error::{Result, ServerError, ToInternal};

/// Answer accepted without lookup on non-production instances.
pub const BYPASS_VALUE: &str = "11111";
const VERIFY_PATH: &str = "/api/v1/verify-captcha";
const SECRET_HEADER: &str = "Secret-Key";

/// Port for captcha answer checks.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(())` when `value` answers the challenge `id`.
    async fn verify(&self, id: &str, value: &str) -> Result<()>;
}

/// Checks answers against the captcha service, which issued the challenge.
#[derive(Clone)]
pub struct RemoteCaptcha {
    client: Client,
    url: String,
    secret: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    id: &'a str,
    value: &'a str,
}

impl RemoteCaptcha {
    /// Create a new [`RemoteCaptcha`] for the service at `base_url`.
    pub fn new(base_url: &str, secret: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .catch()?;

        Ok(Self {
            client,
            url: format!("{}{VERIFY_PATH}", base_url.trim_end_matches('/')),
            secret,
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RemoteCaptcha {
    async fn verify(&self, id: &str, value: &str) -> Result<()> {
        let request = self
            .client
            .post(&self.url)
            .header(SECRET_HEADER, &self.secret)
            .json(&VerifyRequest { id, value })
            .send();
        let response = bounded(async {
            request.await.map_err(|err| {
                tracing::error!(error = %err, "captcha service unreachable");
                ServerError::validation("Captcha verification failed")
            })
        })
        .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => {
                tracing::debug!(%status, %id, "captcha rejected");
                Err(ServerError::validation("Invalid captcha"))
            },
        }
    }
}

/// Answers stored by whoever rendered the challenge, under `captcha_{id}`.
/// Answers are single use, right or wrong.
#[derive(Clone)]
pub struct CacheCaptcha {
    cache: Arc<dyn Cache>,
}

impl CacheCaptcha {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CaptchaVerifier for CacheCaptcha {
    async fn verify(&self, id: &str, value: &str) -> Result<()> {
        let key = format!("captcha_{id}");
        let answer = self.cache.get(&key).await?;
        if answer.is_some() {
            self.cache.delete(&key).await?;
        }

        match answer {
            Some(answer) if answer.eq_ignore_ascii_case(value) => Ok(()),
            _ => Err(ServerError::validation("Invalid captcha")),
        }
    }
}

/// Gate in front of a [`CaptchaVerifier`], honouring the bypass answer
/// outside production.
#[derive(Clone)]
pub struct CaptchaGate {
    verifier: Arc<dyn CaptchaVerifier>,
    allow_bypass: bool,
}

impl CaptchaGate {
    /// Create a new [`CaptchaGate`]. `allow_bypass` must be off in
    /// production.
    pub fn new(verifier: Arc<dyn CaptchaVerifier>, allow_bypass: bool) -> Self {
        Self {
            verifier,
            allow_bypass,
        }
    }

    pub async fn verify(&self, id: &str, value: &str) -> Result<()> {
        if self.allow_bypass && value == BYPASS_VALUE {
            return Ok(());
        }

        self.verifier.verify(id, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use tokio::net::TcpListener;

    fn cached(cache: &Arc<dyn Cache>, allow_bypass: bool) -> CaptchaGate {
        CaptchaGate::new(Arc::new(CacheCaptcha::new(Arc::clone(cache))), allow_bypass)
    }

    /// Captcha service accepting `x7k2p` for any id, with the right secret.
    async fn captcha_service() -> String {
        let app = Router::new().route(
            VERIFY_PATH,
            post(|headers: HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| async move {
                let authorized = headers
                    .get(SECRET_HEADER)
                    .is_some_and(|secret| secret == "captcha-secret");
                if !authorized {
                    return axum::http::StatusCode::UNAUTHORIZED;
                }
                if body["value"] == "x7k2p" && body["id"].is_string() {
                    axum::http::StatusCode::OK
                } else {
                    axum::http::StatusCode::BAD_REQUEST
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        format!("http://{address}/")
    }

    #[tokio::test]
    async fn test_answer_is_single_use() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        cache.set("captcha_abc", "x7k2p", None).await.unwrap();
        let gate = cached(&cache, false);

        gate.verify("abc", "X7K2P").await.unwrap();
        let err = gate.verify("abc", "x7k2p").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid captcha");
    }

    #[tokio::test]
    async fn test_wrong_answer_burns_it() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        cache.set("captcha_abc", "x7k2p", None).await.unwrap();
        let gate = cached(&cache, false);

        assert!(gate.verify("abc", "wrong").await.is_err());
        assert!(gate.verify("abc", "x7k2p").await.is_err());
    }

    #[tokio::test]
    async fn test_bypass_only_when_allowed() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

        let dev = cached(&cache, true);
        dev.verify("any", BYPASS_VALUE).await.unwrap();

        let prod = cached(&cache, false);
        assert!(prod.verify("any", BYPASS_VALUE).await.is_err());
    }

    #[tokio::test]
    async fn test_remote_service_decides() {
        let base = captcha_service().await;
        let timeout = Duration::from_secs(5);

        let gate = CaptchaGate::new(
            Arc::new(RemoteCaptcha::new(&base, "captcha-secret".into(), timeout).unwrap()),
            false,
        );
        gate.verify("abc", "x7k2p").await.unwrap();
        let err = gate.verify("abc", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid captcha");

        let gate = CaptchaGate::new(
            Arc::new(RemoteCaptcha::new(&base, "nope".into(), timeout).unwrap()),
            false,
        );
        assert!(gate.verify("abc", "x7k2p").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let remote = RemoteCaptcha::new(
            &format!("http://{address}"),
            "captcha-secret".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = remote.verify("abc", "x7k2p").await.unwrap_err();
        assert_eq!(err.to_string(), "Captcha verification failed");
    }
}
