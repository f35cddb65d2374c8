//! warden authenticates customers and merchants by phone number.
//!
//! Accounts are onboarded through one-time codes, sessions are JWT pairs
//! revoked by a per-principal watermark, and customers keep a small address
//! book with a single primary entry.

#![forbid(unsafe_code)]
pub mod address;
pub mod cache;
pub mod captcha;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod deadline;
pub mod error;
pub mod lease;
mod middleware;
pub mod notify;
pub mod otp;
pub mod pending;
pub mod principal;
mod router;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer,
};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::address::{AddressInvariantManager, PgAddressStore};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::captcha::{CacheCaptcha, CaptchaGate, CaptchaVerifier, RemoteCaptcha};
use crate::clock::{Clock, SystemClock};
use crate::crypto::PasswordManager;
use crate::notify::LogSender;
use crate::principal::{
    Dependencies, PgAccountRepository, PrincipalKind, PrincipalService,
};
use crate::token::TokenService;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub customers: PrincipalService,
    pub merchants: PrincipalService,
    pub addresses: AddressInvariantManager,
    pub captcha: CaptchaGate,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    fn scope(&self, service: &PrincipalService) -> router::Scope {
        router::Scope {
            service: service.clone(),
            captcha: self.captcha.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        // Outer guard, the per-request deadline fires first.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout() + Duration::from_secs(1),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let customers = state.scope(&state.customers);
    let merchants = state.scope(&state.merchants);

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .nest("/public/customers", router::public_router(customers.clone()))
        .nest("/public/merchants", router::public_router(merchants.clone()))
        .nest(
            "/private/customers",
            router::private_router(customers).nest(
                "/address",
                router::address_router(
                    state.addresses.clone(),
                    state.customers.clone(),
                ),
            ),
        )
        .nest("/private/merchants", router::private_router(merchants))
        .layer(AxumMiddleware::from_fn_with_state(
            Arc::clone(&state.config),
            middleware::deadline,
        ))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!(error = %err, "no `.env` file loaded");
    }

    // read configuration file. let it in memory.
    let config = config::Configuration::default().read();

    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file or `DB_URL`");
        return Err("PostgreSQL is not configured".into());
    };
    let pool = database::connect(postgres).await?;

    let cache: Arc<dyn Cache> = match &config.redis {
        Some(redis) => Arc::new(RedisCache::connect(&redis.url).await?),
        None => {
            tracing::warn!("no `redis` entry, leases are not shared across replicas");
            Arc::new(MemoryCache::new())
        },
    };

    if config.token.access_secret.is_empty() || config.token.refresh_secret.is_empty() {
        tracing::error!("missing `ACCESS_TOKEN_SECRET` or `REFRESH_TOKEN_SECRET`");
        return Err("token secrets are not configured".into());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let production = config.env.is_production();
    let deps = Dependencies {
        tokens: TokenService::new(
            &config.token.access_secret,
            &config.token.refresh_secret,
            config.token.access_ttl(),
            config.token.refresh_ttl(),
            Arc::clone(&cache),
            Arc::clone(&clock),
        ),
        passwords: PasswordManager::new(config.argon2.clone())?,
        sender: Arc::new(LogSender {
            reveal: !production,
        }),
        clock,
        otp: config.otp.clone(),
        cache: Arc::clone(&cache),
    };

    let customers = PrincipalService::new(
        PrincipalKind::Customer,
        Arc::new(PgAccountRepository::new(pool.clone(), PrincipalKind::Customer)),
        &deps,
    );
    let merchants = PrincipalService::new(
        PrincipalKind::Merchant,
        Arc::new(PgAccountRepository::new(pool.clone(), PrincipalKind::Merchant)),
        &deps,
    );

    let verifier: Arc<dyn CaptchaVerifier> = match &config.captcha {
        Some(captcha) => Arc::new(RemoteCaptcha::new(
            &captcha.url,
            captcha.secret.clone(),
            config.request_timeout(),
        )?),
        None if production => {
            tracing::error!("missing `captcha` entry on `config.yaml` file or `CAPTCHA_BASE_URL`");
            return Err("captcha service is not configured".into());
        },
        None => {
            tracing::warn!("no `captcha` entry, answers are read from the cache");
            Arc::new(CacheCaptcha::new(Arc::clone(&cache)))
        },
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(AppState {
        config,
        customers,
        merchants,
        addresses: AddressInvariantManager::new(Arc::new(PgAddressStore::new(pool))),
        captcha: CaptchaGate::new(verifier, !production),
        metrics,
    })
}
