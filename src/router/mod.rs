//! HTTP API.
pub mod account;
pub mod address;
pub mod public;
pub mod status;

use std::sync::Arc;

use axum::extract::{FromRef, FromRequest, Request};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router, middleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::address::AddressInvariantManager;
use crate::captcha::CaptchaGate;
use crate::config::Configuration;
use crate::error::ServerError;
use crate::principal::PrincipalService;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Plain acknowledgement. `otp` is only filled outside production.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

impl Message {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_owned(),
            otp: None,
        })
    }
}

/// Everything the routes of one principal kind need.
#[derive(Clone)]
pub struct Scope {
    pub service: PrincipalService,
    pub captcha: CaptchaGate,
    pub config: Arc<Configuration>,
}

impl FromRef<Scope> for PrincipalService {
    fn from_ref(scope: &Scope) -> PrincipalService {
        scope.service.clone()
    }
}

/// Unauthenticated flows: onboarding, login, reset and refresh.
pub fn public_router<S>(scope: Scope) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/signup", post(public::signup))
        .route("/verify-signup", post(public::verify_signup))
        .route("/login", post(public::login))
        .route("/forgot-password", post(public::forgot_password))
        .route("/set-password", post(public::set_password))
        .route("/token", post(public::token))
        .with_state(scope)
}

/// Routes behind a bearer access token of the scope's kind.
pub fn private_router<S>(scope: Scope) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/profile",
            get(account::profile)
                .patch(account::update_profile)
                .delete(account::delete),
        )
        .route("/profile/short", get(account::short_profile))
        .route("/verify-token", get(account::verify_token))
        .route("/password", put(account::update_password))
        .route_layer(middleware::from_fn_with_state(
            scope.service.clone(),
            crate::middleware::authenticate,
        ))
        .with_state(scope)
}

/// Address book of the principals authenticated by `service`.
pub fn address_router<S>(
    manager: AddressInvariantManager,
    service: PrincipalService,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(address::add))
        .route("/{id}", patch(address::update).delete(address::remove))
        .route("/all", get(address::list))
        .route("/primary", get(address::primary))
        .route("/primary/{id}", post(address::set_primary))
        .route_layer(middleware::from_fn_with_state(
            service,
            crate::middleware::authenticate,
        ))
        .with_state(manager)
}
