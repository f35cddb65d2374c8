//! Onboarding, login, password reset and token refresh.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{Message, Scope, Valid};
use crate::error::Result;
use crate::token::{TOKEN_TYPE, TokenPair};

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SignupBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub username: String,
    #[validate(length(
        min = 1,
        max = 128,
        message = "Name must be 1 to 128 characters long."
    ))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub password: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub captcha_id: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub captcha_value: String,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct VerifySignupBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub otp: String,
}

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub password: String,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ForgotPasswordBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub captcha_id: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub captcha_value: String,
}

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SetPasswordBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub otp: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub password: String,
}

fn validate_grant_type(grant_type: &str) -> std::result::Result<(), ValidationError> {
    // OAuth 2.0 refresh grant only.
    if grant_type != "refresh_token" {
        return Err(ValidationError::new("invalid_grant_type"));
    }

    Ok(())
}

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenBody {
    #[validate(custom(
        function = "validate_grant_type",
        message = "\"grant_type\" must be \"refresh_token\"."
    ))]
    pub grant_type: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub refresh_token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token_type: TOKEN_TYPE.to_owned(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }
    }
}

/// "OTP sent", revealing the code on non-production instances.
fn otp_sent(scope: &Scope, otp: Option<String>) -> (StatusCode, Json<Message>) {
    let otp = otp.filter(|_| !scope.config.env.is_production());
    (
        StatusCode::CREATED,
        Json(Message {
            message: "OTP sent".to_owned(),
            otp,
        }),
    )
}

pub async fn signup(
    State(scope): State<Scope>,
    Valid(body): Valid<SignupBody>,
) -> Result<(StatusCode, Json<Message>)> {
    scope
        .captcha
        .verify(&body.captcha_id, &body.captcha_value)
        .await?;

    let otp = scope
        .service
        .signup(&body.username, &body.full_name, &body.password)
        .await?;

    Ok(otp_sent(&scope, Some(otp)))
}

pub async fn verify_signup(
    State(scope): State<Scope>,
    Valid(body): Valid<VerifySignupBody>,
) -> Result<Json<Message>> {
    scope.service.verify_signup(&body.username, &body.otp).await?;
    Ok(Message::new("Verified"))
}

pub async fn login(
    State(scope): State<Scope>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<TokenResponse>> {
    let pair = scope.service.login(&body.username, &body.password).await?;
    Ok(Json(pair.into()))
}

pub async fn forgot_password(
    State(scope): State<Scope>,
    Valid(body): Valid<ForgotPasswordBody>,
) -> Result<(StatusCode, Json<Message>)> {
    scope
        .captcha
        .verify(&body.captcha_id, &body.captcha_value)
        .await?;

    let otp = scope.service.forgot_password(&body.username).await?;
    Ok(otp_sent(&scope, otp))
}

pub async fn set_password(
    State(scope): State<Scope>,
    Valid(body): Valid<SetPasswordBody>,
) -> Result<Json<Message>> {
    scope
        .service
        .set_password(&body.username, &body.otp, &body.password)
        .await?;
    Ok(Message::new("Password set"))
}

pub async fn token(
    State(scope): State<Scope>,
    Valid(body): Valid<TokenBody>,
) -> Result<Json<TokenResponse>> {
    let pair = scope.service.refresh(&body.refresh_token).await?;
    Ok(Json(pair.into()))
}
