//! Profile and credentials of the signed-in principal.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{Message, Scope, Valid};
use crate::error::Result;
use crate::principal::{Principal, ProfileUpdate, ShortProfile};
use crate::token::Claims;

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileBody {
    #[validate(length(max = 128, message = "Name must be at most 128 characters long."))]
    pub full_name: Option<String>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub occupation: Option<String>,
    pub organization: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_pic_url: Option<String>,
}

impl From<ProfileBody> for ProfileUpdate {
    fn from(body: ProfileBody) -> Self {
        Self {
            full_name: body.full_name,
            gender: body.gender,
            email: body.email,
            occupation: body.occupation,
            organization: body.organization,
            birth_date: body.birth_date,
            profile_pic_url: body.profile_pic_url,
        }
    }
}

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PasswordBody {
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "Missing required field(s)"))]
    pub new_password: String,
}

pub async fn profile(
    State(scope): State<Scope>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Principal>> {
    Ok(Json(scope.service.profile(&claims.username).await?))
}

pub async fn short_profile(
    State(scope): State<Scope>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ShortProfile>> {
    Ok(Json(scope.service.short_profile(&claims.username).await?))
}

pub async fn update_profile(
    State(scope): State<Scope>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<ProfileBody>,
) -> Result<Json<Principal>> {
    let principal = scope
        .service
        .update_profile(&claims.username, body.into())
        .await?;
    Ok(Json(principal))
}

/// Soft delete. The account can no longer log in.
pub async fn delete(
    State(scope): State<Scope>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Principal>> {
    Ok(Json(scope.service.delete(&claims.username).await?))
}

/// Reaching the handler means the middleware accepted the token.
pub async fn verify_token() -> Json<Message> {
    Message::new("Token verified")
}

pub async fn update_password(
    State(scope): State<Scope>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<PasswordBody>,
) -> Result<Json<Message>> {
    scope
        .service
        .update_password(&claims.username, &body.current_password, &body.new_password)
        .await?;
    Ok(Message::new("Password updated"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::principal::{Principal, ShortProfile, Status};
    use crate::router::public::tests::{PASSWORD, USERNAME, logged_in};
    use crate::router::tests::{body, state, state_with_clock};
    use crate::*;

    #[tokio::test]
    async fn test_profile_handlers() {
        let app = app(state());
        let tokens = logged_in(&app).await;
        let token = Some(tokens.access_token.as_str());

        let response = make_request(
            token,
            app.clone(),
            Method::GET,
            "/private/customers/profile",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile: serde_json::Value = body(response).await;
        assert_eq!(profile["username"], USERNAME);
        assert!(profile.get("password").is_none());

        let response = make_request(
            token,
            app.clone(),
            Method::PATCH,
            "/private/customers/profile",
            json!({
                "full_name": "  Rahim Uddin Ahmed ",
                "gender": "Male",
                "email": "Rahim@Example.com",
                "birth_date": "1994-03-12",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile: Principal = serde_json::from_value(body(response).await).unwrap();
        assert_eq!(profile.full_name, "Rahim Uddin Ahmed");
        assert_eq!(profile.gender.as_deref(), Some("male"));
        assert_eq!(profile.email.as_deref(), Some("rahim@example.com"));

        let response = make_request(
            token,
            app.clone(),
            Method::PATCH,
            "/private/customers/profile",
            json!({ "gender": "robot" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            token,
            app,
            Method::GET,
            "/private/customers/profile/short",
            String::default(),
        )
        .await;
        let short: ShortProfile = body(response).await;
        assert_eq!(short.full_name, "Rahim Uddin Ahmed");
        assert_eq!(short.status, Status::Active);
    }

    #[tokio::test]
    async fn test_authentication_is_required() {
        let app = app(state());
        let tokens = logged_in(&app).await;

        let response = make_request(
            None,
            app.clone(),
            Method::GET,
            "/private/customers/verify-token",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: serde_json::Value = body(response).await;
        assert_eq!(error["detail"], "Missing authorization token");

        let response = make_request(
            Some("not.a.token"),
            app.clone(),
            Method::GET,
            "/private/customers/verify-token",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Customer token on a merchant route.
        let response = make_request(
            Some(&tokens.access_token),
            app.clone(),
            Method::GET,
            "/private/merchants/verify-token",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: serde_json::Value = body(response).await;
        assert_eq!(error["detail"], "Restricted to merchants");

        let response = make_request(
            Some(&tokens.access_token),
            app,
            Method::GET,
            "/private/customers/verify-token",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_password_revokes_sessions() {
        let (state, clock) = state_with_clock();
        let app = app(state);
        let tokens = logged_in(&app).await;
        let token = Some(tokens.access_token.as_str());
        clock.advance(60);

        let response = make_request(
            token,
            app.clone(),
            Method::PUT,
            "/private/customers/password",
            json!({ "current_password": "Wrong#Pass1", "new_password": "Fresh#Pass1" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        let response = make_request(
            token,
            app.clone(),
            Method::PUT,
            "/private/customers/password",
            json!({ "current_password": PASSWORD, "new_password": "Fresh#Pass1" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            token,
            app,
            Method::GET,
            "/private/customers/profile",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: serde_json::Value = body(response).await;
        assert_eq!(error["detail"], "Session expired");
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let app = app(state());
        let tokens = logged_in(&app).await;

        let response = make_request(
            Some(&tokens.access_token),
            app.clone(),
            Method::DELETE,
            "/private/customers/profile",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let deleted: serde_json::Value = body(response).await;
        assert_eq!(deleted["is_deleted"], true);

        let response = make_request(
            Some(&tokens.access_token),
            app,
            Method::GET,
            "/private/customers/profile",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
