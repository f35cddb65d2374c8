//! Address book routes. The owner is always the token's username.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::Valid;
use crate::address::{Address, AddressInvariantManager, AddressPatch, NewAddress};
use crate::error::{Result, ServerError};
use crate::token::Claims;

fn parse_id(id: &str) -> Result<i64> {
    id.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ServerError::validation("Invalid address ID"))
}

pub async fn add(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<NewAddress>,
) -> Result<(StatusCode, Json<Vec<Address>>)> {
    let addresses = manager.add(&claims.username, &body).await?;
    Ok((StatusCode::CREATED, Json(addresses)))
}

pub async fn update(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Valid(body): Valid<AddressPatch>,
) -> Result<Json<Vec<Address>>> {
    let id = parse_id(&id)?;
    Ok(Json(manager.update(&claims.username, id, &body).await?))
}

pub async fn remove(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Address>>> {
    let id = parse_id(&id)?;
    Ok(Json(manager.remove(&claims.username, id).await?))
}

pub async fn list(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(manager.list(&claims.username).await?))
}

pub async fn primary(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Address>> {
    Ok(Json(manager.primary(&claims.username).await?))
}

pub async fn set_primary(
    State(manager): State<AddressInvariantManager>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Address>>> {
    let id = parse_id(&id)?;
    Ok(Json(manager.set_primary(&claims.username, id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use super::parse_id;
    use crate::router::public::tests::logged_in;
    use crate::router::tests::{body, state};
    use crate::*;

    const BASE: &str = "/private/customers/address";

    fn address(name: &str) -> String {
        json!({
            "phone_number": "01712345678",
            "full_name": name,
            "division": "Dhaka",
            "district": "Dhaka",
            "union": "Gulshan",
            "division_slug": "dhaka",
            "district_slug": "dhaka",
            "address": "House 12, Road 4",
        })
        .to_string()
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        for id in ["abc", "-1", "0", ""] {
            assert_eq!(parse_id(id).unwrap_err().to_string(), "Invalid address ID");
        }
    }

    #[tokio::test]
    async fn test_address_handlers() {
        let app = app(state());
        let tokens = logged_in(&app).await;
        let token = Some(tokens.access_token.as_str());

        let response =
            make_request(token, app.clone(), Method::GET, &format!("{BASE}/primary"), String::default())
                .await;
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);

        let response =
            make_request(token, app.clone(), Method::POST, BASE, address("Home")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let list: Vec<Value> = body(response).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["is_primary"], true);
        assert_eq!(list[0]["union"], "Gulshan");
        let home = list[0]["id"].as_i64().unwrap();

        let response =
            make_request(token, app.clone(), Method::POST, BASE, address("Office")).await;
        let list: Vec<Value> = body(response).await;
        let office = list
            .iter()
            .find(|a| a["full_name"] == "Office")
            .and_then(|a| a["id"].as_i64())
            .unwrap();

        let response = make_request(
            token,
            app.clone(),
            Method::POST,
            &format!("{BASE}/primary/{office}"),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(token, app.clone(), Method::GET, &format!("{BASE}/primary"), String::default())
                .await;
        let primary: Value = body(response).await;
        assert_eq!(primary["id"], office);

        let response = make_request(
            token,
            app.clone(),
            Method::PATCH,
            &format!("{BASE}/{home}"),
            json!({ "address": "House 7, Road 1" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            token,
            app.clone(),
            Method::DELETE,
            &format!("{BASE}/{home}"),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(token, app.clone(), Method::GET, &format!("{BASE}/all"), String::default())
                .await;
        let list: Vec<Value> = body(response).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], office);

        let response = make_request(
            token,
            app,
            Method::DELETE,
            &format!("{BASE}/abc"),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: Value = body(response).await;
        assert_eq!(error["detail"], "Invalid address ID");
    }

    #[tokio::test]
    async fn test_address_requires_token() {
        let app = app(state());

        let response =
            make_request(None, app, Method::GET, &format!("{BASE}/all"), String::default()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
