// Copyright 2023 Remi Bernotavicius

use super::extract::{ApiJson, ApiPath, CurrentUser, QueryPairs, Viewer};
use super::AppState;
use crate::catalog::{self, IngredientFilter, IngredientInput, TagInput};
use crate::database::models::{Ingredient, IngredientId, Tag, TagId};
use crate::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tags/", get(list_tags).post(create_tag))
        .route("/tags/{id}/", get(get_tag))
        .route("/ingredients/", get(list_ingredients).post(create_ingredient))
        .route("/ingredients/{id}/", get(get_ingredient))
}

async fn list_tags(State(state): State<AppState>, _: Viewer) -> Result<Json<Vec<Tag>>> {
    Ok(Json(state.run(|conn, _| catalog::list_tags(conn)).await?))
}

async fn get_tag(
    State(state): State<AppState>,
    _: Viewer,
    ApiPath(id): ApiPath<TagId>,
) -> Result<Json<Tag>> {
    Ok(Json(state.run(move |conn, _| catalog::get_tag(conn, id)).await?))
}

async fn create_tag(
    State(state): State<AppState>,
    _: CurrentUser,
    ApiJson(input): ApiJson<TagInput>,
) -> Result<(StatusCode, Json<Tag>)> {
    let tag = state
        .run(move |conn, _| catalog::create_tag(conn, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn list_ingredients(
    State(state): State<AppState>,
    _: Viewer,
    query: QueryPairs,
) -> Result<Json<Vec<Ingredient>>> {
    let filter = IngredientFilter {
        name: query.first("name").map(str::to_owned),
        measurement_unit: query.first("measurement_unit").map(str::to_owned),
    };
    Ok(Json(
        state
            .run(move |conn, _| catalog::list_ingredients(conn, &filter))
            .await?,
    ))
}

async fn get_ingredient(
    State(state): State<AppState>,
    _: Viewer,
    ApiPath(id): ApiPath<IngredientId>,
) -> Result<Json<Ingredient>> {
    Ok(Json(
        state
            .run(move |conn, _| catalog::get_ingredient(conn, id))
            .await?,
    ))
}

async fn create_ingredient(
    State(state): State<AppState>,
    _: CurrentUser,
    ApiJson(input): ApiJson<IngredientInput>,
) -> Result<(StatusCode, Json<Ingredient>)> {
    let ingredient = state
        .run(move |conn, _| catalog::create_ingredient(conn, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

#[cfg(test)]
use super::testing::TestApp;
#[cfg(test)]
use axum::http::Method;
#[cfg(test)]
use serde_json::json;

#[tokio::test]
async fn tags_endpoints() {
    let app = TestApp::new();
    let (_, token) = app.sign_up("cook").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/tags/",
            None,
            Some(json!({"name": "Lunch", "color": "#00FF00", "slug": "lunch"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let (status, tag) = app
        .request(
            Method::POST,
            "/api/tags/",
            Some(&token),
            Some(json!({"name": "Lunch", "color": "#00FF00", "slug": "lunch"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["slug"], "lunch");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/tags/",
            Some(&token),
            Some(json!({"name": "Lunch", "slug": "lunch2"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_string());

    let (status, tags) = app.request(Method::GET, "/api/tags/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags.as_array().unwrap().len(), 1);

    let uri = format!("/api/tags/{}/", tag["id"]);
    let (status, fetched) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, tag);

    let (status, _) = app.request(Method::GET, "/api/tags/99/", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.request(Method::GET, "/api/tags/abc/", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingredient_search() {
    let app = TestApp::new();
    let (_, token) = app.sign_up("cook").await;

    for (name, unit) in [("sugar", "g"), ("Sugar syrup", "ml"), ("salt", "g")] {
        let (status, _) = app
            .request(
                Method::POST,
                "/api/ingredients/",
                Some(&token),
                Some(json!({"name": name, "measurement_unit": unit})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, found) = app
        .request(Method::GET, "/api/ingredients/?name=su", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Sugar syrup", "sugar"]);

    let (_, found) = app
        .request(
            Method::GET,
            "/api/ingredients/?name=s&measurement_unit=g",
            None,
            None,
        )
        .await;
    assert_eq!(found.as_array().unwrap().len(), 2);

    let (status, _) = app
        .request(Method::GET, "/api/ingredients/", Some("bogus"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
