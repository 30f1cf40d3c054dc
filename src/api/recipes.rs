// Copyright 2023 Remi Bernotavicius

use super::extract::{ApiJson, ApiPath, CurrentUser, QueryPairs, Viewer};
use super::AppState;
use crate::database::models::RecipeId;
use crate::pagination::{Page, PageNumber};
use crate::recipes::{
    self, memberships, shopping_list, write, Membership, RecipeFilter, RecipeInput, RecipeSummary,
    RecipeView,
};
use crate::Result;
use axum::extract::{OriginalUri, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/download_shopping_cart/",
            get(download_shopping_cart),
        )
        .route(
            "/recipes/{id}/",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/recipes/{id}/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/recipes/{id}/shopping_cart/",
            post(add_to_cart).delete(remove_from_cart),
        )
}

async fn list_recipes(
    State(state): State<AppState>,
    viewer: Viewer,
    OriginalUri(uri): OriginalUri,
    query: QueryPairs,
) -> Result<Json<Page<RecipeView>>> {
    let filter = RecipeFilter::from_pairs(&query.0)?;
    let page = PageNumber::from_params(
        query.first("page"),
        query.first("limit").or(query.first("page_size")),
        state.page_size,
    )?;
    let viewer = viewer.id();

    let (count, results) = state
        .run(move |conn, media| recipes::list(conn, media, viewer, &filter, page))
        .await?;
    Ok(Json(page.page(uri.path(), &query.0, count, results)))
}

async fn get_recipe(
    State(state): State<AppState>,
    viewer: Viewer,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<Json<RecipeView>> {
    let viewer = viewer.id();
    Ok(Json(
        state
            .run(move |conn, media| recipes::get(conn, media, viewer, id))
            .await?,
    ))
}

async fn create_recipe(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    ApiJson(input): ApiJson<RecipeInput>,
) -> Result<(StatusCode, Json<RecipeView>)> {
    let view = state
        .run(move |conn, media| {
            let id = write::create(conn, media, user.id, input)?;
            recipes::get(conn, media, Some(user.id), id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_recipe(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
    ApiJson(input): ApiJson<RecipeInput>,
) -> Result<Json<RecipeView>> {
    let view = state
        .run(move |conn, media| {
            write::update(conn, media, user.id, id, input)?;
            recipes::get(conn, media, Some(user.id), id)
        })
        .await?;
    Ok(Json(view))
}

async fn delete_recipe(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<StatusCode> {
    state
        .run(move |conn, media| write::delete(conn, media, user.id, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    state: AppState,
    kind: Membership,
    current: CurrentUser,
    id: RecipeId,
) -> Result<(StatusCode, Json<RecipeSummary>)> {
    let user = current.user.id;
    let summary = state
        .run(move |conn, media| memberships::add(conn, media, kind, user, id))
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn remove_member(
    state: AppState,
    kind: Membership,
    current: CurrentUser,
    id: RecipeId,
) -> Result<StatusCode> {
    let user = current.user.id;
    state
        .run(move |conn, _| memberships::remove(conn, kind, user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<(StatusCode, Json<RecipeSummary>)> {
    add_member(state, Membership::Favorites, current, id).await
}

async fn remove_favorite(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<StatusCode> {
    remove_member(state, Membership::Favorites, current, id).await
}

async fn add_to_cart(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<(StatusCode, Json<RecipeSummary>)> {
    add_member(state, Membership::ShoppingCart, current, id).await
}

async fn remove_from_cart(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<StatusCode> {
    remove_member(state, Membership::ShoppingCart, current, id).await
}

async fn download_shopping_cart(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse> {
    let user = current.user.id;
    let items = state
        .run(move |conn, _| shopping_list::shopping_list(conn, user))
        .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shoplist.txt\"",
            ),
        ],
        shopping_list::render(&items),
    ))
}

#[cfg(test)]
use super::testing::TestApp;
#[cfg(test)]
use axum::http::Method;
#[cfg(test)]
use serde_json::{json, Value};

/// Two tags and two ingredients, created through the API.
#[cfg(test)]
async fn seed_catalog(app: &TestApp, token: &str) -> (Vec<Value>, Vec<Value>) {
    let mut tags = vec![];
    for slug in ["breakfast", "dinner"] {
        let (_, tag) = app
            .request(
                Method::POST,
                "/api/tags/",
                Some(token),
                Some(json!({"name": slug, "color": "#112233", "slug": slug})),
            )
            .await;
        tags.push(tag);
    }
    let mut ingredients = vec![];
    for (name, unit) in [("eggs", "pcs"), ("milk", "ml")] {
        let (_, ingredient) = app
            .request(
                Method::POST,
                "/api/ingredients/",
                Some(token),
                Some(json!({"name": name, "measurement_unit": unit})),
            )
            .await;
        ingredients.push(ingredient);
    }
    (tags, ingredients)
}

#[cfg(test)]
fn recipe_body(name: &str, tags: &[&Value], lines: &[(&Value, i64)]) -> Value {
    json!({
        "name": name,
        "text": format!("how to make {name}"),
        "cooking_time": 10,
        "image": crate::media::test_image_data_uri(),
        "tags": tags.iter().map(|t| t["id"].clone()).collect::<Vec<_>>(),
        "ingredients": lines
            .iter()
            .map(|(i, amount)| json!({"id": i["id"], "amount": amount}))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn recipe_lifecycle() {
    let app = TestApp::new();
    let (author_id, author) = app.sign_up("author").await;
    let (_, reader) = app.sign_up("reader").await;
    let (tags, ingredients) = seed_catalog(&app, &author).await;

    let body = recipe_body(
        "omelette",
        &[&tags[0], &tags[1]],
        &[(&ingredients[0], 3), (&ingredients[1], 50)],
    );
    let (status, _) = app
        .request(Method::POST, "/api/recipes/", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = app
        .request(Method::POST, "/api/recipes/", Some(&author), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["author"]["id"], author_id);
    assert_eq!(created["tags"].as_array().unwrap().len(), 2);
    assert_eq!(created["ingredients"][1]["amount"], 50);
    assert_eq!(created["ingredients"][1]["measurement_unit"], "ml");
    assert_eq!(created["is_favorited"], false);
    let image = created["image"].as_str().unwrap().to_owned();
    assert!(image.starts_with("/media/recipes/images/"));

    let (status, served) = app.request_raw(Method::GET, &image, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, crate::media::TEST_PNG);

    let uri = format!("/api/recipes/{}/", created["id"]);
    let (status, _) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&reader),
            Some(json!({"name": "stolen"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&author),
            Some(json!({"cooking_time": 12, "tags": [tags[1]["id"]]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["name"], "omelette");
    assert_eq!(updated["cooking_time"], 12);
    assert_eq!(updated["tags"].as_array().unwrap().len(), 1);
    assert_eq!(updated["ingredients"], created["ingredients"]);

    let (status, _) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&author),
            Some(json!({"cooking_time": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.request(Method::DELETE, &uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.request(Method::DELETE, &uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_validation() {
    let app = TestApp::new();
    let (_, author) = app.sign_up("author").await;
    let (tags, ingredients) = seed_catalog(&app, &author).await;

    let duplicate = recipe_body(
        "toast",
        &[&tags[0]],
        &[(&ingredients[0], 1), (&ingredients[0], 2)],
    );
    let (status, body) = app
        .request(Method::POST, "/api/recipes/", Some(&author), Some(duplicate))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].as_str().unwrap().starts_with("ingredients"));

    let mut unknown_tag = recipe_body("toast", &[], &[(&ingredients[0], 1)]);
    unknown_tag["tags"] = json!([999]);
    let (status, _) = app
        .request(Method::POST, "/api/recipes/", Some(&author), Some(unknown_tag))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/recipes/",
            Some(&author),
            Some(json!({"name": 5})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn favorites_cart_and_download() {
    let app = TestApp::new();
    let (_, author) = app.sign_up("author").await;
    let (_, reader) = app.sign_up("reader").await;
    let (tags, ingredients) = seed_catalog(&app, &author).await;

    let mut ids = vec![];
    for (name, eggs) in [("omelette", 3), ("pancakes", 2)] {
        let body = recipe_body(name, &[&tags[0]], &[(&ingredients[0], eggs)]);
        let (_, recipe) = app
            .request(Method::POST, "/api/recipes/", Some(&author), Some(body))
            .await;
        ids.push(recipe["id"].clone());
    }

    let favorite = format!("/api/recipes/{}/favorite/", ids[0]);
    let (status, summary) = app
        .request(Method::POST, &favorite, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["name"], "omelette");
    assert_eq!(
        summary.as_object().unwrap().len(),
        4,
        "id, name, image and cooking_time only"
    );
    let (status, _) = app
        .request(Method::POST, &favorite, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for id in &ids {
        let cart = format!("/api/recipes/{id}/shopping_cart/");
        let (status, _) = app.request(Method::POST, &cart, Some(&reader), None).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, mine) = app
        .request(Method::GET, "/api/recipes/?is_favorited=1", Some(&reader), None)
        .await;
    assert_eq!(mine["count"], 1);
    assert_eq!(mine["results"][0]["is_favorited"], true);
    assert_eq!(mine["results"][0]["is_in_shopping_cart"], true);

    let (_, anonymous) = app
        .request(Method::GET, "/api/recipes/?is_favorited=1", None, None)
        .await;
    assert_eq!(anonymous["count"], 0);

    let (status, _) = app
        .request_raw(Method::GET, "/api/recipes/download_shopping_cart/", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, text) = app
        .request_raw(
            Method::GET,
            "/api/recipes/download_shopping_cart/",
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(text).unwrap(), "eggs - 5 pcs\n");

    let (status, _) = app
        .request(Method::DELETE, &favorite, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .request(Method::DELETE, &favorite, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_pages_and_filters() {
    let app = TestApp::new();
    let (author_id, author) = app.sign_up("author").await;
    let (tags, ingredients) = seed_catalog(&app, &author).await;

    for (name, tag) in [("a", 0), ("b", 1), ("c", 0)] {
        let body = recipe_body(name, &[&tags[tag]], &[(&ingredients[0], 1)]);
        let (status, _) = app
            .request(Method::POST, "/api/recipes/", Some(&author), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .request(
            Method::GET,
            "/api/recipes/?tags=breakfast&limit=1",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 2);
    assert_eq!(page["results"][0]["name"], "c");
    assert_eq!(page["results"][0]["author"]["is_subscribed"], false);
    assert_eq!(page["next"], "/api/recipes/?tags=breakfast&limit=1&page=2");
    assert_eq!(page["previous"], Value::Null);

    let uri = format!("/api/recipes/?author={author_id}&page=3&limit=1");
    let (_, page) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(page["results"][0]["name"], "a");
    assert_eq!(page["next"], Value::Null);

    let (status, _) = app
        .request(Method::GET, "/api/recipes/?page=9", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app
        .request(Method::GET, "/api/recipes/?page=9223372036854775807", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    let (status, page) = app
        .request(Method::GET, "/api/recipes/?limit=9223372036854775807", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["results"].as_array().map(Vec::len), Some(3));
    assert_eq!(page["next"], Value::Null);
    let (status, _) = app
        .request(Method::GET, "/api/recipes/?limit=zero", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
