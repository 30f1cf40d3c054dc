// Copyright 2023 Remi Bernotavicius

//! The recipe aggregate: a recipe row with its tags and ingredient lines.
//!
//! Reads are always relative to a viewer. Anonymous viewers (`None`) see every
//! membership flag as false.

use crate::database;
use crate::database::models::{
    Ingredient, IngredientId, Recipe, RecipeId, RecipeIngredient, RecipeTag, Tag, User, UserId,
};
use crate::media::MediaStore;
use crate::pagination::PageNumber;
use crate::users::{self, UserView};
use crate::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::GroupedBy as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;
use std::collections::HashMap;

pub mod memberships;
pub mod shopping_list;
pub mod write;

pub use memberships::Membership;
pub use write::RecipeInput;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeView {
    pub id: RecipeId,
    pub author: UserView,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub ingredients: Vec<IngredientLine>,
    pub tags: Vec<Tag>,
    pub cooking_time: i32,
    pub is_in_shopping_cart: bool,
    pub is_favorited: bool,
}

/// The short form used by favorites, the cart and subscriptions.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl RecipeSummary {
    pub fn new(recipe: Recipe, media: &MediaStore) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image.map(|path| media.url_for(&path)),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches if it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<UserId>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" | "" => Ok(false),
        _ => Err(Error::validation(format!("{name}: expected 0 or 1"))),
    }
}

impl RecipeFilter {
    /// Builds a filter from raw query pairs; unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "tags" => filter.tags.push(value.clone()),
                "author" => {
                    let author = value
                        .trim()
                        .parse::<i32>()
                        .map_err(|_| Error::validation("author: expected a user id"))?;
                    filter.author = Some(UserId(author));
                }
                "is_favorited" => filter.is_favorited = parse_flag(key, value)?,
                "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_flag(key, value)?,
                _ => {}
            }
        }
        Ok(filter)
    }
}

/// Assumes membership flags only come with a known viewer.
fn filtered<'a>(
    filter: &RecipeFilter,
    viewer: Option<UserId>,
) -> database::schema::recipes::BoxedQuery<'a, Sqlite> {
    use database::schema::{favorites, recipe_tags, recipes, shopping_cart, tags};

    let mut query = recipes::table.into_boxed();
    if !filter.tags.is_empty() {
        query = query.filter(
            recipes::id.eq_any(
                recipe_tags::table
                    .inner_join(tags::table)
                    .filter(tags::slug.eq_any(filter.tags.clone()))
                    .select(recipe_tags::recipe_id),
            ),
        );
    }
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(viewer))
                        .select(favorites::recipe_id),
                ),
            );
        }
        if filter.is_in_shopping_cart {
            query = query.filter(
                recipes::id.eq_any(
                    shopping_cart::table
                        .filter(shopping_cart::user_id.eq(viewer))
                        .select(shopping_cart::recipe_id),
                ),
            );
        }
    }
    query
}

/// Newest first, one page at a time. Returns the total match count with the page.
pub fn list(
    conn: &mut database::Connection,
    media: &MediaStore,
    viewer: Option<UserId>,
    filter: &RecipeFilter,
    page: PageNumber,
) -> Result<(i64, Vec<RecipeView>)> {
    use database::schema::recipes;

    // nothing is favorited or carted by nobody
    if viewer.is_none() && (filter.is_favorited || filter.is_in_shopping_cart) {
        page.check_in_range(0)?;
        return Ok((0, Vec::new()));
    }

    let count: i64 = filtered(filter, viewer).count().get_result(conn)?;
    page.check_in_range(count)?;

    let rows: Vec<Recipe> = filtered(filter, viewer)
        .select(Recipe::as_select())
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .limit(page.size)
        .offset(page.offset())
        .load(conn)?;

    Ok((count, views(conn, media, viewer, rows)?))
}

pub(crate) fn find(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("recipe"))
}

pub fn get(
    conn: &mut database::Connection,
    media: &MediaStore,
    viewer: Option<UserId>,
    recipe_id: RecipeId,
) -> Result<RecipeView> {
    let recipe = find(conn, recipe_id)?;
    views(conn, media, viewer, vec![recipe])?
        .pop()
        .ok_or(Error::NotFound("recipe"))
}

/// Loads everything hanging off `rows` in a fixed number of queries.
pub fn views(
    conn: &mut database::Connection,
    media: &MediaStore,
    viewer: Option<UserId>,
    rows: Vec<Recipe>,
) -> Result<Vec<RecipeView>> {
    use database::schema::{ingredients, recipe_ingredients, tags};

    let recipe_ids: Vec<RecipeId> = rows.iter().map(|r| r.id).collect();
    let author_ids: Vec<UserId> = rows.iter().map(|r| r.author_id).collect();

    let authors: HashMap<UserId, User> = database::schema::users::table
        .select(User::as_select())
        .filter(database::schema::users::id.eq_any(author_ids.clone()))
        .load(conn)?
        .into_iter()
        .map(|u: User| (u.id, u))
        .collect();
    let subscribed = users::subscribed_to(conn, viewer, &author_ids)?;

    let recipe_tags = RecipeTag::belonging_to(&rows)
        .inner_join(tags::table)
        .select((RecipeTag::as_select(), Tag::as_select()))
        .order(tags::id)
        .load::<(RecipeTag, Tag)>(conn)?
        .grouped_by(&rows);

    let recipe_lines = RecipeIngredient::belonging_to(&rows)
        .inner_join(ingredients::table)
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .order(recipe_ingredients::id)
        .load::<(RecipeIngredient, Ingredient)>(conn)?
        .grouped_by(&rows);

    let favorited = memberships::among(conn, Membership::Favorites, viewer, &recipe_ids)?;
    let carted = memberships::among(conn, Membership::ShoppingCart, viewer, &recipe_ids)?;

    rows.into_iter()
        .zip(recipe_tags)
        .zip(recipe_lines)
        .map(|((recipe, tags), lines)| {
            let author = authors
                .get(&recipe.author_id)
                .cloned()
                .ok_or(Error::NotFound("user"))?;
            let is_subscribed = subscribed.contains(&author.id);
            Ok(RecipeView {
                id: recipe.id,
                author: UserView::new(author, is_subscribed),
                name: recipe.name,
                image: recipe.image.map(|path| media.url_for(&path)),
                text: recipe.text,
                ingredients: lines
                    .into_iter()
                    .map(|(line, ingredient)| IngredientLine {
                        id: ingredient.id,
                        name: ingredient.name,
                        measurement_unit: ingredient.measurement_unit,
                        amount: line.amount,
                    })
                    .collect(),
                tags: tags.into_iter().map(|(_, tag)| tag).collect(),
                cooking_time: recipe.cooking_time,
                is_in_shopping_cart: carted.contains(&recipe.id),
                is_favorited: favorited.contains(&recipe.id),
            })
        })
        .collect()
}

/// A user with a recipe, two tags and two ingredients, for tests across modules.
#[cfg(test)]
pub struct Fixture {
    pub media_dir: tempfile::TempDir,
    pub media: MediaStore,
    pub author: User,
    pub reader: User,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

#[cfg(test)]
impl Fixture {
    pub fn new(conn: &mut database::Connection) -> Self {
        use crate::catalog;

        let media_dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(media_dir.path(), "/media/");
        let author = users::register(conn, &users::registration("author")).unwrap();
        let reader = users::register(conn, &users::registration("reader")).unwrap();
        let tags = vec![
            catalog::create_tag(conn, &catalog::tag_input("Breakfast", "breakfast")).unwrap(),
            catalog::create_tag(conn, &catalog::tag_input("Lunch", "lunch")).unwrap(),
            catalog::create_tag(conn, &catalog::tag_input("Dinner", "dinner")).unwrap(),
        ];
        let ingredients = vec![
            catalog::create_ingredient(conn, &catalog::ingredient_input("eggs", "pcs")).unwrap(),
            catalog::create_ingredient(conn, &catalog::ingredient_input("milk", "ml")).unwrap(),
            catalog::create_ingredient(conn, &catalog::ingredient_input("flour", "g")).unwrap(),
        ];
        Self {
            media_dir,
            media,
            author,
            reader,
            tags,
            ingredients,
        }
    }

    pub fn input(&self, name: &str, tags: &[usize], lines: &[(usize, i64)]) -> RecipeInput {
        RecipeInput {
            name: Some(name.into()),
            text: Some(format!("how to make {name}")),
            cooking_time: Some(15),
            image: Some(crate::media::test_image_data_uri()),
            ingredients: Some(
                lines
                    .iter()
                    .map(|&(i, amount)| write::IngredientAmount {
                        id: self.ingredients[i].id,
                        amount,
                    })
                    .collect(),
            ),
            tags: Some(tags.iter().map(|&t| self.tags[t].id).collect()),
        }
    }

    pub fn publish(
        &self,
        conn: &mut database::Connection,
        name: &str,
        tags: &[usize],
        lines: &[(usize, i64)],
    ) -> RecipeId {
        write::create(conn, &self.media, self.author.id, self.input(name, tags, lines)).unwrap()
    }
}

#[test]
fn round_trip() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let id = fx.publish(&mut conn, "pancakes", &[0, 1], &[(0, 2), (1, 3)]);
    let view = get(&mut conn, &fx.media, None, id).unwrap();

    assert_eq!(view.name, "pancakes");
    assert_eq!(view.author.id, fx.author.id);
    assert_eq!(view.tags, vec![fx.tags[0].clone(), fx.tags[1].clone()]);
    let lines: Vec<(IngredientId, i32)> =
        view.ingredients.iter().map(|l| (l.id, l.amount)).collect();
    assert_eq!(
        lines,
        vec![(fx.ingredients[0].id, 2), (fx.ingredients[1].id, 3)]
    );
    assert_eq!(view.ingredients[1].measurement_unit, "ml");
    assert!(view.image.unwrap().starts_with("/media/recipes/images/"));
}

#[test]
fn anonymous_viewers_see_no_flags() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let first = fx.publish(&mut conn, "pancakes", &[0], &[(0, 2)]);
    let second = fx.publish(&mut conn, "omelette", &[0], &[(0, 3)]);
    memberships::add(&mut conn, &fx.media, Membership::Favorites, fx.reader.id, first).unwrap();
    memberships::add(&mut conn, &fx.media, Membership::ShoppingCart, fx.reader.id, second).unwrap();

    let page = PageNumber { page: 1, size: 10 };
    let (count, anonymous) =
        list(&mut conn, &fx.media, None, &RecipeFilter::default(), page).unwrap();
    assert_eq!(count, 2);
    assert!(anonymous
        .iter()
        .all(|r| !r.is_favorited && !r.is_in_shopping_cart));

    let (_, reader) = list(
        &mut conn,
        &fx.media,
        Some(fx.reader.id),
        &RecipeFilter::default(),
        page,
    )
    .unwrap();
    // newest first
    assert_eq!(reader[0].id, second);
    assert!(reader[0].is_in_shopping_cart && !reader[0].is_favorited);
    assert!(reader[1].is_favorited && !reader[1].is_in_shopping_cart);
}

#[test]
fn filters() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let breakfast = fx.publish(&mut conn, "porridge", &[0], &[(1, 200)]);
    let lunch = fx.publish(&mut conn, "soup", &[1], &[(2, 50)]);
    let dinner = fx.publish(&mut conn, "stew", &[2], &[(2, 80)]);
    memberships::add(&mut conn, &fx.media, Membership::Favorites, fx.reader.id, lunch).unwrap();

    let page = PageNumber { page: 1, size: 10 };
    let ids = |conn: &mut database::Connection, viewer, filter: RecipeFilter| -> Vec<RecipeId> {
        list(conn, &fx.media, viewer, &filter, page)
            .unwrap()
            .1
            .into_iter()
            .map(|r| r.id)
            .collect()
    };

    let by_tags = RecipeFilter::from_pairs(&[
        ("tags".into(), "breakfast".into()),
        ("tags".into(), "dinner".into()),
    ])
    .unwrap();
    assert_eq!(ids(&mut conn, None, by_tags), vec![dinner, breakfast]);

    let by_author = RecipeFilter {
        author: Some(fx.reader.id),
        ..RecipeFilter::default()
    };
    assert!(ids(&mut conn, None, by_author).is_empty());

    let favorited = RecipeFilter::from_pairs(&[("is_favorited".into(), "1".into())]).unwrap();
    assert_eq!(ids(&mut conn, Some(fx.reader.id), favorited.clone()), vec![lunch]);
    assert!(ids(&mut conn, None, favorited).is_empty());

    assert!(RecipeFilter::from_pairs(&[("author".into(), "me".into())]).is_err());
    assert!(RecipeFilter::from_pairs(&[("is_favorited".into(), "maybe".into())]).is_err());
}

#[test]
fn pages() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    for name in ["a", "b", "c"] {
        fx.publish(&mut conn, name, &[], &[(0, 1)]);
    }

    let filter = RecipeFilter::default();
    let (count, second) = list(
        &mut conn,
        &fx.media,
        None,
        &filter,
        PageNumber { page: 2, size: 2 },
    )
    .unwrap();
    assert_eq!(count, 3);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "a");

    assert!(matches!(
        list(&mut conn, &fx.media, None, &filter, PageNumber { page: 3, size: 2 }),
        Err(Error::NotFound("page"))
    ));
}
