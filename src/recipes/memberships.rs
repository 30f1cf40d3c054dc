// Copyright 2023 Remi Bernotavicius

//! Favorites and the shopping cart. Both are sets of (user, recipe) pairs and
//! behave identically: adding twice is an error, removing an absent entry is
//! not found.

use super::{find, RecipeSummary};
use crate::database;
use crate::database::models::{CartItem, Favorite, RecipeId, UserId};
use crate::media::MediaStore;
use crate::{Error, Result};
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use log::info;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Favorites,
    ShoppingCart,
}

impl Membership {
    fn label(self) -> &'static str {
        match self {
            Self::Favorites => "favorites",
            Self::ShoppingCart => "shopping cart",
        }
    }

    fn missing(self) -> Error {
        match self {
            Self::Favorites => Error::NotFound("favorite"),
            Self::ShoppingCart => Error::NotFound("shopping cart entry"),
        }
    }
}

fn contains(
    conn: &mut database::Connection,
    kind: Membership,
    user: UserId,
    recipe: RecipeId,
) -> Result<bool> {
    use database::schema::{favorites, shopping_cart};

    let count: i64 = match kind {
        Membership::Favorites => favorites::table
            .filter(favorites::user_id.eq(user))
            .filter(favorites::recipe_id.eq(recipe))
            .count()
            .get_result(conn)?,
        Membership::ShoppingCart => shopping_cart::table
            .filter(shopping_cart::user_id.eq(user))
            .filter(shopping_cart::recipe_id.eq(recipe))
            .count()
            .get_result(conn)?,
    };
    Ok(count > 0)
}

pub fn add(
    conn: &mut database::Connection,
    media: &MediaStore,
    kind: Membership,
    user: UserId,
    recipe_id: RecipeId,
) -> Result<RecipeSummary> {
    use database::schema::{favorites, shopping_cart};

    let recipe = find(conn, recipe_id)?;
    if contains(conn, kind, user, recipe_id)? {
        return Err(Error::validation(format!(
            "recipe {recipe_id} is already in {}",
            kind.label()
        )));
    }

    match kind {
        Membership::Favorites => diesel::insert_into(favorites::table)
            .values(Favorite {
                user_id: user,
                recipe_id,
            })
            .execute(conn)?,
        Membership::ShoppingCart => diesel::insert_into(shopping_cart::table)
            .values(CartItem {
                user_id: user,
                recipe_id,
            })
            .execute(conn)?,
    };
    info!("user {user} added recipe {recipe_id} to {}", kind.label());

    Ok(RecipeSummary::new(recipe, media))
}

pub fn remove(
    conn: &mut database::Connection,
    kind: Membership,
    user: UserId,
    recipe_id: RecipeId,
) -> Result<()> {
    use database::schema::{favorites, shopping_cart};

    find(conn, recipe_id)?;
    let deleted = match kind {
        Membership::Favorites => diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user))
                .filter(favorites::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
        Membership::ShoppingCart => diesel::delete(
            shopping_cart::table
                .filter(shopping_cart::user_id.eq(user))
                .filter(shopping_cart::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
    };
    if deleted == 0 {
        return Err(kind.missing());
    }
    info!("user {user} removed recipe {recipe_id} from {}", kind.label());
    Ok(())
}

/// Which of `recipes` are in the viewer's set. Always empty for anonymous viewers.
pub fn among(
    conn: &mut database::Connection,
    kind: Membership,
    viewer: Option<UserId>,
    recipes: &[RecipeId],
) -> Result<HashSet<RecipeId>> {
    use database::schema::{favorites, shopping_cart};

    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    let ids: Vec<RecipeId> = match kind {
        Membership::Favorites => favorites::table
            .filter(favorites::user_id.eq(viewer))
            .filter(favorites::recipe_id.eq_any(recipes.to_vec()))
            .select(favorites::recipe_id)
            .load(conn)?,
        Membership::ShoppingCart => shopping_cart::table
            .filter(shopping_cart::user_id.eq(viewer))
            .filter(shopping_cart::recipe_id.eq_any(recipes.to_vec()))
            .select(shopping_cart::recipe_id)
            .load(conn)?,
    };
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
use super::Fixture;

#[test]
fn add_and_remove() {
    for kind in [Membership::Favorites, Membership::ShoppingCart] {
        let pool = database::test_pool();
        let mut conn = pool.get().unwrap();
        let fx = Fixture::new(&mut conn);
        let id = fx.publish(&mut conn, "toast", &[0], &[(0, 1)]);

        let summary = add(&mut conn, &fx.media, kind, fx.reader.id, id).unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.name, "toast");
        assert_eq!(summary.cooking_time, 15);

        assert!(matches!(
            add(&mut conn, &fx.media, kind, fx.reader.id, id),
            Err(Error::Validation(_))
        ));
        assert_eq!(
            among(&mut conn, kind, Some(fx.reader.id), &[id]).unwrap(),
            HashSet::from([id])
        );
        assert!(among(&mut conn, kind, Some(fx.author.id), &[id])
            .unwrap()
            .is_empty());
        assert!(among(&mut conn, kind, None, &[id]).unwrap().is_empty());

        remove(&mut conn, kind, fx.reader.id, id).unwrap();
        assert!(matches!(
            remove(&mut conn, kind, fx.reader.id, id),
            Err(Error::NotFound(_))
        ));
    }
}

#[test]
fn unknown_recipes_are_not_found() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    assert!(matches!(
        add(&mut conn, &fx.media, Membership::Favorites, fx.reader.id, RecipeId(404)),
        Err(Error::NotFound("recipe"))
    ));
    assert!(matches!(
        remove(&mut conn, Membership::ShoppingCart, fx.reader.id, RecipeId(404)),
        Err(Error::NotFound("recipe"))
    ));
}

#[test]
fn deleting_a_recipe_clears_memberships() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);
    let id = fx.publish(&mut conn, "toast", &[0], &[(0, 1)]);

    add(&mut conn, &fx.media, Membership::Favorites, fx.reader.id, id).unwrap();
    add(&mut conn, &fx.media, Membership::ShoppingCart, fx.reader.id, id).unwrap();
    super::write::delete(&mut conn, &fx.media, fx.author.id, id).unwrap();

    assert!(among(&mut conn, Membership::Favorites, Some(fx.reader.id), &[id])
        .unwrap()
        .is_empty());
    assert!(
        among(&mut conn, Membership::ShoppingCart, Some(fx.reader.id), &[id])
            .unwrap()
            .is_empty()
    );
}
