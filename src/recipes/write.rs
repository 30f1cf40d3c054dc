// Copyright 2023 Remi Bernotavicius

use super::find;
use crate::database;
use crate::database::models::{
    IngredientId, NewRecipe, NewRecipeIngredient, RecipeId, RecipeTag, TagId, UserId,
};
use crate::media::{DecodedImage, MediaStore};
use crate::{Error, Result};
use diesel::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use log::info;
use serde::Deserialize;
use std::collections::HashSet;

const MAX_NAME_LENGTH: usize = 200;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: IngredientId,
    pub amount: i64,
}

/// Body of a create or partial update. Every field is optional here so that
/// missing fields can be reported together with the other validation errors.
#[derive(Deserialize, Default, Debug, Clone)]
pub struct RecipeInput {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    pub image: Option<String>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<TagId>>,
}

struct RecipeChanges {
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i32>,
    image: Option<DecodedImage>,
    ingredients: Option<Vec<(IngredientId, i32)>>,
    tags: Option<Vec<TagId>>,
}

fn at_least_one(field: &str, value: i64) -> Result<i32> {
    if value < 1 {
        return Err(Error::validation(format!("{field}: must be at least 1")));
    }
    i32::try_from(value).map_err(|_| Error::validation(format!("{field}: value is too large")))
}

fn validate_lines(lines: Vec<IngredientAmount>) -> Result<Vec<(IngredientId, i32)>> {
    if lines.is_empty() {
        return Err(Error::validation(
            "ingredients: at least one ingredient is required",
        ));
    }
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .map(|line| {
            if !seen.insert(line.id) {
                return Err(Error::validation(format!(
                    "ingredients: ingredient {} is listed more than once",
                    line.id
                )));
            }
            Ok((line.id, at_least_one("amount", line.amount)?))
        })
        .collect()
}

fn dedup_tags(tags: Vec<TagId>) -> Vec<TagId> {
    let mut seen = HashSet::new();
    tags.into_iter().filter(|t| seen.insert(*t)).collect()
}

impl RecipeInput {
    fn validate(self) -> Result<RecipeChanges> {
        let name = self.name.map(|n| n.trim().to_owned());
        match &name {
            Some(n) if n.is_empty() => return Err(Error::required("name")),
            Some(n) if n.chars().count() > MAX_NAME_LENGTH => {
                return Err(Error::validation(format!(
                    "name: must be at most {MAX_NAME_LENGTH} characters"
                )))
            }
            _ => {}
        }
        if matches!(&self.text, Some(t) if t.trim().is_empty()) {
            return Err(Error::required("text"));
        }

        Ok(RecipeChanges {
            name,
            text: self.text,
            cooking_time: self
                .cooking_time
                .map(|c| at_least_one("cooking_time", c))
                .transpose()?,
            image: self
                .image
                .as_deref()
                .map(DecodedImage::decode)
                .transpose()?,
            ingredients: self.ingredients.map(validate_lines).transpose()?,
            tags: self.tags.map(dedup_tags),
        })
    }
}

fn ensure_tags_exist(conn: &mut database::Connection, tag_ids: &[TagId]) -> Result<()> {
    use database::schema::tags::dsl::*;

    let found: i64 = tags
        .filter(id.eq_any(tag_ids.to_vec()))
        .count()
        .get_result(conn)?;
    if found != tag_ids.len() as i64 {
        return Err(Error::NotFound("tag"));
    }
    Ok(())
}

fn ensure_ingredients_exist(
    conn: &mut database::Connection,
    lines: &[(IngredientId, i32)],
) -> Result<()> {
    use database::schema::ingredients::dsl::*;

    let ids: Vec<IngredientId> = lines.iter().map(|(i, _)| *i).collect();
    let found: i64 = ingredients
        .filter(id.eq_any(ids))
        .count()
        .get_result(conn)?;
    if found != lines.len() as i64 {
        return Err(Error::NotFound("ingredient"));
    }
    Ok(())
}

fn replace_tags(conn: &mut database::Connection, recipe: RecipeId, tag_ids: &[TagId]) -> Result<()> {
    use database::schema::recipe_tags::dsl::*;

    ensure_tags_exist(conn, tag_ids)?;
    diesel::delete(recipe_tags.filter(recipe_id.eq(recipe))).execute(conn)?;
    if !tag_ids.is_empty() {
        let rows: Vec<RecipeTag> = tag_ids
            .iter()
            .map(|&t| RecipeTag {
                recipe_id: recipe,
                tag_id: t,
            })
            .collect();
        diesel::insert_into(recipe_tags).values(&rows).execute(conn)?;
    }
    Ok(())
}

fn replace_lines(
    conn: &mut database::Connection,
    recipe: RecipeId,
    lines: &[(IngredientId, i32)],
) -> Result<()> {
    use database::schema::recipe_ingredients::dsl::*;

    ensure_ingredients_exist(conn, lines)?;
    diesel::delete(recipe_ingredients.filter(recipe_id.eq(recipe))).execute(conn)?;
    let rows: Vec<NewRecipeIngredient> = lines
        .iter()
        .map(|&(ingredient, count)| NewRecipeIngredient {
            recipe_id: recipe,
            ingredient_id: ingredient,
            amount: count,
        })
        .collect();
    diesel::insert_into(recipe_ingredients)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// Stores the image, then writes the recipe and its children in one
/// transaction. The image is removed again if the transaction fails.
pub fn create(
    conn: &mut database::Connection,
    media: &MediaStore,
    author: UserId,
    input: RecipeInput,
) -> Result<RecipeId> {
    use database::schema::recipes;

    let changes = input.validate()?;
    let name = changes.name.ok_or_else(|| Error::required("name"))?;
    let text = changes.text.ok_or_else(|| Error::required("text"))?;
    let cooking_time = changes
        .cooking_time
        .ok_or_else(|| Error::required("cooking_time"))?;
    let image = changes.image.ok_or_else(|| Error::required("image"))?;
    let lines = changes
        .ingredients
        .ok_or_else(|| Error::required("ingredients"))?;
    let tags = changes.tags.unwrap_or_default();

    let image_path = media.save(&image)?;
    let result = conn.transaction::<_, Error, _>(|conn| {
        let new_id: RecipeId = diesel::insert_into(recipes::table)
            .values(NewRecipe {
                author_id: author,
                name: &name,
                image: Some(image_path.as_str()),
                text: &text,
                cooking_time,
                pub_date: chrono::Utc::now().naive_utc(),
            })
            .returning(recipes::id)
            .get_result(conn)?;
        replace_tags(conn, new_id, &tags)?;
        replace_lines(conn, new_id, &lines)?;
        Ok(new_id)
    });

    match result {
        Ok(new_id) => {
            info!("user {author} published recipe {new_id} {name:?}");
            Ok(new_id)
        }
        Err(e) => {
            media.remove(&image_path);
            Err(e)
        }
    }
}

/// Applies the supplied fields; tags and ingredients are replaced wholesale
/// when present and left alone otherwise.
pub fn update(
    conn: &mut database::Connection,
    media: &MediaStore,
    editor: UserId,
    recipe_id: RecipeId,
    input: RecipeInput,
) -> Result<()> {
    use database::schema::recipes;

    let mut new_image = None;
    let result = conn.transaction::<_, Error, _>(|conn| {
        let existing = find(conn, recipe_id)?;
        if existing.author_id != editor {
            return Err(Error::Forbidden);
        }
        let changes = input.validate()?;
        if let Some(image) = &changes.image {
            new_image = Some(media.save(image)?);
        }

        if let Some(tags) = &changes.tags {
            replace_tags(conn, recipe_id, tags)?;
        }
        if let Some(lines) = &changes.ingredients {
            replace_lines(conn, recipe_id, lines)?;
        }
        diesel::update(recipes::table.find(recipe_id))
            .set((
                recipes::name.eq(changes.name.as_deref().unwrap_or(&existing.name)),
                recipes::text.eq(changes.text.as_deref().unwrap_or(&existing.text)),
                recipes::cooking_time.eq(changes.cooking_time.unwrap_or(existing.cooking_time)),
                recipes::image.eq(new_image.as_deref().or(existing.image.as_deref())),
            ))
            .execute(conn)?;
        Ok(existing.image)
    });

    match result {
        Ok(old_image) => {
            if let (Some(_), Some(old)) = (&new_image, &old_image) {
                media.remove(old);
            }
            info!("user {editor} updated recipe {recipe_id}");
            Ok(())
        }
        Err(e) => {
            if let Some(path) = &new_image {
                media.remove(path);
            }
            Err(e)
        }
    }
}

/// Children rows go with the recipe through `ON DELETE CASCADE`.
pub fn delete(
    conn: &mut database::Connection,
    media: &MediaStore,
    editor: UserId,
    recipe_id: RecipeId,
) -> Result<()> {
    use database::schema::recipes;

    let existing = find(conn, recipe_id)?;
    if existing.author_id != editor {
        return Err(Error::Forbidden);
    }
    diesel::delete(recipes::table.find(recipe_id)).execute(conn)?;
    if let Some(path) = &existing.image {
        media.remove(path);
    }
    info!("user {editor} deleted recipe {recipe_id}");
    Ok(())
}

#[cfg(test)]
use super::{get, Fixture};

#[test]
fn create_requires_every_field() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let missing = |field: &str| {
        let mut input = fx.input("toast", &[0], &[(0, 1)]);
        match field {
            "name" => input.name = None,
            "text" => input.text = None,
            "cooking_time" => input.cooking_time = None,
            "image" => input.image = None,
            "ingredients" => input.ingredients = None,
            _ => unreachable!(),
        }
        input
    };
    for field in ["name", "text", "cooking_time", "image", "ingredients"] {
        let err = create(&mut conn, &fx.media, fx.author.id, missing(field)).unwrap_err();
        assert!(
            matches!(&err, Error::Validation(msg) if msg.starts_with(field)),
            "{field}: {err}"
        );
    }
    // nothing written, including images
    assert_eq!(
        std::fs::read_dir(fx.media_dir.path()).unwrap().count(),
        0
    );
}

#[test]
fn create_rejects_bad_values() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let mut zero_time = fx.input("toast", &[], &[(0, 1)]);
    zero_time.cooking_time = Some(0);
    assert!(create(&mut conn, &fx.media, fx.author.id, zero_time).is_err());

    let zero_amount = fx.input("toast", &[], &[(0, 0)]);
    assert!(create(&mut conn, &fx.media, fx.author.id, zero_amount).is_err());

    let no_lines = fx.input("toast", &[], &[]);
    assert!(create(&mut conn, &fx.media, fx.author.id, no_lines).is_err());

    let repeated = fx.input("toast", &[], &[(0, 1), (0, 2)]);
    assert!(create(&mut conn, &fx.media, fx.author.id, repeated).is_err());

    let mut bad_image = fx.input("toast", &[], &[(0, 1)]);
    bad_image.image = Some("not an image".into());
    assert!(create(&mut conn, &fx.media, fx.author.id, bad_image).is_err());
}

#[test]
fn create_rolls_back_on_unknown_references() {
    use crate::database::schema::recipes;

    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let mut unknown_tag = fx.input("toast", &[], &[(0, 1)]);
    unknown_tag.tags = Some(vec![TagId(404)]);
    assert!(matches!(
        create(&mut conn, &fx.media, fx.author.id, unknown_tag),
        Err(Error::NotFound("tag"))
    ));

    let mut unknown_ingredient = fx.input("toast", &[], &[(0, 1)]);
    unknown_ingredient.ingredients = Some(vec![IngredientAmount {
        id: IngredientId(404),
        amount: 1,
    }]);
    assert!(matches!(
        create(&mut conn, &fx.media, fx.author.id, unknown_ingredient),
        Err(Error::NotFound("ingredient"))
    ));

    let count: i64 = recipes::table.count().get_result(&mut conn).unwrap();
    assert_eq!(count, 0);
    let images = fx.media_dir.path().join("recipes/images");
    assert_eq!(std::fs::read_dir(images).unwrap().count(), 0);
}

#[test]
fn duplicate_tags_collapse() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let id = fx.publish(&mut conn, "toast", &[1, 1, 0], &[(0, 1)]);
    let view = get(&mut conn, &fx.media, None, id).unwrap();
    assert_eq!(view.tags.len(), 2);
}

#[test]
fn partial_update() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let id = fx.publish(&mut conn, "toast", &[0], &[(0, 1), (1, 2)]);
    let before = get(&mut conn, &fx.media, None, id).unwrap();

    let rename = RecipeInput {
        name: Some("french toast".into()),
        ..RecipeInput::default()
    };
    update(&mut conn, &fx.media, fx.author.id, id, rename).unwrap();
    let after = get(&mut conn, &fx.media, None, id).unwrap();
    assert_eq!(after.name, "french toast");
    assert_eq!(after.text, before.text);
    assert_eq!(after.image, before.image);
    assert_eq!(after.tags, before.tags);
    assert_eq!(after.ingredients, before.ingredients);

    let relist = RecipeInput {
        ingredients: Some(vec![IngredientAmount {
            id: fx.ingredients[2].id,
            amount: 7,
        }]),
        tags: Some(vec![]),
        image: Some(crate::media::test_image_data_uri()),
        ..RecipeInput::default()
    };
    update(&mut conn, &fx.media, fx.author.id, id, relist).unwrap();
    let after = get(&mut conn, &fx.media, None, id).unwrap();
    assert!(after.tags.is_empty());
    assert_eq!(after.ingredients.len(), 1);
    assert_eq!(after.ingredients[0].amount, 7);
    assert_ne!(after.image, before.image);

    let images = fx.media_dir.path().join("recipes/images");
    assert_eq!(std::fs::read_dir(images).unwrap().count(), 1);
}

#[test]
fn only_the_author_may_change_a_recipe() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let id = fx.publish(&mut conn, "toast", &[0], &[(0, 1)]);
    let rename = RecipeInput {
        name: Some("stolen".into()),
        ..RecipeInput::default()
    };
    assert!(matches!(
        update(&mut conn, &fx.media, fx.reader.id, id, rename),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        delete(&mut conn, &fx.media, fx.reader.id, id),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        delete(&mut conn, &fx.media, fx.author.id, RecipeId(404)),
        Err(Error::NotFound("recipe"))
    ));

    delete(&mut conn, &fx.media, fx.author.id, id).unwrap();
    assert!(matches!(
        get(&mut conn, &fx.media, None, id),
        Err(Error::NotFound("recipe"))
    ));

    // a vanished recipe is reported as missing and leaves no stray image behind
    let reimage = RecipeInput {
        tags: Some(vec![fx.tags[0].id]),
        image: Some(crate::media::test_image_data_uri()),
        ..RecipeInput::default()
    };
    assert!(matches!(
        update(&mut conn, &fx.media, fx.author.id, id, reimage),
        Err(Error::NotFound("recipe"))
    ));
    let images = fx.media_dir.path().join("recipes/images");
    assert_eq!(std::fs::read_dir(images).unwrap().count(), 0);
}
