// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::fold_case;
use crate::database::models::{Ingredient, IngredientId, NewIngredient, NewTag, Tag, TagId};
use crate::{Error, Result};
use diesel::expression_methods::EscapeExpressionMethods as _;
use diesel::expression_methods::TextExpressionMethods as _;
use diesel::prelude::OptionalExtension as _;
use diesel::BoolExpressionMethods as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use log::info;
use serde::Deserialize;

const MAX_NAME_LENGTH: usize = 200;
const MAX_SLUG_LENGTH: usize = 200;
const MAX_UNIT_LENGTH: usize = 200;

fn required_text<'a>(field: &str, value: &'a Option<String>, max_len: usize) -> Result<&'a str> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(Error::required(field));
    }
    if value.chars().count() > max_len {
        return Err(Error::validation(format!(
            "{field}: must be at most {max_len} characters"
        )));
    }
    Ok(value)
}

fn valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn valid_slug(slug: &str) -> bool {
    slug.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Escapes LIKE wildcards so user input matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn list_tags(conn: &mut database::Connection) -> Result<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags.select(Tag::as_select()).order(id).load(conn)?)
}

pub fn get_tag(conn: &mut database::Connection, tag_id: TagId) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    tags.find(tag_id)
        .select(Tag::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("tag"))
}

#[derive(Deserialize, Default, Debug)]
pub struct TagInput {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

pub fn create_tag(conn: &mut database::Connection, input: &TagInput) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    let new_name = required_text("name", &input.name, MAX_NAME_LENGTH)?;
    let new_slug = required_text("slug", &input.slug, MAX_SLUG_LENGTH)?;
    let new_color = input.color.as_deref().map(str::trim).unwrap_or("#FF0000");

    if !valid_slug(new_slug) {
        return Err(Error::validation(
            "slug: may only contain letters, digits, hyphens and underscores",
        ));
    }
    if !valid_color(new_color) {
        return Err(Error::validation("color: expected a #RRGGBB hex color"));
    }

    let existing: i64 = tags
        .filter(name.eq(new_name).or(slug.eq(new_slug)))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Err(Error::validation(
            "a tag with that name or slug already exists",
        ));
    }

    let tag = diesel::insert_into(tags)
        .values(NewTag {
            name: new_name,
            color: new_color,
            slug: new_slug,
        })
        .returning(Tag::as_returning())
        .get_result(conn)?;

    info!("created tag {} ({})", tag.slug, tag.id);
    Ok(tag)
}

/// `name` matches case-insensitively as a prefix; `measurement_unit` exactly.
#[derive(Deserialize, Default, Debug)]
pub struct IngredientFilter {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

pub fn list_ingredients(
    conn: &mut database::Connection,
    filter: &IngredientFilter,
) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    let mut query = ingredients.select(Ingredient::as_select()).into_boxed();
    if let Some(prefix) = filter.name.as_deref().filter(|p| !p.is_empty()) {
        let pattern = like_prefix(&prefix.to_lowercase());
        query = query.filter(fold_case(name).like(pattern).escape('\\'));
    }
    if let Some(unit) = filter.measurement_unit.as_deref().filter(|u| !u.is_empty()) {
        query = query.filter(measurement_unit.eq(unit.to_owned()));
    }

    Ok(query.order((name, measurement_unit)).load(conn)?)
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("ingredient"))
}

#[derive(Deserialize, Default, Debug)]
pub struct IngredientInput {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

fn find_ingredient(
    conn: &mut database::Connection,
    ingredient_name: &str,
    unit: &str,
) -> Result<Option<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(name.eq(ingredient_name))
        .filter(measurement_unit.eq(unit))
        .get_result(conn)
        .optional()?)
}

fn insert_ingredient(
    conn: &mut database::Connection,
    ingredient_name: &str,
    unit: &str,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    Ok(diesel::insert_into(ingredients)
        .values(NewIngredient {
            name: ingredient_name,
            measurement_unit: unit,
        })
        .returning(Ingredient::as_returning())
        .get_result(conn)?)
}

pub fn create_ingredient(
    conn: &mut database::Connection,
    input: &IngredientInput,
) -> Result<Ingredient> {
    let new_name = required_text("name", &input.name, MAX_NAME_LENGTH)?;
    let unit = required_text("measurement_unit", &input.measurement_unit, MAX_UNIT_LENGTH)?;

    if find_ingredient(conn, new_name, unit)?.is_some() {
        return Err(Error::validation(
            "an ingredient with that name and measurement unit already exists",
        ));
    }
    let ingredient = insert_ingredient(conn, new_name, unit)?;
    info!("created ingredient {} ({})", ingredient.name, ingredient.id);
    Ok(ingredient)
}

/// Returns the ingredient and whether it had to be created.
pub fn get_or_create_ingredient(
    conn: &mut database::Connection,
    ingredient_name: &str,
    unit: &str,
) -> Result<(Ingredient, bool)> {
    match find_ingredient(conn, ingredient_name, unit)? {
        Some(existing) => Ok((existing, false)),
        None => Ok((insert_ingredient(conn, ingredient_name, unit)?, true)),
    }
}

#[cfg(test)]
pub fn tag_input(name: &str, slug: &str) -> TagInput {
    TagInput {
        name: Some(name.into()),
        color: Some("#E26C2D".into()),
        slug: Some(slug.into()),
    }
}

#[cfg(test)]
pub fn ingredient_input(name: &str, unit: &str) -> IngredientInput {
    IngredientInput {
        name: Some(name.into()),
        measurement_unit: Some(unit.into()),
    }
}

#[test]
fn tags_are_unique_and_validated() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();

    let breakfast = create_tag(&mut conn, &tag_input("Breakfast", "breakfast")).unwrap();
    assert_eq!(get_tag(&mut conn, breakfast.id).unwrap(), breakfast);

    assert!(create_tag(&mut conn, &tag_input("Breakfast", "other")).is_err());
    assert!(create_tag(&mut conn, &tag_input("Other", "breakfast")).is_err());
    assert!(create_tag(&mut conn, &tag_input("Lunch", "lunch time")).is_err());

    let mut bad_color = tag_input("Lunch", "lunch");
    bad_color.color = Some("red".into());
    assert!(create_tag(&mut conn, &bad_color).is_err());

    let mut default_color = tag_input("Dinner", "dinner");
    default_color.color = None;
    assert_eq!(create_tag(&mut conn, &default_color).unwrap().color, "#FF0000");

    assert_eq!(list_tags(&mut conn).unwrap().len(), 2);
    assert!(matches!(
        get_tag(&mut conn, TagId(99)),
        Err(Error::NotFound("tag"))
    ));
}

#[test]
fn ingredient_filters() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();

    for (name, unit) in [
        ("sugar", "g"),
        ("Sugar syrup", "ml"),
        ("salt", "g"),
        ("50%_cream", "ml"),
        ("500 cream", "ml"),
        ("молоко", "мл"),
        ("Молоко сгущённое", "г"),
    ] {
        create_ingredient(&mut conn, &ingredient_input(name, unit)).unwrap();
    }
    assert!(create_ingredient(&mut conn, &ingredient_input("sugar", "g")).is_err());

    let names = |filter: IngredientFilter, conn: &mut database::Connection| -> Vec<String> {
        list_ingredients(conn, &filter)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect()
    };

    let by_prefix = IngredientFilter {
        name: Some("SUG".into()),
        measurement_unit: None,
    };
    assert_eq!(names(by_prefix, &mut conn), vec!["Sugar syrup", "sugar"]);

    let by_unit = IngredientFilter {
        name: Some("s".into()),
        measurement_unit: Some("g".into()),
    };
    assert_eq!(names(by_unit, &mut conn), vec!["salt", "sugar"]);

    let literal = IngredientFilter {
        name: Some("50%".into()),
        measurement_unit: None,
    };
    assert_eq!(names(literal, &mut conn), vec!["50%_cream"]);

    let cyrillic = IngredientFilter {
        name: Some("Мол".into()),
        measurement_unit: None,
    };
    assert_eq!(
        names(cyrillic, &mut conn),
        vec!["Молоко сгущённое", "молоко"]
    );

    let cyrillic_unit = IngredientFilter {
        name: Some("мОЛ".into()),
        measurement_unit: Some("мл".into()),
    };
    assert_eq!(names(cyrillic_unit, &mut conn), vec!["молоко"]);
}

#[test]
fn get_or_create() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();

    let (first, created) = get_or_create_ingredient(&mut conn, "flour", "g").unwrap();
    assert!(created);
    let (second, created) = get_or_create_ingredient(&mut conn, "flour", "g").unwrap();
    assert!(!created);
    assert_eq!(first, second);
    let (_, created) = get_or_create_ingredient(&mut conn, "flour", "kg").unwrap();
    assert!(created);
}
