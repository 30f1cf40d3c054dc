// Copyright 2023 Remi Bernotavicius

use derive_more::Display;
use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::Insertable;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
pub struct UserId(pub i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(table_name = crate::database::schema::users)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// PHC-formatted argon2 hash
    pub password: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone)]
#[diesel(belongs_to(User))]
#[diesel(primary_key(key))]
#[diesel(table_name = crate::database::schema::auth_tokens)]
pub struct AuthToken {
    pub key: String,
    pub user_id: UserId,
    pub created: chrono::NaiveDateTime,
}

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
pub struct TagId(pub i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Eq, Serialize)]
#[diesel(table_name = crate::database::schema::tags)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::tags)]
pub struct NewTag<'a> {
    pub name: &'a str,
    pub color: &'a str,
    pub slug: &'a str,
}

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
pub struct IngredientId(pub i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Eq, Serialize)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub measurement_unit: &'a str,
}

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
pub struct RecipeId(pub i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct Recipe {
    pub id: RecipeId,
    pub author_id: UserId,
    pub name: String,
    /// Path relative to the media root
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub author_id: UserId,
    pub name: &'a str,
    pub image: Option<&'a str>,
    pub text: &'a str,
    pub cooking_time: i32,
    pub pub_date: chrono::NaiveDateTime,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone, Debug)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Tag))]
#[diesel(primary_key(recipe_id, tag_id))]
#[diesel(table_name = crate::database::schema::recipe_tags)]
pub struct RecipeTag {
    pub recipe_id: RecipeId,
    pub tag_id: TagId,
}

#[derive(
    DieselNewType, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize,
)]
pub struct RecipeIngredientId(pub i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct RecipeIngredient {
    pub id: RecipeIngredientId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct NewRecipeIngredient {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone, Copy)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Recipe))]
#[diesel(primary_key(user_id, recipe_id))]
#[diesel(table_name = crate::database::schema::favorites)]
pub struct Favorite {
    pub user_id: UserId,
    pub recipe_id: RecipeId,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone, Copy)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Recipe))]
#[diesel(primary_key(user_id, recipe_id))]
#[diesel(table_name = crate::database::schema::shopping_cart)]
pub struct CartItem {
    pub user_id: UserId,
    pub recipe_id: RecipeId,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::subscriptions)]
pub struct NewSubscription {
    pub user_id: UserId,
    pub subscribing_id: UserId,
}
