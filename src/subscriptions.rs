// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{NewSubscription, Recipe, User, UserId};
use crate::media::MediaStore;
use crate::pagination::LimitOffset;
use crate::recipes::RecipeSummary;
use crate::users;
use crate::{Error, Result};
use diesel::ExpressionMethods as _;
use diesel::JoinOnDsl as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use log::info;
use serde::Serialize;

/// An author the requester follows, with a sample of their recipes.
#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionView {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

fn view_for(
    conn: &mut database::Connection,
    media: &MediaStore,
    author: User,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionView> {
    use database::schema::recipes::dsl::*;

    let recipes_count: i64 = recipes
        .filter(author_id.eq(author.id))
        .count()
        .get_result(conn)?;

    let mut query = recipes
        .select(Recipe::as_select())
        .filter(author_id.eq(author.id))
        .order((pub_date.desc(), id.desc()))
        .into_boxed();
    if let Some(n) = recipes_limit {
        query = query.limit(n);
    }
    let sample = query
        .load(conn)?
        .into_iter()
        .map(|r| RecipeSummary::new(r, media))
        .collect();

    Ok(SubscriptionView {
        email: author.email,
        id: author.id,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed: true,
        recipes: sample,
        recipes_count,
    })
}

fn is_subscribed(conn: &mut database::Connection, user: UserId, author: UserId) -> Result<bool> {
    use database::schema::subscriptions::dsl::*;

    let count: i64 = subscriptions
        .filter(user_id.eq(user))
        .filter(subscribing_id.eq(author))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn subscribe(
    conn: &mut database::Connection,
    media: &MediaStore,
    user: UserId,
    author: UserId,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionView> {
    use database::schema::subscriptions;

    let target = users::get(conn, author)?;
    if user == author {
        return Err(Error::validation("you cannot subscribe to yourself"));
    }
    if is_subscribed(conn, user, author)? {
        return Err(Error::validation(format!(
            "already subscribed to {}",
            target.username
        )));
    }

    diesel::insert_into(subscriptions::table)
        .values(NewSubscription {
            user_id: user,
            subscribing_id: author,
        })
        .execute(conn)?;
    info!("user {user} subscribed to {author}");

    view_for(conn, media, target, recipes_limit)
}

pub fn unsubscribe(conn: &mut database::Connection, user: UserId, author: UserId) -> Result<()> {
    use database::schema::subscriptions::dsl::*;

    users::get(conn, author)?;
    let deleted = diesel::delete(
        subscriptions
            .filter(user_id.eq(user))
            .filter(subscribing_id.eq(author)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(Error::NotFound("subscription"));
    }
    info!("user {user} unsubscribed from {author}");
    Ok(())
}

/// Authors `user` follows, in the order they were subscribed to.
pub fn list(
    conn: &mut database::Connection,
    media: &MediaStore,
    user: UserId,
    page: LimitOffset,
    recipes_limit: Option<i64>,
) -> Result<(i64, Vec<SubscriptionView>)> {
    use database::schema::{subscriptions, users};

    let count: i64 = subscriptions::table
        .filter(subscriptions::user_id.eq(user))
        .count()
        .get_result(conn)?;

    let authors: Vec<User> = subscriptions::table
        .inner_join(users::table.on(users::id.eq(subscriptions::subscribing_id)))
        .filter(subscriptions::user_id.eq(user))
        .order(subscriptions::id)
        .limit(page.limit)
        .offset(page.offset)
        .select(User::as_select())
        .load(conn)?;

    let views = authors
        .into_iter()
        .map(|author| view_for(conn, media, author, recipes_limit))
        .collect::<Result<_>>()?;
    Ok((count, views))
}

#[cfg(test)]
use crate::recipes::Fixture;

#[test]
fn subscribe_and_list() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);
    let other = users::register(&mut conn, &users::registration("other")).unwrap();

    let first = fx.publish(&mut conn, "porridge", &[], &[(0, 1)]);
    let second = fx.publish(&mut conn, "toast", &[], &[(0, 1)]);
    let third = fx.publish(&mut conn, "soup", &[], &[(0, 1)]);

    let view = subscribe(&mut conn, &fx.media, fx.reader.id, fx.author.id, Some(2)).unwrap();
    assert!(view.is_subscribed);
    assert_eq!(view.recipes_count, 3);
    let sample: Vec<_> = view.recipes.iter().map(|r| r.id).collect();
    assert_eq!(sample, vec![third, second]);

    subscribe(&mut conn, &fx.media, fx.reader.id, other.id, None).unwrap();

    let (count, page) = list(
        &mut conn,
        &fx.media,
        fx.reader.id,
        LimitOffset {
            limit: 10,
            offset: 0,
        },
        None,
    )
    .unwrap();
    assert_eq!(count, 2);
    assert_eq!(page[0].id, fx.author.id);
    assert_eq!(page[0].recipes.len(), 3);
    assert_eq!(page[0].recipes[2].id, first);
    assert_eq!(page[1].id, other.id);
    assert!(page[1].recipes.is_empty());

    let (count, page) = list(
        &mut conn,
        &fx.media,
        fx.reader.id,
        LimitOffset {
            limit: 1,
            offset: 1,
        },
        Some(0),
    )
    .unwrap();
    assert_eq!(count, 2);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, other.id);

    // the author now shows as subscribed to the reader
    let author = users::view(&mut conn, Some(fx.reader.id), fx.author.clone()).unwrap();
    assert!(author.is_subscribed);
    let author = users::view(&mut conn, None, fx.author.clone()).unwrap();
    assert!(!author.is_subscribed);
}

#[test]
fn subscribe_rejections() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    assert!(matches!(
        subscribe(&mut conn, &fx.media, fx.reader.id, UserId(404), None),
        Err(Error::NotFound("user"))
    ));
    assert!(matches!(
        subscribe(&mut conn, &fx.media, fx.reader.id, fx.reader.id, None),
        Err(Error::Validation(_))
    ));
    subscribe(&mut conn, &fx.media, fx.reader.id, fx.author.id, None).unwrap();
    assert!(matches!(
        subscribe(&mut conn, &fx.media, fx.reader.id, fx.author.id, None),
        Err(Error::Validation(_))
    ));

    unsubscribe(&mut conn, fx.reader.id, fx.author.id).unwrap();
    assert!(matches!(
        unsubscribe(&mut conn, fx.reader.id, fx.author.id),
        Err(Error::NotFound("subscription"))
    ));
    assert!(matches!(
        unsubscribe(&mut conn, fx.reader.id, UserId(404)),
        Err(Error::NotFound("user"))
    ));
}
