// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::UserId;
use crate::Result;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl fmt::Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} {}", self.name, self.amount, self.measurement_unit)
    }
}

fn aggregate(rows: impl IntoIterator<Item = (String, String, i32)>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for (name, unit, amount) in rows {
        *totals.entry((name, unit)).or_default() += i64::from(amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListItem {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

/// Everything needed for the recipes in `user`'s cart, summed per ingredient
/// and ordered by name then unit.
pub fn shopping_list(conn: &mut database::Connection, user: UserId) -> Result<Vec<ShoppingListItem>> {
    use database::schema::{ingredients, recipe_ingredients, shopping_cart};

    let rows: Vec<(String, String, i32)> = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(
            recipe_ingredients::recipe_id.eq_any(
                shopping_cart::table
                    .filter(shopping_cart::user_id.eq(user))
                    .select(shopping_cart::recipe_id),
            ),
        )
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load(conn)?;

    Ok(aggregate(rows))
}

pub fn render(items: &[ShoppingListItem]) -> String {
    items.iter().map(|item| format!("{item}\n")).collect()
}

#[test]
fn aggregate_sums_per_name_and_unit() {
    use maplit::btreemap;

    let rows = vec![
        ("sugar".to_owned(), "g".to_owned(), 100),
        ("eggs".to_owned(), "pcs".to_owned(), 2),
        ("sugar".to_owned(), "g".to_owned(), 50),
        ("sugar".to_owned(), "tbsp".to_owned(), 1),
    ];
    let totals: BTreeMap<(String, String), i64> = aggregate(rows)
        .into_iter()
        .map(|i| ((i.name, i.measurement_unit), i.amount))
        .collect();
    assert_eq!(
        totals,
        btreemap! {
            ("eggs".to_owned(), "pcs".to_owned()) => 2,
            ("sugar".to_owned(), "g".to_owned()) => 150,
            ("sugar".to_owned(), "tbsp".to_owned()) => 1,
        }
    );
}

#[test]
fn render_lines() {
    let items = aggregate(vec![
        ("milk".to_owned(), "ml".to_owned(), 200),
        ("eggs".to_owned(), "pcs".to_owned(), 3),
    ]);
    assert_eq!(render(&items), "eggs - 3 pcs\nmilk - 200 ml\n");
    assert_eq!(render(&[]), "");
}

#[test]
fn shopping_list_covers_carted_recipes_only() {
    use super::{memberships, Fixture, Membership};

    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let fx = Fixture::new(&mut conn);

    let pancakes = fx.publish(&mut conn, "pancakes", &[], &[(0, 2), (1, 300), (2, 200)]);
    let crepes = fx.publish(&mut conn, "crepes", &[], &[(0, 3), (1, 500)]);
    fx.publish(&mut conn, "bread", &[], &[(2, 1000)]);

    for id in [pancakes, crepes] {
        memberships::add(&mut conn, &fx.media, Membership::ShoppingCart, fx.reader.id, id).unwrap();
    }

    let list = shopping_list(&mut conn, fx.reader.id).unwrap();
    assert_eq!(
        render(&list),
        "eggs - 5 pcs\nflour - 200 g\nmilk - 800 ml\n"
    );
    assert!(shopping_list(&mut conn, fx.author.id).unwrap().is_empty());
}
