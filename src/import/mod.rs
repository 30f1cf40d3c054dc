// Copyright 2023 Remi Bernotavicius

//! Bulk loading of the ingredient catalog from a CSV fixture.

use crate::catalog;
use crate::database;
use crate::Result;
use diesel::Connection as _;
use log::{info, warn};
use std::path::Path;

mod rows;

use rows::IngredientRow;

pub struct IngredientImporter {
    rows: Vec<IngredientRow>,
    total: usize,
    num_created: usize,
    num_skipped: usize,
}

impl IngredientImporter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_rows(rows::decode_rows_from_path(path)?))
    }

    fn from_rows(rows: Vec<IngredientRow>) -> Self {
        Self {
            total: rows.len(),
            rows,
            num_created: 0,
            num_skipped: 0,
        }
    }

    pub fn done(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_created(&self) -> usize {
        self.num_created
    }

    pub fn num_skipped(&self) -> usize {
        self.num_skipped
    }

    pub fn percent_done(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.rows.len()) as f32 / self.total as f32
    }

    /// Imports the next batch of rows in one transaction.
    pub fn import_one(&mut self, conn: &mut database::Connection) -> Result<()> {
        const BATCH_SIZE: usize = 50;
        let batch: Vec<IngredientRow> = self
            .rows
            .drain(..BATCH_SIZE.min(self.rows.len()))
            .collect();

        let (created, skipped) = conn.transaction(|conn| -> Result<(usize, usize)> {
            let mut created = 0;
            let mut skipped = 0;
            for row in &batch {
                if row.name.is_empty() || row.measurement_unit.is_empty() {
                    warn!("skipping incomplete row {row:?}");
                    skipped += 1;
                    continue;
                }
                let (ingredient, new) =
                    catalog::get_or_create_ingredient(conn, &row.name, &row.measurement_unit)?;
                if new {
                    info!("added {} ({})", ingredient.name, ingredient.measurement_unit);
                    created += 1;
                } else {
                    info!(
                        "{} ({}) already exists",
                        ingredient.name, ingredient.measurement_unit
                    );
                    skipped += 1;
                }
            }
            Ok((created, skipped))
        })?;

        self.num_created += created;
        self.num_skipped += skipped;
        Ok(())
    }
}

/// Returns the number of ingredients created and skipped.
pub fn import_ingredients(
    conn: &mut database::Connection,
    path: impl AsRef<Path>,
) -> Result<(usize, usize)> {
    let mut importer = IngredientImporter::new(path)?;

    while !importer.done() {
        importer.import_one(conn)?;
        info!("imported {:.0}%", importer.percent_done() * 100.0);
    }

    info!(
        "ingredient import finished: {} created, {} skipped",
        importer.num_created(),
        importer.num_skipped()
    );
    Ok((importer.num_created(), importer.num_skipped()))
}

#[test]
fn import_skips_existing_pairs() {
    use std::io::Write as _;

    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    catalog::create_ingredient(&mut conn, &catalog::ingredient_input("flour", "g")).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "flour,g\nflour,kg\nmilk,ml\nmilk,ml\n,g").unwrap();

    let (created, skipped) = import_ingredients(&mut conn, file.path()).unwrap();
    assert_eq!((created, skipped), (2, 3));

    let all = catalog::list_ingredients(&mut conn, &catalog::IngredientFilter::default()).unwrap();
    let pairs: Vec<_> = all
        .iter()
        .map(|i| (i.name.as_str(), i.measurement_unit.as_str()))
        .collect();
    assert_eq!(pairs, vec![("flour", "g"), ("flour", "kg"), ("milk", "ml")]);
}

#[test]
fn import_in_batches() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();

    let rows = (0..120)
        .map(|n| IngredientRow {
            name: format!("ingredient {n}"),
            measurement_unit: "g".into(),
        })
        .collect();
    let mut importer = IngredientImporter::from_rows(rows);
    importer.import_one(&mut conn).unwrap();
    assert_eq!(importer.num_created(), 50);
    assert!(!importer.done());
    while !importer.done() {
        importer.import_one(&mut conn).unwrap();
    }
    assert_eq!(importer.num_created(), 120);
    assert_eq!(importer.percent_done(), 1.0);
}

#[test]
fn missing_file_is_an_error() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    assert!(import_ingredients(&mut conn, "/nonexistent/ingredients.csv").is_err());
}
