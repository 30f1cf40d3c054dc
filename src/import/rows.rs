// Copyright 2023 Remi Bernotavicius

use serde::Deserialize;
use std::io;
use std::path::Path;

/// One line of an ingredient fixture file: `name,measurement_unit`, no header.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientRow {
    pub name: String,
    pub measurement_unit: String,
}

fn builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).trim(csv::Trim::All);
    builder
}

pub fn decode_rows(reader: impl io::Read) -> csv::Result<Vec<IngredientRow>> {
    builder().from_reader(reader).deserialize().collect()
}

pub fn decode_rows_from_path(path: impl AsRef<Path>) -> csv::Result<Vec<IngredientRow>> {
    decode_rows(std::fs::File::open(path)?)
}

#[test]
fn decode_trims_fields() {
    let input = "flour, g\n\"salt, coarse\",pinch\n\nmilk,ml\n";
    let rows = decode_rows(input.as_bytes()).unwrap();
    assert_eq!(
        rows,
        vec![
            IngredientRow {
                name: "flour".into(),
                measurement_unit: "g".into()
            },
            IngredientRow {
                name: "salt, coarse".into(),
                measurement_unit: "pinch".into()
            },
            IngredientRow {
                name: "milk".into(),
                measurement_unit: "ml".into()
            },
        ]
    );
}

#[test]
fn decode_rejects_short_rows() {
    assert!(decode_rows("flour\n".as_bytes()).is_err());
}
