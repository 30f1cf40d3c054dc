// Copyright 2023 Remi Bernotavicius

fn main() {
    // embed_migrations! only tracks the directory itself, not new migrations added to it
    println!("cargo:rerun-if-changed=migrations/");
}
