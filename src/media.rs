// Copyright 2023 Remi Bernotavicius

//! Storage for uploaded recipe images.
//!
//! Images arrive inside JSON bodies as base64, either bare or wrapped in a
//! `data:image/<type>;base64,` URI. They are written under the media root with
//! a random name and the database keeps the path relative to that root.

use crate::{Error, Result};
use base64::Engine as _;
use image::ImageFormat;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const RECIPE_IMAGES: &str = "recipes/images";

pub struct DecodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn decode(encoded: &str) -> Result<Self> {
        let payload = match encoded.strip_prefix("data:") {
            Some(uri) => {
                let (header, data) = uri
                    .split_once(',')
                    .ok_or_else(|| Error::validation("image: malformed data URI"))?;
                if !header.ends_with(";base64") {
                    return Err(Error::validation("image: data URI must be base64 encoded"));
                }
                data
            }
            None => encoded,
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::validation(format!("image: {e}")))?;
        let format = image::guess_format(&bytes)
            .map_err(|_| Error::validation("image: unrecognized image format"))?;

        Ok(Self { bytes, format })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

pub struct MediaStore {
    root: PathBuf,
    url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self {
            root: root.into(),
            url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Writes the image and returns its path relative to the media root.
    pub fn save(&self, image: &DecodedImage) -> Result<String> {
        let dir = self.root.join(RECIPE_IMAGES);
        fs::create_dir_all(&dir)?;

        let name = format!("{}.{}", uuid::Uuid::new_v4().simple(), image.extension());
        fs::write(dir.join(&name), &image.bytes)?;

        let relative = format!("{RECIPE_IMAGES}/{name}");
        info!("stored {:?} image {relative}", image.format());
        Ok(relative)
    }

    pub fn remove(&self, path: &str) {
        if let Err(e) = fs::remove_file(self.root.join(path)) {
            warn!("failed to remove image {path}: {e}");
        }
    }
}

#[cfg(test)]
pub const TEST_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

#[cfg(test)]
pub fn test_image_data_uri() -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(TEST_PNG)
    )
}

#[test]
fn decode_data_uri() {
    let image = DecodedImage::decode(&test_image_data_uri()).unwrap();
    assert_eq!(image.format(), ImageFormat::Png);
    assert_eq!(image.extension(), "png");
}

#[test]
fn decode_bare_base64() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(TEST_PNG);
    let image = DecodedImage::decode(&encoded).unwrap();
    assert_eq!(image.format(), ImageFormat::Png);
}

#[test]
fn decode_rejects_non_images() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"just some text");
    assert!(matches!(
        DecodedImage::decode(&encoded),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        DecodedImage::decode("data:image/png;base64,@@@"),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        DecodedImage::decode("data:image/png,rawbytes"),
        Err(Error::Validation(_))
    ));
}

#[test]
fn save_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path(), "/media");
    let image = DecodedImage::decode(&test_image_data_uri()).unwrap();

    let path = store.save(&image).unwrap();
    assert!(path.starts_with("recipes/images/"));
    assert!(path.ends_with(".png"));
    assert_eq!(fs::read(dir.path().join(&path)).unwrap(), TEST_PNG);
    assert_eq!(store.url_for(&path), format!("/media/{path}"));

    store.remove(&path);
    assert!(!dir.path().join(&path).exists());
}
