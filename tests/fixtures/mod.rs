//! Synthetic images for tests.

#![allow(dead_code)]

use std::io::Cursor;

use clipforge::models::frame::EncodedImage;

/// PNG bytes of a solid-colour image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

/// A PNG as the generative API would return it inline.
pub fn generated_png(width: u32, height: u32) -> EncodedImage {
    EncodedImage::from_bytes("image/png", &png_bytes(width, height))
}

pub fn start_frame() -> EncodedImage {
    EncodedImage::from_bytes("image/jpeg", b"\xff\xd8\xff\xe0 start")
}

pub fn end_frame() -> EncodedImage {
    EncodedImage::from_bytes("image/jpeg", b"\xff\xd8\xff\xe0 end")
}

pub const STRUCTURED_ANALYSIS: &str =
    r#"{"chineseDescription":"雨夜街头，霓虹灯倒映在积水中","englishPrompt":"rainy neon street at night, reflections in puddles, cinematic"}"#;

pub const UNSTRUCTURED_ANALYSIS: &str =
    "Rainy neon street at night with reflections in puddles, cinematic lighting";
