pub mod anthropic;
pub mod google;
pub mod openai;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageOutputFormat, RgbImage};

pub(super) fn to_jpeg_data_url(image: &RgbImage) -> String {
    let mut buf = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90))
        .expect("in-memory JPEG encode cannot fail");
    format!("data:image/jpeg;base64,{}", BASE64.encode(buf))
}

pub(super) fn to_jpeg_base64(image: &RgbImage) -> String {
    let mut buf = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90))
        .expect("in-memory JPEG encode cannot fail");
    BASE64.encode(buf)
}
