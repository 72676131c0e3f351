//! Synthetic images and job payloads for pipeline tests

#![allow(dead_code)]

use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;

use doc_extract_worker::models::job::ExtractionJob;

pub const BUCKET: &str = "docs";

/// Small scanned "page": light paper with one dark word-sized block.
pub fn page_png() -> Vec<u8> {
    let mut img = GrayImage::from_pixel(96, 48, Luma([245]));
    for y in 18..30 {
        for x in 20..70 {
            img.put_pixel(x, y, Luma([15]));
        }
    }
    encode(&img)
}

/// An all-white page: nothing to recognize.
pub fn blank_png() -> Vec<u8> {
    encode(&GrayImage::from_pixel(64, 32, Luma([255])))
}

/// Bytes that no image decoder accepts.
pub fn garbage() -> Vec<u8> {
    b"%PDF-1.7 this is not a raster image".to_vec()
}

fn encode(img: &GrayImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn job(document_id: i64, file_key: &str) -> ExtractionJob {
    ExtractionJob {
        document_id,
        file_key: file_key.to_string(),
        bucket: BUCKET.to_string(),
        extension: "png".to_string(),
        language: Some("eng".to_string()),
        user_id: None,
    }
}

pub fn payload(job: &ExtractionJob) -> String {
    serde_json::to_string(job).unwrap()
}
