use std::io::Cursor;
use std::path::Path;

use image::imageops::invert;
use image::{GrayImage, ImageFormat, ImageReader, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use crate::services::denoise::{non_local_means, DOCUMENT_DENOISE};
use crate::services::scratch::ScratchFile;

/// Threshold used when Otsu's method has nothing to separate (single-intensity images).
pub const BINARY_THRESHOLD_BASE: u8 = 128;

const FOREGROUND: Luma<u8> = Luma([255]);

/// Prepare the image at `source` for recognition.
///
/// Returns `Ok(None)` when no text-bearing region is found. On success the
/// cleaned image is written as PNG to a new scratch file in `scratch_dir`,
/// named after the source file, with dark text on a white page. `source` is never modified, and nothing is
/// written on the `None` and error paths.
pub fn preprocess_file(
    source: &Path,
    scratch_dir: &Path,
) -> Result<Option<ScratchFile>, PreprocessError> {
    let decoded = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(PreprocessError::Decode)?;

    let gray = decoded.to_luma8();
    let (width, height) = gray.dimensions();

    let Some(mut prepared) = prepare(&gray) else {
        tracing::warn!(source = %source.display(), width, height, "No text areas detected in the image");
        return Ok(None);
    };

    // Recognition expects dark glyphs on a light background.
    invert(&mut prepared);

    let mut encoded = Cursor::new(Vec::new());
    prepared
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(PreprocessError::Encode)?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let output = ScratchFile::write(
        scratch_dir,
        &format!("preprocessed_{}", stem),
        ".png",
        encoded.get_ref(),
    )?;

    tracing::debug!(
        source = %source.display(),
        output = %output.path().display(),
        width,
        height,
        "Image preprocessed"
    );

    Ok(Some(output))
}

/// Binarize, denoise and mask a grayscale image down to its text regions.
///
/// Returns `None` when the denoised binary image has no external contour.
pub fn prepare(gray: &GrayImage) -> Option<GrayImage> {
    let binary = binarize(gray);
    let denoised = non_local_means(&binary, &DOCUMENT_DENOISE);

    let contours = external_contours(&denoised);
    if contours.is_empty() {
        return None;
    }

    let mask = contour_mask(denoised.dimensions(), &contours);
    Some(bitwise_and(&denoised, &mask))
}

/// Global Otsu binarization. Dark ink (at or below the threshold) becomes
/// foreground (255), paper becomes background (0).
pub fn binarize(gray: &GrayImage) -> GrayImage {
    let level = threshold_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            FOREGROUND
        } else {
            Luma([0])
        }
    })
}

fn threshold_level(gray: &GrayImage) -> u8 {
    let mut pixels = gray.pixels().map(|p| p[0]);
    let Some(first) = pixels.next() else {
        return BINARY_THRESHOLD_BASE;
    };
    if pixels.all(|v| v == first) {
        return BINARY_THRESHOLD_BASE;
    }
    otsu_level(gray)
}

/// Outermost contours of the non-zero regions, each reduced to its corner
/// points (runs of collinear boundary points collapse to their endpoints).
pub fn external_contours(binary: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .map(|c| c.points)
        .collect()
}

/// Drop every point that continues the previous step's direction.
pub fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let step = |a: Point<i32>, b: Point<i32>| (b.x - a.x, b.y - a.y);
    let kept: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        points[..1].to_vec()
    } else {
        kept
    }
}

/// Same-size mask, white inside and on every contour.
fn contour_mask((width, height): (u32, u32), contours: &[Vec<Point<i32>>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    for boundary in contours {
        let mut polygon = simplify_chain(boundary);
        if polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        if polygon.len() >= 3 {
            draw_polygon_mut(&mut mask, &polygon, FOREGROUND);
        }
        // The polygon fill can miss one-pixel-wide strokes; the traced boundary cannot.
        for p in boundary {
            mask.put_pixel(p.x as u32, p.y as u32, FOREGROUND);
        }
    }

    mask
}

fn bitwise_and(image: &GrayImage, mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] & mask.get_pixel(x, y)[0]])
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a decodable image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode preprocessed image: {0}")]
    Encode(image::ImageError),

    #[error("Preprocessing task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}
