use image::{GrayImage, Luma};

/// Parameters of a non-local means pass over a single-channel image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlMeansParams {
    /// Filter strength `h`. Larger values remove more noise and more detail.
    pub strength: f32,
    /// Side of the square patch compared between pixels. Odd.
    pub template_window: u32,
    /// Side of the square area searched for similar patches. Odd.
    pub search_window: u32,
}

/// Settings tuned for binarized document scans.
pub const DOCUMENT_DENOISE: NlMeansParams = NlMeansParams {
    strength: 30.0,
    template_window: 7,
    search_window: 21,
};

/// Patches less similar than this contribute nothing.
const MIN_WEIGHT: f64 = 0.001;

/// Non-local means denoising.
///
/// Each output pixel is the weighted mean of every pixel in its search
/// window, weighted by `exp(-d / h^2)` where `d` is the mean squared
/// difference between the two pixels' template patches. Patch distances are
/// computed per search offset with an integral image, so the cost is
/// `O(width * height * search_window^2)` regardless of the template size.
/// Borders replicate the edge pixels.
pub fn non_local_means(image: &GrayImage, params: &NlMeansParams) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let t = (params.template_window / 2) as usize;
    let s = (params.search_window / 2) as usize;
    let w = width as usize;
    let h = height as usize;

    let padded = Padded::new(image, t + s);
    let inv_h2 = 1.0 / f64::from(params.strength * params.strength).max(f64::EPSILON);
    let area = ((2 * t + 1) * (2 * t + 1)) as f64;

    // Integral image of squared differences over the template-padded domain.
    let iw = w + 2 * t + 1;
    let ih = h + 2 * t + 1;
    let mut integral = vec![0u64; iw * ih];

    let mut weight_sum = vec![0f64; w * h];
    let mut value_sum = vec![0f64; w * h];

    let span = s as isize;
    for dy in -span..=span {
        for dx in -span..=span {
            for py in 0..(h + 2 * t) {
                let mut row = 0u64;
                for px in 0..(w + 2 * t) {
                    let x = px as isize - t as isize;
                    let y = py as isize - t as isize;
                    let d = i64::from(padded.at(x, y)) - i64::from(padded.at(x + dx, y + dy));
                    row += (d * d) as u64;
                    integral[(py + 1) * iw + px + 1] = integral[py * iw + px + 1] + row;
                }
            }

            for y in 0..h {
                for x in 0..w {
                    let x0 = x;
                    let y0 = y;
                    let x1 = x + 2 * t + 1;
                    let y1 = y + 2 * t + 1;
                    let ssd = integral[y1 * iw + x1] + integral[y0 * iw + x0]
                        - integral[y0 * iw + x1]
                        - integral[y1 * iw + x0];

                    let weight = (-(ssd as f64 / area) * inv_h2).exp();
                    if weight < MIN_WEIGHT {
                        continue;
                    }

                    let neighbor = padded.at(x as isize + dx, y as isize + dy);
                    let i = y * w + x;
                    weight_sum[i] += weight;
                    value_sum[i] += weight * f64::from(neighbor);
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let i = y as usize * w + x as usize;
        // The zero offset always contributes weight 1.
        let v = value_sum[i] / weight_sum[i];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Edge-replicated copy of an image so window lookups never bounds-check.
struct Padded {
    data: Vec<u8>,
    stride: usize,
    pad: usize,
}

impl Padded {
    fn new(image: &GrayImage, pad: usize) -> Self {
        let (width, height) = image.dimensions();
        let stride = width as usize + 2 * pad;
        let rows = height as usize + 2 * pad;
        let mut data = Vec::with_capacity(stride * rows);
        for py in 0..rows {
            let y = (py as isize - pad as isize).clamp(0, height as isize - 1) as u32;
            for px in 0..stride {
                let x = (px as isize - pad as isize).clamp(0, width as isize - 1) as u32;
                data.push(image.get_pixel(x, y)[0]);
            }
        }
        Self { data, stride, pad }
    }

    /// Pixel at image coordinates, which may lie up to `pad` outside the image.
    fn at(&self, x: isize, y: isize) -> u8 {
        let px = (x + self.pad as isize) as usize;
        let py = (y + self.pad as isize) as usize;
        self.data[py * self.stride + px]
    }
}
