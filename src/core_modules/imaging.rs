// THEORY:
// The `imaging` module is the segmentation-and-measurement service. It is the
// only place in the engine that touches pixel data; everything downstream of
// it deals in sums, areas and ratios.
//
// Key architectural principles:
// 1.  **Grayscale-16 end to end**: channel TIFFs are decoded to 16-bit
//     luminance, the native depth of the microscope's detectors. Masks are
//     8-bit binary images (0 background, 255 foreground).
// 2.  **Global Otsu thresholding**: the mask generator picks the threshold
//     that maximizes between-class variance over the full intensity
//     histogram. Fluorescence frames are strongly bimodal (dark background,
//     bright marker), which is exactly the regime Otsu is built for.
// 3.  **Dominant-region measurement**: shape metrics are taken from the
//     largest 4-connected component of a mask, since an imaged field holds
//     one cell of interest plus speckle noise.
// 4.  **Stateless utility**: every function takes its inputs explicitly and
//     returns a value. Nothing here holds state between frames, which is what
//     lets the worker pool call this service from any task in any order.

use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageReader, Luma};

use crate::core_modules::error::ImagingError;

/// 16-bit grayscale channel image.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// The POI channel split by the nucleus mask, with summed intensities of
/// both sub-regions.
pub struct Segmentation {
    /// POI intensities outside the nucleus mask.
    pub cyto_image: Gray16Image,
    /// Summed POI intensity over the cytoplasm region.
    pub cyto_sum: u64,
    /// POI intensities inside the nucleus mask.
    pub nuc_image: Gray16Image,
    /// Summed POI intensity over the nucleus region.
    pub nuc_sum: u64,
}

/// The dominant connected region of a mask: the pixel coordinates it covers.
pub struct RegionLabel {
    pixels: Vec<(u32, u32)>,
}

/// Decodes a channel image and produces its binary segmentation mask via
/// Otsu thresholding.
pub fn mask_gen(path: &Path) -> Result<GrayImage, ImagingError> {
    let gray = load_gray16(path)?;
    let threshold = otsu_threshold(&gray);

    let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    Ok(mask)
}

/// Splits the POI channel image into nucleus and cytoplasm sub-regions using
/// the nucleus mask, and sums the intensity of each region.
pub fn mask_segmenter(nuc_mask: &GrayImage, poi_path: &Path) -> Result<Segmentation, ImagingError> {
    let poi = load_gray16(poi_path)?;

    if poi.dimensions() != nuc_mask.dimensions() {
        return Err(ImagingError::ShapeMismatch {
            mask_w: nuc_mask.width(),
            mask_h: nuc_mask.height(),
            img_w: poi.width(),
            img_h: poi.height(),
        });
    }

    let (width, height) = poi.dimensions();
    let mut cyto_image = Gray16Image::new(width, height);
    let mut nuc_image = Gray16Image::new(width, height);
    let mut cyto_sum = 0u64;
    let mut nuc_sum = 0u64;

    for (x, y, pixel) in poi.enumerate_pixels() {
        let value = pixel.0[0];
        if nuc_mask.get_pixel(x, y).0[0] > 0 {
            nuc_image.put_pixel(x, y, Luma([value]));
            nuc_sum += u64::from(value);
        } else {
            cyto_image.put_pixel(x, y, Luma([value]));
            cyto_sum += u64::from(value);
        }
    }

    Ok(Segmentation {
        cyto_image,
        cyto_sum,
        nuc_image,
        nuc_sum,
    })
}

/// Labels the dominant region of a binary mask: the largest 4-connected
/// component of foreground pixels. An all-background mask yields an empty
/// label.
pub fn img_labeler(mask: &GrayImage) -> RegionLabel {
    let (width, height) = mask.dimensions();
    let mut visited = vec![false; (width * height) as usize];
    let mut dominant: Vec<(u32, u32)> = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start_index = (start_y * width + start_x) as usize;
            if visited[start_index] || mask.get_pixel(start_x, start_y).0[0] == 0 {
                continue;
            }

            // Flood-fill one component from this seed.
            let mut component: Vec<(u32, u32)> = Vec::new();
            let mut queue: Vec<(u32, u32)> = vec![(start_x, start_y)];
            visited[start_index] = true;

            while let Some((x, y)) = queue.pop() {
                component.push((x, y));

                for (dx, dy) in &[(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let index = (ny * width + nx) as usize;
                    if !visited[index] && mask.get_pixel(nx, ny).0[0] > 0 {
                        visited[index] = true;
                        queue.push((nx, ny));
                    }
                }
            }

            if component.len() > dominant.len() {
                dominant = component;
            }
        }
    }

    RegionLabel { pixels: dominant }
}

/// Pixel area of a labeled region.
pub fn area_measure(label: &RegionLabel) -> f64 {
    label.pixels.len() as f64
}

/// Major/minor axis ratio of a labeled region, from its second-order central
/// moments. Always >= 1.0; degenerate regions (lines, single pixels) fall
/// back to the bounding-box ratio.
pub fn aspect_ratio(label: &RegionLabel) -> f64 {
    let n = label.pixels.len();
    if n == 0 {
        return 1.0;
    }

    let count = n as f64;
    let (sum_x, sum_y) = label
        .pixels
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x as f64, sy + y as f64));
    let mean_x = sum_x / count;
    let mean_y = sum_y / count;

    let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
    for &(x, y) in &label.pixels {
        let dx = x as f64 - mean_x;
        let dy = y as f64 - mean_y;
        mu20 += dx * dx;
        mu02 += dy * dy;
        mu11 += dx * dy;
    }
    mu20 /= count;
    mu02 /= count;
    mu11 /= count;

    let spread = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
    let lambda_major = (mu20 + mu02 + spread) / 2.0;
    let lambda_minor = (mu20 + mu02 - spread) / 2.0;

    if lambda_minor <= f64::EPSILON {
        return bounding_box_ratio(&label.pixels);
    }
    (lambda_major / lambda_minor).sqrt()
}

/// Persists a sub-region image as a PNG artifact. `stem` is the path without
/// an extension, e.g. `Results/img/Position001_t03_cyto`.
pub fn img_writer(stem: &Path, image: &Gray16Image) -> Result<(), ImagingError> {
    image.save(stem.with_extension("png"))?;
    Ok(())
}

fn load_gray16(path: &Path) -> Result<Gray16Image, ImagingError> {
    let decoded = ImageReader::open(path)
        .map_err(image::ImageError::IoError)?
        .decode()?;
    Ok(decoded.to_luma16())
}

/// Otsu's method over the full 16-bit histogram: the threshold that
/// maximizes between-class variance.
fn otsu_threshold(image: &Gray16Image) -> u16 {
    let mut histogram = vec![0u64; u16::MAX as usize + 1];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total = u64::from(image.width()) * u64::from(image.height());
    let total_weighted: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, count)| value as f64 * *count as f64)
        .sum();

    let mut best_threshold = 0u16;
    let mut best_variance = 0.0f64;
    let mut background_count = 0u64;
    let mut background_weighted = 0.0f64;

    for (value, count) in histogram.iter().enumerate() {
        background_count += count;
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_weighted += value as f64 * *count as f64;

        let mean_background = background_weighted / background_count as f64;
        let mean_foreground = (total_weighted - background_weighted) / foreground_count as f64;
        let between_class = background_count as f64
            * foreground_count as f64
            * (mean_background - mean_foreground).powi(2);

        if between_class > best_variance {
            best_variance = between_class;
            best_threshold = value as u16;
        }
    }

    best_threshold
}

fn bounding_box_ratio(pixels: &[(u32, u32)]) -> f64 {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    for &(x, y) in pixels {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let width = (max_x - min_x + 1) as f64;
    let height = (max_y - min_y + 1) as f64;
    width.max(height) / width.min(height)
}
