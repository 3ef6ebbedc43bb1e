//! Renders a cropped window of an occupancy grid as a grayscale PNG, for
//! the submap-texture operation consoles use to preview a map in progress.

use image::{GrayImage, Luma};

/// Crops `width x height` cells out of `grid` (row-major, one byte per
/// cell) centered at `(center_x, center_y)` and encodes the result as PNG.
pub fn render_submap_png(
    grid: &[u8],
    grid_width: u32,
    grid_height: u32,
    center_x: i32,
    center_y: i32,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let mut image = GrayImage::new(width, height);
    let half_w = (width / 2) as i32;
    let half_h = (height / 2) as i32;

    for (out_y, row) in (0..height).enumerate() {
        let src_y = center_y - half_h + row as i32;
        for out_x in 0..width {
            let src_x = center_x - half_w + out_x as i32;
            let value = if src_x >= 0
                && src_y >= 0
                && (src_x as u32) < grid_width
                && (src_y as u32) < grid_height
            {
                grid[(src_y as u32 * grid_width + src_x as u32) as usize]
            } else {
                // unknown cells render mid-gray, matching occupancy-grid convention
                127
            };
            image.put_pixel(out_x, out_y as u32, Luma([value]));
        }
    }

    let mut png_bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .expect("in-memory PNG encoding cannot fail");
    png_bytes
}
