//! Bounding box scaling.

/// Scale `width` x `height` down to fit a `max_width` x `max_height` box.
///
/// Both axes are scaled by the same ratio and rounded to whole pixels.
/// Images already inside the box keep their size. Neither side rounds down
/// to zero, so a 5000x1 strip still yields a 1-pixel-tall image.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let ratio = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let scaled_width = (f64::from(width) * ratio).round().clamp(1.0, f64::from(max_width));
    let scaled_height = (f64::from(height) * ratio).round().clamp(1.0, f64::from(max_height));

    (scaled_width as u32, scaled_height as u32)
}
