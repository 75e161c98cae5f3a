//! Atlas Operations - Pure functions over atlas geometry

use super::atlas_data::{AtlasRect, PageGeometry, PageId, UvRect};
use rustc_hash::FxHashMap;

/// Convert a normalized UV rectangle to a pixel rectangle on a `page_width x page_height` page.
///
/// The min edge is floored and clamped to `[0, dim - 1]`, the max edge is
/// ceiled and clamped to `[0, dim]`. Returns `None` when the result has no area.
pub fn uv_to_pixel_rect(uv: &UvRect, page_width: u32, page_height: u32) -> Option<AtlasRect> {
    if page_width == 0 || page_height == 0 {
        return None;
    }

    let (x0, x1) = pixel_span(uv.min.x, uv.max.x, page_width);
    let (y0, y1) = pixel_span(uv.min.y, uv.max.y, page_height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(AtlasRect::new(x0, y0, x1 - x0, y1 - y0))
}

fn pixel_span(a: f32, b: f32, dim: u32) -> (u32, u32) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let dim_f = dim as f64;
    let start = (lo as f64 * dim_f).floor().clamp(0.0, dim_f - 1.0);
    let end = (hi as f64 * dim_f).ceil().clamp(0.0, dim_f);
    // clamp passes NaN through
    let start = if start.is_nan() { 0.0 } else { start };
    let end = if end.is_nan() { 0.0 } else { end };
    (start as u32, end as u32)
}

/// Overlap of two rectangles, `None` when they do not intersect
pub fn intersect(a: &AtlasRect, b: &AtlasRect) -> Option<AtlasRect> {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = a.right().min(b.right());
    let y1 = a.bottom().min(b.bottom());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(AtlasRect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Active pages keyed by id. A repeated id keeps the last geometry reported.
pub fn page_sizes(pages: &[PageGeometry]) -> FxHashMap<PageId, (u32, u32)> {
    pages
        .iter()
        .filter(|p| p.is_active())
        .map(|p| (p.atlas_texture_id, (p.width, p.height)))
        .collect()
}
