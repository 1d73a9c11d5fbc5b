// ABOUTME: Rectangle geometry and image/text overlap resolution
// ABOUTME: Moves or proportionally shrinks an image rect so it never covers the text body

use log::debug;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0.0 {
            0.0
        } else {
            self.width / self.height
        }
    }

    /// True when the interiors overlap; touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right() - EPSILON
            && other.left < self.right() - EPSILON
            && self.top < other.bottom() - EPSILON
            && other.top < self.bottom() - EPSILON
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left - EPSILON
            && other.top >= self.top - EPSILON
            && other.right() <= self.right() + EPSILON
            && other.bottom() <= self.bottom() + EPSILON
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Rect::new(
            left,
            top,
            self.right().max(other.right()) - left,
            self.bottom().max(other.bottom()) - top,
        )
    }

    pub fn scaled(&self, factor: f64) -> Rect {
        Rect::new(self.left, self.top, self.width * factor, self.height * factor)
    }
}

/// Which side of the body an image ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Right,
    Left,
    Above,
    Below,
}

/// Places an image rect so it does not overlap a text body rect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapResolver {
    min_visible: f64,
    gap: f64,
}

impl OverlapResolver {
    pub fn new(min_visible: f64) -> Self {
        Self {
            min_visible,
            gap: 0.0,
        }
    }

    /// Keep at least `gap` between the body and a moved image.
    pub fn with_gap(mut self, gap: f64) -> Self {
        self.gap = gap.max(0.0);
        self
    }

    pub fn min_visible(&self) -> f64 {
        self.min_visible
    }

    /// Returns a placement for `image` that does not intersect `body` and lies
    /// inside `canvas`, or `None` when even the minimum size does not fit.
    pub fn resolve(&self, body: &Rect, image: &Rect, canvas: &Rect) -> Option<Rect> {
        if !body.intersects(image) {
            return Some(*image);
        }

        if let Some(rect) = self.shift_horizontally(body, image, canvas, Side::Right) {
            debug!("Image shifted right of body to {:?}", rect);
            return Some(rect);
        }
        if let Some(rect) = self.shift_horizontally(body, image, canvas, Side::Left) {
            debug!("Image shifted left of body to {:?}", rect);
            return Some(rect);
        }
        if let Some(rect) = self.place_vertically(body, image, canvas, Side::Above) {
            debug!("Image placed above body at {:?}", rect);
            return Some(rect);
        }
        if let Some(rect) = self.place_vertically(body, image, canvas, Side::Below) {
            debug!("Image placed below body at {:?}", rect);
            return Some(rect);
        }

        let result = self.shrink_into_largest_side(body, image, canvas);
        match result {
            Some(rect) => debug!("Image aggressively shrunk to {:?}", rect),
            None => debug!("No room for image {:?} around body {:?}", image, body),
        }
        result
    }

    fn shift_horizontally(&self, body: &Rect, image: &Rect, canvas: &Rect, side: Side) -> Option<Rect> {
        let region = self.region(body, canvas, side);
        if image.width > region.width + EPSILON || image.height > region.height + EPSILON {
            return None;
        }
        let left = match side {
            Side::Right => region.left,
            _ => region.right() - image.width,
        };
        let top = clamp(body.center_y() - image.height / 2.0, canvas.top, canvas.bottom() - image.height);
        Some(Rect::new(left, top, image.width, image.height))
    }

    fn place_vertically(&self, body: &Rect, image: &Rect, canvas: &Rect, side: Side) -> Option<Rect> {
        let region = self.region(body, canvas, side);
        let size = self.fit(image, &region)?;
        let top = match side {
            Side::Above => region.bottom() - size.height,
            _ => region.top,
        };
        let left = clamp(body.center_x() - size.width / 2.0, canvas.left, canvas.right() - size.width);
        Some(Rect::new(left, top, size.width, size.height))
    }

    fn shrink_into_largest_side(&self, body: &Rect, image: &Rect, canvas: &Rect) -> Option<Rect> {
        let side = [Side::Right, Side::Left, Side::Above, Side::Below]
            .into_iter()
            .max_by(|a, b| {
                self.region(body, canvas, *a)
                    .area()
                    .total_cmp(&self.region(body, canvas, *b).area())
            })?;
        let region = self.region(body, canvas, side);
        let size = self.fit(image, &region)?;
        let (left, top) = match side {
            Side::Right | Side::Left => (
                region.left + (region.width - size.width) / 2.0,
                clamp(body.center_y() - size.height / 2.0, region.top, region.bottom() - size.height),
            ),
            Side::Above | Side::Below => (
                clamp(body.center_x() - size.width / 2.0, region.left, region.right() - size.width),
                region.top + (region.height - size.height) / 2.0,
            ),
        };
        Some(Rect::new(left, top, size.width, size.height))
    }

    /// Free space of the canvas on one side of the body.
    fn region(&self, body: &Rect, canvas: &Rect, side: Side) -> Rect {
        let rect = match side {
            Side::Right => {
                let left = body.right() + self.gap;
                Rect::new(left, canvas.top, canvas.right() - left, canvas.height)
            }
            Side::Left => Rect::new(
                canvas.left,
                canvas.top,
                body.left - self.gap - canvas.left,
                canvas.height,
            ),
            Side::Above => Rect::new(
                canvas.left,
                canvas.top,
                canvas.width,
                body.top - self.gap - canvas.top,
            ),
            Side::Below => {
                let top = body.bottom() + self.gap;
                Rect::new(canvas.left, top, canvas.width, canvas.bottom() - top)
            }
        };
        Rect::new(rect.left, rect.top, rect.width.max(0.0), rect.height.max(0.0))
    }

    /// Scale `image` (never up) to fit `region`, honouring the minimum visible size.
    fn fit(&self, image: &Rect, region: &Rect) -> Option<Rect> {
        if image.width <= 0.0 || image.height <= 0.0 {
            return None;
        }
        let scale = (region.width / image.width)
            .min(region.height / image.height)
            .min(1.0);
        if scale <= 0.0 {
            return None;
        }
        let fitted = image.scaled(scale);
        let min_width = self.min_visible.min(image.width);
        let min_height = self.min_visible.min(image.height);
        if fitted.width + EPSILON < min_width || fitted.height + EPSILON < min_height {
            return None;
        }
        Some(fitted)
    }
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if max < min {
        min
    } else {
        value.max(min).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WIDE: Rect = Rect::new(0.0, 0.0, 13.333, 7.5);

    fn resolver() -> OverlapResolver {
        OverlapResolver::new(0.5)
    }

    #[test]
    fn test_no_overlap_is_noop() {
        let body = Rect::new(1.0, 2.0, 5.0, 3.0);
        let image = Rect::new(8.0, 1.0, 3.0, 2.0);
        assert_eq!(resolver().resolve(&body, &image, &WIDE), Some(image));
    }

    #[test]
    fn test_overlap_shifts_right_when_room() {
        let body = Rect::new(1.0, 2.0, 6.0, 3.0);
        let image = Rect::new(3.0, 2.0, 5.0, 3.0);
        let placed = resolver().resolve(&body, &image, &WIDE).unwrap();
        assert!(placed.left >= body.left + body.width);
        assert_eq!((placed.width, placed.height), (5.0, 3.0));
        assert!(WIDE.contains(&placed));
    }

    #[test]
    fn test_overlap_shifts_left_when_right_is_full() {
        let body = Rect::new(7.0, 2.0, 5.5, 3.0);
        let image = Rect::new(8.0, 2.0, 4.0, 2.0);
        let placed = resolver().resolve(&body, &image, &WIDE).unwrap();
        assert!(placed.right() <= body.left + 1e-9);
        assert_eq!((placed.width, placed.height), (4.0, 2.0));
    }

    #[test]
    fn test_narrow_canvas_shrinks_image() {
        let canvas = Rect::new(0.0, 0.0, 8.0, 6.0);
        let body = Rect::new(1.0, 2.0, 5.0, 3.0);
        let image = Rect::new(2.0, 2.0, 4.0, 3.0);
        let placed = resolver().resolve(&body, &image, &canvas).unwrap();
        assert!(placed.height <= image.height);
        assert!(placed.height >= 0.5);
        assert!(!placed.intersects(&body));
        assert!(canvas.contains(&placed));
        assert!((placed.aspect_ratio() - image.aspect_ratio()).abs() < 1e-9);
    }

    #[test]
    fn test_blocked_sides_place_image_above() {
        let canvas = Rect::new(0.0, 0.0, 10.0, 8.0);
        let body = Rect::new(0.0, 4.0, 10.0, 3.0);
        let image = Rect::new(2.0, 4.5, 6.0, 4.5);
        let placed = resolver().resolve(&body, &image, &canvas).unwrap();
        assert!(placed.bottom() <= body.top + 1e-9);
        assert!((placed.height - 4.0).abs() < 1e-9);
        assert!(placed.width < image.width);
        assert!((placed.aspect_ratio() - image.aspect_ratio()).abs() < 1e-9);
        assert!((placed.center_x() - body.center_x()).abs() < 1e-9);
        assert!(canvas.contains(&placed));
    }

    #[test]
    fn test_blocked_sides_and_thin_top_place_image_below() {
        // The strip above the body is thinner than the floor.
        let canvas = Rect::new(0.0, 0.0, 10.0, 8.0);
        let body = Rect::new(0.0, 0.3, 10.0, 2.0);
        let image = Rect::new(1.0, 1.0, 6.0, 7.0);
        let placed = resolver().resolve(&body, &image, &canvas).unwrap();
        assert!(placed.top >= body.bottom() - 1e-9);
        assert!((placed.height - 5.7).abs() < 1e-9);
        assert!(placed.width < image.width);
        assert!((placed.aspect_ratio() - image.aspect_ratio()).abs() < 1e-9);
        assert!(!placed.intersects(&body));
        assert!(canvas.contains(&placed));
    }

    #[test]
    fn test_degenerate_canvas_gives_up() {
        let canvas = Rect::new(0.0, 0.0, 2.0, 1.0);
        let body = canvas;
        let image = Rect::new(0.5, 0.25, 1.0, 0.5);
        assert_eq!(resolver().resolve(&body, &image, &canvas), None);
    }

    #[test]
    fn test_aggressive_shrink_uses_largest_side() {
        // Strips above and below are thinner than the floor; the right side is
        // too narrow for the full image but has the most area.
        let canvas = Rect::new(0.0, 0.0, 10.0, 6.0);
        let body = Rect::new(0.0, 0.3, 7.0, 5.4);
        let image = Rect::new(1.0, 1.0, 6.0, 4.0);
        let placed = resolver().resolve(&body, &image, &canvas).unwrap();
        assert_eq!(placed, Rect::new(7.0, 2.0, 3.0, 2.0));
        assert!(!placed.intersects(&body));
        assert!(canvas.contains(&placed));
    }

    #[test]
    fn test_gap_is_respected() {
        let body = Rect::new(1.0, 2.0, 6.0, 3.0);
        let image = Rect::new(3.0, 2.0, 5.0, 3.0);
        let placed = resolver().with_gap(0.2).resolve(&body, &image, &WIDE).unwrap();
        assert!(placed.left >= body.right() + 0.2 - 1e-9);
    }

    #[test]
    fn test_minimum_floor_blocks_tiny_slivers() {
        let canvas = Rect::new(0.0, 0.0, 10.0, 6.0);
        let body = Rect::new(0.3, 0.3, 9.4, 5.4);
        let image = Rect::new(2.0, 2.0, 4.0, 3.0);
        assert_eq!(resolver().resolve(&body, &image, &canvas), None);
    }

    #[test]
    fn test_rect_union_and_intersection() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(2.0, 0.0, 2.0, 2.0);
        assert!(!a.intersects(&b));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 4.0, 2.0));
        assert!(a.intersects(&Rect::new(1.0, 1.0, 2.0, 2.0)));
    }

    fn rect_in(canvas: Rect) -> impl Strategy<Value = Rect> {
        (0.0..canvas.width, 0.0..canvas.height, 0.05f64..1.0, 0.05f64..1.0).prop_map(
            move |(left, top, w, h)| {
                let width = (canvas.width - left) * w;
                let height = (canvas.height - top) * h;
                Rect::new(left, top, width, height)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_resolved_rect_is_clear_and_inside(body in rect_in(WIDE), image in rect_in(WIDE)) {
            let resolver = resolver();
            if let Some(placed) = resolver.resolve(&body, &image, &WIDE) {
                if body.intersects(&image) {
                    prop_assert!(!placed.intersects(&body));
                    prop_assert!(WIDE.contains(&placed));
                    let resized = (placed.width - image.width).abs() > 1e-9;
                    if resized {
                        prop_assert!((placed.aspect_ratio() - image.aspect_ratio()).abs() < 1e-6);
                        prop_assert!(placed.width + 1e-9 >= resolver.min_visible().min(image.width));
                        prop_assert!(placed.height + 1e-9 >= resolver.min_visible().min(image.height));
                    }
                } else {
                    prop_assert_eq!(placed, image);
                }
            }
        }
    }
}
