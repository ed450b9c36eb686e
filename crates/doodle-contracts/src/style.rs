//! Symbolic-to-numeric lookup tables shared by the program generator and
//! its local fallback. All lookups are total; unknown string keys fall
//! back to the documented neutral defaults. The offline demo path in the
//! engine carries its own, deliberately different tables.

use crate::intent::{Anchor, ColorName, SizeClass};

pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 600;

/// Neutral gray-blue used when a color name is not in the table.
pub const DEFAULT_RGB: [u8; 3] = [100, 150, 200];

pub const DEFAULT_SIZE_PIXELS: f64 = 150.0;

pub fn rgb(color: ColorName) -> [u8; 3] {
    match color {
        ColorName::Red => [255, 80, 80],
        ColorName::Blue => [80, 120, 255],
        ColorName::Green => [80, 255, 120],
        ColorName::Yellow => [255, 255, 80],
        ColorName::Orange => [255, 165, 80],
        ColorName::Purple => [200, 100, 255],
        ColorName::Pink => [255, 150, 200],
        ColorName::Black => [50, 50, 50],
        ColorName::White => [255, 255, 255],
        ColorName::Gray => [150, 150, 150],
        ColorName::Brown => [165, 100, 80],
    }
}

/// String-keyed variant for code paths that deal in raw text.
pub fn rgb_for_name(name: &str) -> [u8; 3] {
    match name.trim().to_ascii_lowercase().as_str() {
        "red" => rgb(ColorName::Red),
        "blue" => rgb(ColorName::Blue),
        "green" => rgb(ColorName::Green),
        "yellow" => rgb(ColorName::Yellow),
        "orange" => rgb(ColorName::Orange),
        "purple" => rgb(ColorName::Purple),
        "pink" => rgb(ColorName::Pink),
        "black" => rgb(ColorName::Black),
        "white" => rgb(ColorName::White),
        "gray" => rgb(ColorName::Gray),
        "brown" => rgb(ColorName::Brown),
        _ => DEFAULT_RGB,
    }
}

pub fn size_pixels(size: SizeClass) -> f64 {
    match size {
        SizeClass::Small => 80.0,
        SizeClass::Medium => 150.0,
        SizeClass::Large => 250.0,
    }
}

/// Anchor coordinates on the fixed 800x600 canvas.
pub fn anchor_point(anchor: Anchor) -> (f64, f64) {
    match anchor {
        Anchor::Center => (400.0, 300.0),
        Anchor::Top => (400.0, 150.0),
        Anchor::Bottom => (400.0, 450.0),
        Anchor::Left => (200.0, 300.0),
        Anchor::Right => (600.0, 300.0),
    }
}

#[cfg(test)]
mod tests {
    use crate::intent::{Anchor, ColorName, SizeClass};

    use super::{anchor_point, rgb, rgb_for_name, size_pixels, DEFAULT_RGB};

    #[test]
    fn color_table_matches_generator_palette() {
        assert_eq!(rgb(ColorName::Red), [255, 80, 80]);
        assert_eq!(rgb(ColorName::Blue), [80, 120, 255]);
        assert_eq!(rgb(ColorName::Brown), [165, 100, 80]);
    }

    #[test]
    fn unknown_color_name_falls_back_to_neutral() {
        assert_eq!(rgb_for_name("chartreuse"), DEFAULT_RGB);
        assert_eq!(rgb_for_name("  Red "), [255, 80, 80]);
    }

    #[test]
    fn size_table() {
        assert_eq!(size_pixels(SizeClass::Small), 80.0);
        assert_eq!(size_pixels(SizeClass::Medium), 150.0);
        assert_eq!(size_pixels(SizeClass::Large), 250.0);
    }

    #[test]
    fn anchors_are_keyed_to_the_fixed_canvas() {
        assert_eq!(anchor_point(Anchor::Center), (400.0, 300.0));
        assert_eq!(anchor_point(Anchor::Top), (400.0, 150.0));
        assert_eq!(anchor_point(Anchor::Bottom), (400.0, 450.0));
        assert_eq!(anchor_point(Anchor::Left), (200.0, 300.0));
        assert_eq!(anchor_point(Anchor::Right), (600.0, 300.0));
    }
}
