//! Property-based tests for color classification

use cutqa::color::{is_close_to_target, is_magenta, Rgb};
use cutqa::{classify, DrawingColor, DrawingElement, Page, MATCH_THRESHOLD, TARGET_COLOR};
use proptest::prelude::*;

/// Point at a given distance from the target along a random direction.
fn offset_from_target(direction: (f64, f64, f64), distance: f64) -> Option<Rgb> {
    let (x, y, z) = direction;
    let norm = (x * x + y * y + z * z).sqrt();
    if norm < 1e-6 {
        return None;
    }
    let scale = distance / norm;
    Some(Rgb::new(
        TARGET_COLOR.r + x * scale,
        TARGET_COLOR.g + y * scale,
        TARGET_COLOR.b + z * scale,
    ))
}

fn direction_strategy() -> impl Strategy<Value = (f64, f64, f64)> {
    (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
}

proptest! {
    #[test]
    fn far_colors_never_match(direction in direction_strategy(), distance in 0.1001f64..2.0) {
        if let Some(color) = offset_from_target(direction, distance) {
            prop_assume!(color.distance(&TARGET_COLOR) >= MATCH_THRESHOLD);
            prop_assert!(!classify(Some(&color.into())));
        }
    }

    #[test]
    fn near_magenta_colors_match(direction in direction_strategy(), distance in 0.0f64..0.0999) {
        if let Some(color) = offset_from_target(direction, distance) {
            prop_assume!(is_magenta(&color));
            prop_assert!(classify(Some(&color.into())));
        }
    }

    #[test]
    fn proximity_alone_is_not_enough(
        r in 0.0f64..1.5,
        g in 0.3f64..1.0,
        b in 0.0f64..1.5,
    ) {
        let color = Rgb::new(r, g, b);
        prop_assert!(!is_magenta(&color));
        prop_assert!(!classify(Some(&color.into())));
    }

    #[test]
    fn classify_is_conjunction(r in -0.5f64..1.5, g in -0.5f64..1.5, b in -0.5f64..1.5) {
        let color = Rgb::new(r, g, b);
        prop_assert_eq!(
            classify(Some(&color.into())),
            is_close_to_target(&color) && is_magenta(&color)
        );
    }

    #[test]
    fn non_triples_never_match(components in prop::collection::vec(0.0f64..1.0, 0..8)) {
        prop_assume!(components.len() != 3);
        let color = DrawingColor::from_components(&components);
        prop_assert!(!classify(Some(&color)));
    }

    #[test]
    fn permuting_elements_keeps_count(
        colors in prop::collection::vec((0.8f64..1.0, 0.0f64..0.1, 0.45f64..0.65), 0..32),
        shift in 0usize..32,
    ) {
        let elements = colors
            .iter()
            .map(|&(r, g, b)| DrawingElement::stroked(Rgb::new(r, g, b).into()))
            .collect::<Vec<_>>();
        let mut shuffled = elements.clone();
        if !shuffled.is_empty() {
            let len = shuffled.len();
            shuffled.rotate_left(shift % len);
            shuffled.reverse();
        }

        let original = cutqa::scan_pages([&Page::new(1, elements)]);
        let permuted = cutqa::scan_pages([&Page::new(1, shuffled)]);
        prop_assert_eq!(original.instance_count(), permuted.instance_count());
    }
}
