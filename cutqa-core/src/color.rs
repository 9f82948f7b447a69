//! Color matching against the reference cut-line magenta.
//!
//! A drawing's color is matched when it is both numerically close to
//! [`TARGET_COLOR`] and lands in the red-high/blue-high/green-low octant.

use crate::function::Function;

/// An RGB triple as resolved from a drawing's color attribute.
///
/// Channels are kept exactly as decoded; nothing is clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn channels(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }

    /// Euclidean distance between two colors in RGB space.
    pub fn distance(&self, other: &Rgb) -> f64 {
        self.channels()
            .iter()
            .zip(other.channels().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Reference magenta used for every scan.
pub const TARGET_COLOR: Rgb = Rgb::new(0.9260547757148743, 0.0, 0.548302412033081);

/// Maximum distance from [`TARGET_COLOR`] still considered a match (exclusive).
pub const MATCH_THRESHOLD: f64 = 0.1;

/// Color attribute of a drawing element.
///
/// Absence of a color is modelled with `Option<DrawingColor>`; values that
/// cannot be expressed as an RGB triple are kept as `Unsupported` so the
/// evaluator can reject them without failing the scan.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawingColor {
    Rgb(Rgb),
    Unsupported { channels: usize },
}

impl DrawingColor {
    /// Interprets raw components as an RGB triple. Any other arity is unsupported.
    pub fn from_components(components: &[f64]) -> Self {
        match components {
            [r, g, b] => DrawingColor::Rgb(Rgb::new(*r, *g, *b)),
            _ => DrawingColor::Unsupported {
                channels: components.len(),
            },
        }
    }

    pub fn as_rgb(&self) -> Option<&Rgb> {
        match self {
            DrawingColor::Rgb(rgb) => Some(rgb),
            DrawingColor::Unsupported { .. } => None,
        }
    }
}

impl From<Rgb> for DrawingColor {
    fn from(rgb: Rgb) -> Self {
        DrawingColor::Rgb(rgb)
    }
}

/// sRGB values of the sixteen corners of the CMYK unit hypercube, indexed by
/// the bits `c m y k` (c is the most significant bit).
///
/// The corners are the press-calibrated values renderers use for uncalibrated
/// DeviceCMYK, so 100% magenta lands on [`TARGET_COLOR`] rather than on
/// pure (1, 0, 1).
const CMYK_CORNERS: [[f64; 3]; 16] = [
    [1.0, 1.0, 1.0],          // 0 0 0 0
    [0.1373, 0.1216, 0.1255], // 0 0 0 1
    [1.0, 0.9490, 0.0],       // 0 0 1 0
    [0.1098, 0.1020, 0.0],    // 0 0 1 1
    [0.9255, 0.0, 0.5490],    // 0 1 0 0
    [0.1412, 0.0, 0.0],       // 0 1 0 1
    [0.9294, 0.1098, 0.1412], // 0 1 1 0
    [0.1333, 0.0, 0.0],       // 0 1 1 1
    [0.0, 0.6784, 0.9373],    // 1 0 0 0
    [0.0, 0.0588, 0.1412],    // 1 0 0 1
    [0.0, 0.6510, 0.3137],    // 1 0 1 0
    [0.0, 0.0745, 0.0],       // 1 0 1 1
    [0.1804, 0.1922, 0.5725], // 1 1 0 0
    [0.0, 0.0, 0.0078],       // 1 1 0 1
    [0.2118, 0.2119, 0.2235], // 1 1 1 0
    [0.0, 0.0, 0.0],          // 1 1 1 1
];

/// Converts CMYK to RGB by multilinear interpolation between the hypercube corners.
pub fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> Rgb {
    let inks = [c, m, y, k].map(|v| v.clamp(0.0, 1.0));
    let mut rgb = [0.0; 3];
    for (corner, value) in CMYK_CORNERS.iter().enumerate() {
        let weight: f64 = inks
            .iter()
            .enumerate()
            .map(|(i, ink)| if corner & (8 >> i) != 0 { *ink } else { 1.0 - ink })
            .product();
        if weight > 0.0 {
            for (channel, corner_channel) in rgb.iter_mut().zip(value) {
                *channel += weight * corner_channel;
            }
        }
    }
    Rgb::new(rgb[0], rgb[1], rgb[2])
}

/// Color spaces a content stream can select for painting.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// Separation (one colorant) or DeviceN space, painted through its
    /// alternate space after applying the tint transform.
    Colorant {
        colorants: usize,
        alternate: Box<ColorSpace>,
        tint: Function,
    },
    Unsupported(String),
}

impl ColorSpace {
    /// Device color space for a plain name, including inline-image abbreviations.
    pub fn from_device_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorSpace::DeviceGray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorSpace::DeviceRGB),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::DeviceCMYK),
            _ => None,
        }
    }

    /// Device space with the given number of components, as used by ICC-based spaces.
    pub fn from_component_count(count: i64) -> Self {
        match count {
            1 => ColorSpace::DeviceGray,
            3 => ColorSpace::DeviceRGB,
            4 => ColorSpace::DeviceCMYK,
            n => ColorSpace::Unsupported(format!("ICCBased/N{n}")),
        }
    }

    pub fn component_count(&self) -> Option<usize> {
        match self {
            ColorSpace::DeviceGray => Some(1),
            ColorSpace::DeviceRGB => Some(3),
            ColorSpace::DeviceCMYK => Some(4),
            ColorSpace::Colorant { colorants, .. } => Some(*colorants),
            ColorSpace::Unsupported(_) => None,
        }
    }

    /// Color in effect right after this space is selected: black for device
    /// spaces, full tint of every colorant for Separation and DeviceN.
    pub fn initial_color(&self) -> DrawingColor {
        match self {
            ColorSpace::Unsupported(_) => DrawingColor::Unsupported { channels: 0 },
            ColorSpace::Colorant { colorants, .. } => self.to_drawing_color(&vec![1.0; *colorants]),
            _ => DrawingColor::Rgb(Rgb::new(0.0, 0.0, 0.0)),
        }
    }

    /// Converts components in this space to a drawing color.
    pub fn to_drawing_color(&self, components: &[f64]) -> DrawingColor {
        let unsupported = DrawingColor::Unsupported {
            channels: components.len(),
        };
        match (self, components) {
            (ColorSpace::DeviceGray, [g]) => DrawingColor::Rgb(Rgb::new(*g, *g, *g)),
            (ColorSpace::DeviceRGB, [_, _, _]) => DrawingColor::from_components(components),
            (ColorSpace::DeviceCMYK, [c, m, y, k]) => DrawingColor::Rgb(cmyk_to_rgb(*c, *m, *y, *k)),
            (
                ColorSpace::Colorant {
                    colorants,
                    alternate,
                    tint,
                },
                tints,
            ) if tints.len() == *colorants => match tint.evaluate(tints) {
                Some(values) => alternate.to_drawing_color(&values),
                None => unsupported,
            },
            _ => unsupported,
        }
    }
}

/// Proximity test: strictly closer than [`MATCH_THRESHOLD`] to [`TARGET_COLOR`].
pub fn is_close_to_target(color: &Rgb) -> bool {
    color.distance(&TARGET_COLOR) < MATCH_THRESHOLD
}

/// Coarse hue bucket: red and blue high, green low.
pub fn is_magenta(color: &Rgb) -> bool {
    color.r > 0.5 && color.b > 0.5 && color.g < 0.3
}

/// Decides whether a drawing color counts as a magenta-line instance.
///
/// Both the proximity and the hue-bucket test must pass. Absent and
/// unsupported colors never match.
pub fn classify(color: Option<&DrawingColor>) -> bool {
    match color.and_then(DrawingColor::as_rgb) {
        Some(rgb) => is_close_to_target(rgb) && is_magenta(rgb),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_color_matches() {
        assert!(classify(Some(&TARGET_COLOR.into())));
    }

    #[test]
    fn test_absent_color_never_matches() {
        assert!(!classify(None));
    }

    #[test]
    fn test_wrong_arity_is_unsupported() {
        let color = DrawingColor::from_components(&[0.9, 0.2]);
        assert_eq!(color, DrawingColor::Unsupported { channels: 2 });
        assert!(!classify(Some(&color)));

        let color = DrawingColor::from_components(&[0.9, 0.0, 0.5, 0.1]);
        assert!(!classify(Some(&color)));
    }

    #[test]
    fn test_threshold_is_strict() {
        let color = Rgb::new(TARGET_COLOR.r, TARGET_COLOR.g, TARGET_COLOR.b + 0.125);
        assert!(color.distance(&TARGET_COLOR) > MATCH_THRESHOLD);
        assert!(!classify(Some(&color.into())));

        let on_edge = Rgb::new(TARGET_COLOR.r, 0.1, TARGET_COLOR.b);
        assert_eq!(on_edge.distance(&TARGET_COLOR), MATCH_THRESHOLD);
        assert!(!is_close_to_target(&on_edge));
    }

    #[test]
    fn test_channels_are_not_clamped() {
        let color = Rgb::new(1.01, -0.02, 0.55);
        assert!(is_close_to_target(&color));
        assert!(classify(Some(&color.into())));

        let far = Rgb::new(1.5, 0.0, 0.55);
        assert!(!classify(Some(&far.into())));
    }

    #[test]
    fn test_pure_magenta_is_too_far() {
        let color = Rgb::new(1.0, 0.0, 1.0);
        assert!(is_magenta(&color));
        assert!(!is_close_to_target(&color));
        assert!(!classify(Some(&color.into())));
    }

    #[test]
    fn test_hue_bucket_boundaries() {
        assert!(!is_magenta(&Rgb::new(0.5, 0.0, 0.9)));
        assert!(!is_magenta(&Rgb::new(0.9, 0.0, 0.5)));
        assert!(!is_magenta(&Rgb::new(0.9, 0.3, 0.9)));
        assert!(is_magenta(&Rgb::new(0.51, 0.29, 0.51)));
    }

    #[test]
    fn test_gray_conversion() {
        let color = ColorSpace::DeviceGray.to_drawing_color(&[0.25]);
        assert_eq!(color, DrawingColor::Rgb(Rgb::new(0.25, 0.25, 0.25)));
    }

    fn assert_rgb_near(actual: Rgb, expected: Rgb) {
        assert!(
            actual.distance(&expected) < 1e-9,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_cmyk_corners() {
        assert_rgb_near(cmyk_to_rgb(0.0, 0.0, 0.0, 0.0), Rgb::new(1.0, 1.0, 1.0));
        assert_rgb_near(cmyk_to_rgb(0.0, 0.0, 0.0, 1.0), Rgb::new(0.1373, 0.1216, 0.1255));
        assert_rgb_near(cmyk_to_rgb(1.0, 0.0, 0.0, 0.0), Rgb::new(0.0, 0.6784, 0.9373));
        assert_rgb_near(cmyk_to_rgb(1.0, 1.0, 1.0, 1.0), Rgb::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_process_magenta_matches_target() {
        let color = ColorSpace::DeviceCMYK.to_drawing_color(&[0.0, 1.0, 0.0, 0.0]);
        let rgb = *color.as_rgb().unwrap();
        assert!(rgb.distance(&TARGET_COLOR) < 0.001, "got {rgb:?}");
        assert!(classify(Some(&color)));

        // Small ink variations around 100% magenta still match.
        let color = ColorSpace::DeviceCMYK.to_drawing_color(&[0.02, 0.97, 0.0, 0.0]);
        assert!(classify(Some(&color)));
    }

    #[test]
    fn test_cmyk_interpolates_between_corners() {
        // Half magenta sits halfway between paper white and full magenta.
        assert_rgb_near(
            cmyk_to_rgb(0.0, 0.5, 0.0, 0.0),
            Rgb::new((1.0 + 0.9255) / 2.0, 0.5, (1.0 + 0.5490) / 2.0),
        );
        assert!(!classify(Some(
            &ColorSpace::DeviceCMYK.to_drawing_color(&[0.0, 0.5, 0.0, 0.0])
        )));
        // Rich magenta with black is too dark.
        assert!(!classify(Some(
            &ColorSpace::DeviceCMYK.to_drawing_color(&[0.0, 1.0, 0.0, 0.5])
        )));
    }

    #[test]
    fn test_cmyk_components_are_clamped() {
        assert_eq!(cmyk_to_rgb(0.0, 1.5, -0.5, 0.0), cmyk_to_rgb(0.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn test_component_mismatch_is_unsupported() {
        let color = ColorSpace::DeviceRGB.to_drawing_color(&[0.9, 0.0]);
        assert_eq!(color, DrawingColor::Unsupported { channels: 2 });

        let color = ColorSpace::Unsupported("Separation".to_string()).to_drawing_color(&[1.0]);
        assert_eq!(color, DrawingColor::Unsupported { channels: 1 });
    }

    #[test]
    fn test_color_space_names() {
        assert_eq!(
            ColorSpace::from_device_name(b"DeviceRGB"),
            Some(ColorSpace::DeviceRGB)
        );
        assert_eq!(ColorSpace::from_device_name(b"CMYK"), Some(ColorSpace::DeviceCMYK));
        assert_eq!(ColorSpace::from_device_name(b"Pattern"), None);
        assert_eq!(ColorSpace::from_component_count(3), ColorSpace::DeviceRGB);
        assert_eq!(
            ColorSpace::from_component_count(2),
            ColorSpace::Unsupported("ICCBased/N2".to_string())
        );
    }

    #[test]
    fn test_initial_color_is_black() {
        assert_eq!(
            ColorSpace::DeviceRGB.initial_color(),
            DrawingColor::Rgb(Rgb::new(0.0, 0.0, 0.0))
        );
        assert!(!classify(Some(&ColorSpace::DeviceRGB.initial_color())));
    }

    fn cut_contour() -> ColorSpace {
        ColorSpace::Colorant {
            colorants: 1,
            alternate: Box::new(ColorSpace::DeviceCMYK),
            tint: Function::Exponential {
                domain: vec![0.0, 1.0],
                c0: vec![0.0, 0.0, 0.0, 0.0],
                c1: vec![0.0, 1.0, 0.0, 0.0],
                exponent: 1.0,
                range: None,
            },
        }
    }

    #[test]
    fn test_spot_color_goes_through_alternate_space() {
        let space = cut_contour();
        assert_eq!(space.component_count(), Some(1));
        assert!(classify(Some(&space.to_drawing_color(&[1.0]))));
        assert!(classify(Some(&space.initial_color())));

        let paper = space.to_drawing_color(&[0.0]);
        assert_rgb_near(*paper.as_rgb().unwrap(), Rgb::new(1.0, 1.0, 1.0));
        assert!(!classify(Some(&space.to_drawing_color(&[0.4]))));
    }

    #[test]
    fn test_spot_color_with_wrong_arity_is_unsupported() {
        assert_eq!(
            cut_contour().to_drawing_color(&[1.0, 0.0]),
            DrawingColor::Unsupported { channels: 2 }
        );
    }
}
