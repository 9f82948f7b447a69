use crate::color::DrawingColor;

/// How a path was painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintKind {
    Stroke,
    Fill,
    FillStroke,
}

impl PaintKind {
    pub fn strokes(&self) -> bool {
        matches!(self, PaintKind::Stroke | PaintKind::FillStroke)
    }

    pub fn fills(&self) -> bool {
        matches!(self, PaintKind::Fill | PaintKind::FillStroke)
    }
}

/// One painted vector path on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingElement {
    pub kind: PaintKind,
    /// Stroking color, present only when the path is stroked
    pub stroke: Option<DrawingColor>,
    /// Non-stroking color, present only when the path is filled
    pub fill: Option<DrawingColor>,
    /// Number of path construction operators that built this path
    pub segments: usize,
}

impl DrawingElement {
    pub fn stroked(color: DrawingColor) -> Self {
        Self {
            kind: PaintKind::Stroke,
            stroke: Some(color),
            fill: None,
            segments: 1,
        }
    }

    pub fn filled(color: DrawingColor) -> Self {
        Self {
            kind: PaintKind::Fill,
            stroke: None,
            fill: Some(color),
            segments: 1,
        }
    }

    /// The element's color attribute: its stroking color, absent for fill-only paths.
    pub fn color(&self) -> Option<&DrawingColor> {
        self.stroke.as_ref()
    }
}

/// Drawing elements of one page, in paint order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub elements: Vec<DrawingElement>,
}

impl Page {
    pub fn new(number: u32, elements: Vec<DrawingElement>) -> Self {
        Self { number, elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Rgb, TARGET_COLOR};

    #[test]
    fn test_fill_only_has_no_color_attribute() {
        let element = DrawingElement::filled(TARGET_COLOR.into());
        assert!(element.color().is_none());
        assert!(!element.kind.strokes());
    }

    #[test]
    fn test_stroke_color_is_color_attribute() {
        let element = DrawingElement::stroked(Rgb::new(0.1, 0.2, 0.3).into());
        assert_eq!(
            element.color(),
            Some(&DrawingColor::Rgb(Rgb::new(0.1, 0.2, 0.3)))
        );
    }

    #[test]
    fn test_paint_kind_flags() {
        assert!(PaintKind::FillStroke.strokes());
        assert!(PaintKind::FillStroke.fills());
        assert!(!PaintKind::Stroke.fills());
    }
}
