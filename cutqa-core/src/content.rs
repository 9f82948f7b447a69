//! Content stream interpretation
//!
//! Reduces a page's content stream to the operators that affect vector
//! drawings (graphics state, color selection, path construction and painting,
//! form XObjects) and replays them to produce [`DrawingElement`]s.

use crate::color::{ColorSpace, DrawingColor};
use crate::drawing::{DrawingElement, PaintKind};
use crate::function::Function;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::borrow::Cow;
use tracing::{debug, trace, warn};

/// Maximum nesting of form XObjects followed from a page.
pub const MAX_FORM_DEPTH: usize = 16;

/// Which of the two colors in the graphics state an operator addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintTarget {
    Stroking,
    NonStroking,
}

/// The subset of content operators that influence drawings.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOperation {
    SaveGraphicsState,    // q
    RestoreGraphicsState, // Q

    SetColorSpace(PaintTarget, String), // CS, cs

    /// Color components for the target. `space` is set by the device color
    /// operators, which also select their color space. `components` is `None`
    /// when an operand is not numeric.
    SetColor {
        target: PaintTarget,
        space: Option<ColorSpace>,
        components: Option<Vec<f64>>,
    }, // SC, SCN, sc, scn, G, g, RG, rg, K, k

    PathSegment, // m, l, c, v, y, h, re

    Paint(PaintKind), // S, s, f, F, f*, B, B*, b, b*
    EndPath, // n

    PaintXObject(String), // Do
}

impl PaintOperation {
    /// Maps a decoded content operation, ignoring operators that cannot
    /// produce or color a drawing.
    pub fn from_operation(operation: &Operation) -> Option<Self> {
        let operands = &operation.operands;
        let op = match operation.operator.as_str() {
            "q" => PaintOperation::SaveGraphicsState,
            "Q" => PaintOperation::RestoreGraphicsState,

            "CS" => PaintOperation::SetColorSpace(PaintTarget::Stroking, last_name(operands)?),
            "cs" => PaintOperation::SetColorSpace(PaintTarget::NonStroking, last_name(operands)?),

            "SC" | "SCN" => set_color(PaintTarget::Stroking, None, operands),
            "sc" | "scn" => set_color(PaintTarget::NonStroking, None, operands),
            "G" => set_color(PaintTarget::Stroking, Some(ColorSpace::DeviceGray), operands),
            "g" => set_color(PaintTarget::NonStroking, Some(ColorSpace::DeviceGray), operands),
            "RG" => set_color(PaintTarget::Stroking, Some(ColorSpace::DeviceRGB), operands),
            "rg" => set_color(PaintTarget::NonStroking, Some(ColorSpace::DeviceRGB), operands),
            "K" => set_color(PaintTarget::Stroking, Some(ColorSpace::DeviceCMYK), operands),
            "k" => set_color(PaintTarget::NonStroking, Some(ColorSpace::DeviceCMYK), operands),

            "m" | "l" | "c" | "v" | "y" | "h" | "re" => PaintOperation::PathSegment,

            "S" | "s" => PaintOperation::Paint(PaintKind::Stroke),
            "f" | "F" | "f*" => PaintOperation::Paint(PaintKind::Fill),
            "B" | "B*" | "b" | "b*" => PaintOperation::Paint(PaintKind::FillStroke),
            "n" => PaintOperation::EndPath,

            "Do" => PaintOperation::PaintXObject(last_name(operands)?),

            _ => return None,
        };
        Some(op)
    }
}

fn set_color(target: PaintTarget, space: Option<ColorSpace>, operands: &[Object]) -> PaintOperation {
    let components = operands.iter().map(number).collect::<Option<Vec<_>>>();
    PaintOperation::SetColor {
        target,
        space,
        components,
    }
}

fn last_name(operands: &[Object]) -> Option<String> {
    match operands.last()? {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Follows indirect references, giving up after a few hops.
pub(crate) fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> &'a Object {
    for _ in 0..8 {
        match object {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => object = target,
                Err(_) => break,
            },
            _ => break,
        }
    }
    object
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// A resource dictionary together with the document it lives in.
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    doc: &'a Document,
    dict: Option<&'a Dictionary>,
}

impl<'a> Resources<'a> {
    pub fn new(doc: &'a Document, dict: Option<&'a Dictionary>) -> Self {
        Self { doc, dict }
    }

    fn category(&self, key: &[u8], name: &str) -> Option<&'a Object> {
        let category = resolve_dict(self.doc, self.dict?.get(key).ok()?)?;
        category.get(name.as_bytes()).ok().map(|o| resolve(self.doc, o))
    }

    /// Resolves a color space operand of `CS`/`cs`.
    pub fn color_space(&self, name: &str) -> ColorSpace {
        if let Some(space) = ColorSpace::from_device_name(name.as_bytes()) {
            return space;
        }
        match self.category(b"ColorSpace", name) {
            Some(object) => self.space_from_object(object, false),
            None => ColorSpace::Unsupported(name.to_string()),
        }
    }

    /// `nested` is set while resolving the alternate space of a colorant
    /// space, which may not itself be a colorant space.
    fn space_from_object(&self, object: &Object, nested: bool) -> ColorSpace {
        match resolve(self.doc, object) {
            Object::Name(family) => ColorSpace::from_device_name(family)
                .unwrap_or_else(|| ColorSpace::Unsupported(String::from_utf8_lossy(family).into_owned())),
            Object::Array(parts) => self.color_space_family(parts, nested),
            _ => ColorSpace::Unsupported("invalid".to_string()),
        }
    }

    fn color_space_family(&self, parts: &[Object], nested: bool) -> ColorSpace {
        let family = match parts.first().map(|o| resolve(self.doc, o)) {
            Some(Object::Name(family)) => family.as_slice(),
            _ => return ColorSpace::Unsupported("array".to_string()),
        };
        let unsupported = || ColorSpace::Unsupported(String::from_utf8_lossy(family).into_owned());
        match family {
            b"ICCBased" => {
                let n = parts
                    .get(1)
                    .and_then(|o| resolve_dict(self.doc, o))
                    .and_then(|dict| dict.get(b"N").ok())
                    .and_then(|n| match resolve(self.doc, n) {
                        Object::Integer(n) => Some(*n),
                        _ => None,
                    });
                match n {
                    Some(n) => ColorSpace::from_component_count(n),
                    None => unsupported(),
                }
            }
            b"Separation" | b"DeviceN" if !nested => {
                self.colorant_space(family, parts).unwrap_or_else(unsupported)
            }
            _ => ColorSpace::from_device_name(family).unwrap_or_else(unsupported),
        }
    }

    /// `[/Separation name alternate tint]` or `[/DeviceN names alternate tint ...]`.
    fn colorant_space(&self, family: &[u8], parts: &[Object]) -> Option<ColorSpace> {
        let colorants = match (family, resolve(self.doc, parts.get(1)?)) {
            // The None colorant never marks the page.
            (b"Separation", Object::Name(name)) if name.as_slice() == b"None" => return None,
            (b"Separation", Object::Name(_)) => 1,
            (b"DeviceN", Object::Array(names)) if !names.is_empty() => names.len(),
            _ => return None,
        };
        let alternate = self.space_from_object(parts.get(2)?, true);
        if matches!(alternate, ColorSpace::Unsupported(_)) {
            return None;
        }
        let tint = Function::from_object(self.doc, parts.get(3)?);
        if tint.is_none() {
            debug!(
                family = %String::from_utf8_lossy(family),
                "Unsupported tint transform"
            );
        }
        Some(ColorSpace::Colorant {
            colorants,
            alternate: Box::new(alternate),
            tint: tint?,
        })
    }

    /// Looks up a form XObject by name, returning its id and stream.
    fn form(&self, name: &str) -> Option<(ObjectId, &'a lopdf::Stream)> {
        let category = resolve_dict(self.doc, self.dict?.get(b"XObject").ok()?)?;
        let id = match category.get(name.as_bytes()).ok()? {
            Object::Reference(id) => *id,
            _ => return None,
        };
        let stream = match self.doc.get_object(id).ok()? {
            Object::Stream(stream) => stream,
            _ => return None,
        };
        match stream.dict.get(b"Subtype") {
            Ok(Object::Name(subtype)) if subtype == b"Form" => Some((id, stream)),
            _ => None,
        }
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn is_delimiter(byte: u8) -> bool {
    is_whitespace(byte) || b"()<>[]{}/%".contains(&byte)
}

/// Whether the operator `keyword` stands alone at `pos`.
fn keyword_at(data: &[u8], pos: usize, keyword: &[u8]) -> bool {
    data[pos..].starts_with(keyword)
        && (pos == 0 || (is_delimiter(data[pos - 1]) && data[pos - 1] != b'/'))
        && data.get(pos + keyword.len()).map_or(true, |b| is_delimiter(*b))
}

/// Index just past the `)` closing the literal string opened at `start`.
fn skip_string(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < data.len() {
        match data[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return pos + 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    data.len()
}

fn skip_comment(data: &[u8], start: usize) -> usize {
    data[start..]
        .iter()
        .position(|b| matches!(b, b'\r' | b'\n'))
        .map_or(data.len(), |offset| start + offset)
}

/// Index just past the `EI` ending the inline image whose `BI` precedes `start`.
fn inline_image_end(data: &[u8], start: usize) -> Option<usize> {
    let id = (start..data.len()).find(|&pos| keyword_at(data, pos, b"ID"))?;
    // A single whitespace byte separates ID from the image data.
    let data_start = (id + 3).min(data.len());
    (data_start..data.len())
        .find(|&pos| {
            data[pos..].starts_with(b"EI")
                && is_whitespace(data[pos - 1])
                && data.get(pos + 2).map_or(true, |b| is_whitespace(*b))
        })
        .map(|pos| pos + 2)
}

/// Removes inline images (`BI ... ID <data> EI`) from a content stream.
///
/// Their binary data cannot be tokenized and inline images never contribute
/// vector drawings. Fails when an image is not terminated.
fn strip_inline_images(data: &[u8]) -> Result<Cow<'_, [u8]>, String> {
    let mut stripped: Option<Vec<u8>> = None;
    let mut copied = 0;
    let mut pos = 0;
    while pos < data.len() {
        match data[pos] {
            b'(' => pos = skip_string(data, pos),
            b'%' => pos = skip_comment(data, pos),
            b'B' if keyword_at(data, pos, b"BI") => {
                let end = inline_image_end(data, pos + 2)
                    .ok_or_else(|| format!("unterminated inline image at byte {pos}"))?;
                let out = stripped.get_or_insert_with(Vec::new);
                out.extend_from_slice(&data[copied..pos]);
                out.push(b' ');
                copied = end;
                pos = end;
            }
            _ => pos += 1,
        }
    }
    Ok(match stripped {
        Some(mut out) => {
            out.extend_from_slice(&data[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(data),
    })
}

#[derive(Debug, Clone)]
struct GraphicsState {
    stroke_space: ColorSpace,
    fill_space: ColorSpace,
    stroke_color: DrawingColor,
    fill_color: DrawingColor,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            stroke_space: ColorSpace::DeviceGray,
            fill_space: ColorSpace::DeviceGray,
            stroke_color: ColorSpace::DeviceGray.initial_color(),
            fill_color: ColorSpace::DeviceGray.initial_color(),
        }
    }
}

impl GraphicsState {
    fn space_mut(&mut self, target: PaintTarget) -> (&mut ColorSpace, &mut DrawingColor) {
        match target {
            PaintTarget::Stroking => (&mut self.stroke_space, &mut self.stroke_color),
            PaintTarget::NonStroking => (&mut self.fill_space, &mut self.fill_color),
        }
    }
}

/// Replays content streams and records every painted path.
pub struct DrawingCollector<'a> {
    doc: &'a Document,
    elements: Vec<DrawingElement>,
    forms: Vec<ObjectId>,
}

impl<'a> DrawingCollector<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            elements: Vec::new(),
            forms: Vec::new(),
        }
    }

    /// Interprets one page's content. Errors describe undecodable content.
    pub fn collect(
        mut self,
        content: &[u8],
        resources: Resources<'a>,
    ) -> Result<Vec<DrawingElement>, String> {
        let mut state = GraphicsState::default();
        self.run(content, resources, &mut state)?;
        Ok(self.elements)
    }

    fn run(
        &mut self,
        content: &[u8],
        resources: Resources<'a>,
        state: &mut GraphicsState,
    ) -> Result<(), String> {
        let content = strip_inline_images(content)?;
        let content = Content::decode(&content).map_err(|e| e.to_string())?;
        // Decoding stops quietly at anything it cannot tokenize, which leaves
        // a dangling inline-image operator behind.
        if let Some(op) = content
            .operations
            .iter()
            .find(|op| matches!(op.operator.as_str(), "BI" | "ID" | "EI"))
        {
            return Err(format!("undecodable data at inline image operator {}", op.operator));
        }
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut segments = 0usize;

        for op in content.operations.iter().filter_map(PaintOperation::from_operation) {
            match op {
                PaintOperation::SaveGraphicsState => stack.push(state.clone()),
                PaintOperation::RestoreGraphicsState => match stack.pop() {
                    Some(saved) => *state = saved,
                    None => trace!("Ignoring unbalanced Q"),
                },
                PaintOperation::SetColorSpace(target, name) => {
                    let space = resources.color_space(&name);
                    let (current_space, current_color) = state.space_mut(target);
                    *current_color = space.initial_color();
                    *current_space = space;
                }
                PaintOperation::SetColor {
                    target,
                    space,
                    components,
                } => {
                    let (current_space, current_color) = state.space_mut(target);
                    if let Some(space) = space {
                        *current_space = space;
                    }
                    *current_color = match components {
                        Some(components) => current_space.to_drawing_color(&components),
                        None => DrawingColor::Unsupported { channels: 0 },
                    };
                }
                PaintOperation::PathSegment => segments += 1,
                PaintOperation::Paint(kind) => {
                    if segments > 0 {
                        self.elements.push(DrawingElement {
                            kind,
                            stroke: kind.strokes().then(|| state.stroke_color.clone()),
                            fill: kind.fills().then(|| state.fill_color.clone()),
                            segments,
                        });
                    }
                    segments = 0;
                }
                PaintOperation::EndPath => segments = 0,
                PaintOperation::PaintXObject(name) => {
                    self.run_form(&name, resources, state)?;
                }
            }
        }
        Ok(())
    }

    fn run_form(
        &mut self,
        name: &str,
        resources: Resources<'a>,
        state: &GraphicsState,
    ) -> Result<(), String> {
        let Some((id, stream)) = resources.form(name) else {
            return Ok(());
        };
        if self.forms.contains(&id) {
            warn!(form = name, "Skipping recursive form XObject");
            return Ok(());
        }
        if self.forms.len() >= MAX_FORM_DEPTH {
            warn!(form = name, depth = self.forms.len(), "Form XObject nesting too deep");
            return Ok(());
        }

        let form_resources = match stream.dict.get(b"Resources") {
            Ok(object) => Resources::new(self.doc, resolve_dict(self.doc, object)),
            Err(_) => resources,
        };
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        // A form runs with a copy of the invoking state, like an implicit q/Q.
        let mut form_state = state.clone();
        self.forms.push(id);
        let result = self.run(&data, form_resources, &mut form_state);
        self.forms.pop();
        result.map_err(|e| format!("form XObject /{name}: {e}"))
    }
}
