//! Synthetic cut sheets
//!
//! Builds small, valid PDFs with a known number of target-magenta cut lines
//! mixed with other vector content. Used by the `demo` command and tests.

use crate::color::TARGET_COLOR;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::fmt::Write as _;

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const SPOT_NAME: &str = "CutContour";

fn integers(values: &[i64]) -> Object {
    Object::Array(values.iter().map(|v| Object::Integer(*v)).collect())
}

/// `[/Separation /CutContour /DeviceCMYK <tint>]` mapping full tint to 100% magenta.
fn spot_color_space() -> Object {
    Object::Array(vec![
        Object::Name(b"Separation".to_vec()),
        Object::Name(SPOT_NAME.as_bytes().to_vec()),
        Object::Name(b"DeviceCMYK".to_vec()),
        Object::Dictionary(dictionary! {
            "FunctionType" => 2i64,
            "Domain" => integers(&[0, 1]),
            "C0" => integers(&[0, 0, 0, 0]),
            "C1" => integers(&[0, 1, 0, 0]),
            "N" => 1i64,
        }),
    ])
}

fn resources(forms: Dictionary) -> Dictionary {
    dictionary! {
        "XObject" => forms,
        "ColorSpace" => dictionary! { SPOT_NAME => spot_color_space() },
    }
}

/// Content of one generated page.
#[derive(Debug, Clone, Default)]
pub struct SamplePage {
    magenta_lines: usize,
    other_lines: usize,
    magenta_fills: usize,
    form_lines: usize,
    process_lines: usize,
    spot_lines: usize,
    inline_image: bool,
    trailing_content: Vec<u8>,
}

impl SamplePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stroked lines in the target magenta; each counts as one instance.
    pub fn magenta_lines(mut self, count: usize) -> Self {
        self.magenta_lines = count;
        self
    }

    /// Black and cyan strokes that never match.
    pub fn other_lines(mut self, count: usize) -> Self {
        self.other_lines = count;
        self
    }

    /// Fill-only rectangles in the target magenta; these carry no stroke color.
    pub fn magenta_fills(mut self, count: usize) -> Self {
        self.magenta_fills = count;
        self
    }

    /// Target-magenta strokes drawn inside a form XObject.
    pub fn form_lines(mut self, count: usize) -> Self {
        self.form_lines = count;
        self
    }

    /// Strokes in 100% process magenta (`0 1 0 0 K`).
    pub fn process_lines(mut self, count: usize) -> Self {
        self.process_lines = count;
        self
    }

    /// Strokes in the `CutContour` spot color, whose CMYK alternate is 100% magenta.
    pub fn spot_lines(mut self, count: usize) -> Self {
        self.spot_lines = count;
        self
    }

    /// Starts the page with a small inline image holding binary data.
    pub fn inline_image(mut self, enabled: bool) -> Self {
        self.inline_image = enabled;
        self
    }

    /// Raw bytes appended to the end of the page's content stream.
    pub fn trailing_content(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.trailing_content = bytes.into();
        self
    }

    /// Number of elements on this page that classify as magenta-line instances.
    pub fn expected_instances(&self) -> usize {
        self.magenta_lines + self.form_lines + self.process_lines + self.spot_lines
    }

    fn content(&self, form_name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        if self.inline_image {
            bytes.extend_from_slice(b"q 16 0 0 4 36 20 cm BI /W 4 /H 1 /BPC 8 /CS /G ID ");
            bytes.extend_from_slice(&[0x00, 0xff, 0x0a, 0x80]);
            bytes.extend_from_slice(b" EI Q\n");
        }
        bytes.extend_from_slice(self.drawing_content(form_name).as_bytes());
        bytes.extend_from_slice(&self.trailing_content);
        bytes
    }

    fn drawing_content(&self, form_name: &str) -> String {
        let magenta = format!("{} {} {} RG", TARGET_COLOR.r, TARGET_COLOR.g, TARGET_COLOR.b);
        let mut out = String::new();
        let mut y = 40;

        for i in 0..self.other_lines {
            let color = if i % 2 == 0 { "0 0 0 RG" } else { "0 1 1 RG" };
            let _ = writeln!(out, "q {color} 0.5 w 36 {y} m 576 {y} l S Q");
            y += 12;
        }
        for _ in 0..self.magenta_fills {
            let _ = writeln!(
                out,
                "q {} {} {} rg 36 {y} 120 8 re f Q",
                TARGET_COLOR.r, TARGET_COLOR.g, TARGET_COLOR.b
            );
            y += 12;
        }
        for _ in 0..self.magenta_lines {
            let _ = writeln!(out, "q {magenta} 0.25 w 36 {y} m 576 {y} l S Q");
            y += 12;
        }
        for _ in 0..self.process_lines {
            let _ = writeln!(out, "q 0 1 0 0 K 0.25 w 36 {y} m 576 {y} l S Q");
            y += 12;
        }
        for _ in 0..self.spot_lines {
            let _ = writeln!(out, "q /{SPOT_NAME} CS 1 SCN 0.25 w 36 {y} m 576 {y} l S Q");
            y += 12;
        }
        if self.form_lines > 0 {
            let _ = writeln!(out, "q 1 0 0 1 0 {y} cm /{form_name} Do Q");
        }
        out
    }

    fn form_content(&self) -> String {
        let magenta = format!("{} {} {} RG", TARGET_COLOR.r, TARGET_COLOR.g, TARGET_COLOR.b);
        let mut out = format!("{magenta} 0.25 w\n");
        for i in 0..self.form_lines {
            let x = 36 + (i as i64 % 20) * 24;
            let _ = writeln!(out, "{x} 0 m {x} 20 l S");
        }
        out
    }
}

/// Builder for a multi-page sample document.
#[derive(Debug, Clone, Default)]
pub struct SampleSheet {
    pages: Vec<SamplePage>,
    inherit_resources: bool,
}

impl SampleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: SamplePage) -> Self {
        self.pages.push(page);
        self
    }

    /// Places the resource dictionary on the page tree root instead of each page.
    pub fn inherit_resources(mut self, inherit: bool) -> Self {
        self.inherit_resources = inherit;
        self
    }

    pub fn expected_instances(&self) -> usize {
        self.pages.iter().map(SamplePage::expected_instances).sum()
    }

    /// Serializes the sheet as PDF bytes.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(self.pages.len());
        let mut shared_forms = Dictionary::new();

        for (index, page) in self.pages.iter().enumerate() {
            let form_name = format!("Fm{index}");
            let mut forms = Dictionary::new();
            if page.form_lines > 0 {
                let form = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(PAGE_WIDTH), Object::Integer(24)],
                    },
                    page.form_content().into_bytes(),
                );
                let form_id = doc.add_object(form);
                forms.set(form_name.clone(), form_id);
                shared_forms.set(form_name.clone(), form_id);
            }

            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                page.content(&form_name),
            ));
            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
                "Contents" => content_id,
            };
            if !self.inherit_resources {
                page_dict.set("Resources", resources(forms));
            }
            kids.push(Object::Reference(doc.add_object(page_dict)));
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        };
        if self.inherit_resources {
            pages.set("Resources", resources(shared_forms));
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(bytes)
    }
}
