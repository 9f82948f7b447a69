//! Document scanning and verdicts

use crate::color::classify;
use crate::document::PdfDocument;
use crate::drawing::Page;
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Outcome of an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    /// No magenta-line instances were found
    Pass,
    /// At least one magenta-line instance was found
    Fail,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Pass => f.write_str("PASS"),
            ScanStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// Result of scanning one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanVerdict {
    instance_count: usize,
    status: ScanStatus,
    message: String,
}

impl ScanVerdict {
    pub fn from_count(instance_count: usize) -> Self {
        let status = if instance_count == 0 {
            ScanStatus::Pass
        } else {
            ScanStatus::Fail
        };
        Self {
            instance_count,
            status,
            message: format!("{instance_count} instances of magenta lines with vector paths"),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn passed(&self) -> bool {
        self.status == ScanStatus::Pass
    }
}

impl fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

/// Counts the elements of one page whose color classifies as a match.
pub fn count_page_instances(page: &Page) -> usize {
    page.elements
        .iter()
        .enumerate()
        .filter(|(index, element)| {
            let matched = classify(element.color());
            if matched {
                debug!(page = page.number, element = index, "Magenta line instance");
            }
            matched
        })
        .count()
}

/// Counts matching elements across already extracted pages.
pub fn count_instances<'a>(pages: impl IntoIterator<Item = &'a Page>) -> usize {
    pages.into_iter().map(count_page_instances).sum()
}

pub fn scan_pages<'a>(pages: impl IntoIterator<Item = &'a Page>) -> ScanVerdict {
    ScanVerdict::from_count(count_instances(pages))
}

/// Scans raw PDF bytes and produces a verdict.
///
/// Every page is visited before a verdict is built; the first page that
/// cannot be decoded fails the whole scan. The document is released on
/// every path out of this function.
pub fn scan(bytes: &[u8]) -> Result<ScanVerdict> {
    let document = PdfDocument::open(bytes)?;

    let mut count = 0;
    for page in document.pages() {
        count += count_page_instances(&page?);
    }

    let verdict = ScanVerdict::from_count(count);
    info!(
        pages = document.page_count(),
        instances = count,
        status = %verdict.status(),
        "Scan complete"
    );
    Ok(verdict)
}

/// Stateless entry point for callers that prefer a value to pass around.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scanner;

impl Scanner {
    pub fn new() -> Self {
        Scanner
    }

    pub fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict> {
        scan(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{DrawingColor, Rgb, TARGET_COLOR};
    use crate::drawing::DrawingElement;

    #[test]
    fn test_zero_instances_pass() {
        let verdict = ScanVerdict::from_count(0);
        assert_eq!(verdict.status(), ScanStatus::Pass);
        assert_eq!(verdict.message(), "0 instances of magenta lines with vector paths");
        assert!(verdict.passed());
    }

    #[test]
    fn test_any_instance_fails() {
        let verdict = ScanVerdict::from_count(3);
        assert_eq!(verdict.status(), ScanStatus::Fail);
        assert_eq!(verdict.message(), "3 instances of magenta lines with vector paths");
        assert_eq!(verdict.to_string(), "FAIL: 3 instances of magenta lines with vector paths");
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_value(ScanVerdict::from_count(1)).unwrap();
        assert_eq!(json["status"], "FAIL");
        assert_eq!(json["instance_count"], 1);
        assert_eq!(json["message"], "1 instances of magenta lines with vector paths");
    }

    #[test]
    fn test_count_skips_fills_and_unsupported_colors() {
        let page = Page::new(
            1,
            vec![
                DrawingElement::stroked(TARGET_COLOR.into()),
                DrawingElement::filled(TARGET_COLOR.into()),
                DrawingElement::stroked(DrawingColor::Unsupported { channels: 4 }),
                DrawingElement::stroked(Rgb::new(0.0, 0.0, 0.0).into()),
                DrawingElement::stroked(Rgb::new(0.93, 0.02, 0.55).into()),
            ],
        );
        assert_eq!(count_page_instances(&page), 2);
        assert_eq!(scan_pages([&page]).instance_count(), 2);
    }

    #[test]
    fn test_no_pages() {
        let verdict = scan_pages(std::iter::empty());
        assert_eq!(verdict, ScanVerdict::from_count(0));
    }
}
