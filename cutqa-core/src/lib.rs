//! # cutqa
//!
//! Quality check for print-production cut sheets: finds vector paths stroked
//! in the reference cut-line magenta and turns the count into a pass/fail verdict.
//!
//! ## Features
//!
//! - **Color matching**: distance-to-target plus a hue bucket, see [`classify`]
//! - **Drawing extraction**: stroke/fill colors from page content streams and form XObjects,
//!   in device, ICC-based, Separation and DeviceN color spaces
//! - **Verdicts**: `PASS` when no instances are found, `FAIL` otherwise
//! - **Sample sheets**: generate PDFs with a known number of cut lines
//!
//! ## Quick Start
//!
//! ```rust
//! use cutqa::sample::{SamplePage, SampleSheet};
//! use cutqa::{scan, ScanStatus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pdf = SampleSheet::new()
//!     .page(SamplePage::new().magenta_lines(2).other_lines(3))
//!     .to_bytes()?;
//!
//! let verdict = scan(&pdf)?;
//! assert_eq!(verdict.instance_count(), 2);
//! assert_eq!(verdict.status(), ScanStatus::Fail);
//! assert_eq!(verdict.message(), "2 instances of magenta lines with vector paths");
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod content;
pub mod document;
pub mod drawing;
pub mod error;
pub mod function;
pub mod sample;
pub mod scanner;

pub use color::{classify, ColorSpace, DrawingColor, Rgb, MATCH_THRESHOLD, TARGET_COLOR};
pub use document::PdfDocument;
pub use drawing::{DrawingElement, Page, PaintKind};
pub use error::{Result, ScanError};
pub use scanner::{scan, scan_pages, ScanStatus, ScanVerdict, Scanner};

/// Current version of cutqa
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
