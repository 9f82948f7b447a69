use crate::content::{resolve, DrawingCollector, Resources};
use crate::drawing::Page;
use crate::error::{Result, ScanError};
use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;

/// Page trees deeper than this are treated as malformed when looking up inherited resources.
const MAX_TREE_DEPTH: usize = 64;

/// A parsed PDF opened from memory.
///
/// The parsed objects are owned by this value and released when it is dropped,
/// whichever way a scan exits.
pub struct PdfDocument {
    inner: lopdf::Document,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.inner.version)
            .field("pages", &self.page_count())
            .finish()
    }
}

impl PdfDocument {
    /// Parses a PDF from a byte buffer.
    pub fn open(bytes: &[u8]) -> Result<Self> {
        let inner = lopdf::Document::load_mem(bytes).map_err(ScanError::UnreadableDocument)?;
        debug!(version = %inner.version, "Opened PDF document");
        Ok(Self { inner })
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Extracts the drawings of every page, in document order.
    pub fn pages(&self) -> impl Iterator<Item = Result<Page>> + '_ {
        self.inner
            .get_pages()
            .into_iter()
            .map(move |(number, id)| self.load_page(number, id))
    }

    fn load_page(&self, number: u32, id: ObjectId) -> Result<Page> {
        let corrupt = |reason: String| ScanError::CorruptPage {
            page: number,
            reason,
        };

        let content = self
            .inner
            .get_page_content(id)
            .map_err(|e| corrupt(e.to_string()))?;
        let resources = Resources::new(&self.inner, self.page_resources(id));
        let elements = DrawingCollector::new(&self.inner)
            .collect(&content, resources)
            .map_err(corrupt)?;

        debug!(page = number, drawings = elements.len(), "Extracted page drawings");
        Ok(Page::new(number, elements))
    }

    /// Finds the page's resource dictionary, following `/Parent` for inherited resources.
    fn page_resources(&self, id: ObjectId) -> Option<&Dictionary> {
        let mut node = self.inner.get_dictionary(id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(resources) = node.get(b"Resources") {
                return match resolve(&self.inner, resources) {
                    Object::Dictionary(dict) => Some(dict),
                    _ => None,
                };
            }
            node = match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => self.inner.get_dictionary(*parent).ok()?,
                _ => return None,
            };
        }
        None
    }
}
