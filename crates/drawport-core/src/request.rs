use std::fmt;

use crate::envelope;
use crate::error::Result;
use crate::options::{ImageFormat, RenderOptions};

/// Diagram text in the draw.io XML dialect.
///
/// The pipeline treats it as an opaque payload: it is neither parsed nor validated before being
/// handed to a backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DiagramDocument(String);

impl DiagramDocument {
    pub fn new(xml: impl Into<String>) -> Self {
        Self(xml.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DiagramDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Documents can be large; logs only need the size.
        f.debug_struct("DiagramDocument")
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<String> for DiagramDocument {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DiagramDocument {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A validated, immutable render request.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    document: DiagramDocument,
    options: RenderOptions,
}

impl RenderRequest {
    pub fn new(document: DiagramDocument, options: RenderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { document, options })
    }

    pub fn document(&self) -> &DiagramDocument {
        &self.document
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn format(&self) -> ImageFormat {
        self.options.format
    }
}

/// An encoded image produced by a successful render.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub encoded_image: Vec<u8>,
    pub mime_type: String,
}

impl RenderResult {
    pub fn new(encoded_image: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            encoded_image,
            mime_type: format.mime_type().to_string(),
        }
    }

    /// The result as a self-describing `data:` URI.
    pub fn to_data_uri(&self) -> String {
        envelope::attach(&self.encoded_image, &self.mime_type)
    }

    pub fn from_data_uri(text: &str) -> std::result::Result<Self, envelope::EnvelopeError> {
        let stripped = envelope::strip(text)?;
        Ok(Self {
            encoded_image: stripped.bytes,
            mime_type: stripped.mime_type,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.encoded_image
    }
}

impl fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResult")
            .field("mime_type", &self.mime_type)
            .field("len", &self.encoded_image.len())
            .finish()
    }
}
