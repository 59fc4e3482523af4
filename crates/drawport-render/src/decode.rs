//! Locates the `mxGraphModel` of the first diagram page in a draw.io document.
//!
//! draw.io files come in three shapes:
//! - a bare `<mxGraphModel>` document,
//! - `<mxfile><diagram><mxGraphModel>...` (uncompressed pages),
//! - `<mxfile><diagram>BASE64</diagram>` where the text is base64 of raw-deflated,
//!   URI-encoded model XML (the desktop app's default "compressed" format).

use std::borrow::Cow;
use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Returns the model XML of the first page, borrowing from `xml` when the page is uncompressed.
pub fn first_page_model(xml: &str) -> Result<Cow<'_, str>> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "mxGraphModel" => Ok(Cow::Borrowed(xml)),
        "mxfile" => {
            let diagram = root
                .children()
                .find(|n| n.has_tag_name("diagram"))
                .ok_or(Error::MissingModel)?;

            if let Some(model) = diagram.children().find(|n| n.has_tag_name("mxGraphModel")) {
                return Ok(Cow::Borrowed(&xml[model.range()]));
            }

            let text: String = diagram
                .children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            if text.trim().is_empty() {
                return Err(Error::MissingModel);
            }
            Ok(Cow::Owned(inflate_page(&text)?))
        }
        other => Err(Error::UnexpectedRoot {
            name: other.to_string(),
        }),
    }
}

/// Decodes a compressed `<diagram>` payload back to model XML.
pub fn inflate_page(payload: &str) -> Result<String> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let deflated = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::compressed(format!("base64: {e}")))?;

    let mut inflated = Vec::new();
    flate2::read::DeflateDecoder::new(deflated.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| Error::compressed(format!("inflate: {e}")))?;

    let encoded = String::from_utf8(inflated)
        .map_err(|e| Error::compressed(format!("utf-8: {e}")))?;
    percent_decode(&encoded)
}

/// Reverses JavaScript's `encodeURIComponent`.
fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::compressed(format!("bad percent escape at offset {i}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| Error::compressed(format!("utf-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compress(model: &str) -> String {
        // encodeURIComponent leaves these unescaped; everything else becomes %XX.
        let mut encoded = String::new();
        for b in model.bytes() {
            if b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b) {
                encoded.push(b as char);
            } else {
                encoded.push_str(&format!("%{b:02X}"));
            }
        }
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(encoded.as_bytes()).unwrap();
        STANDARD.encode(enc.finish().unwrap())
    }

    #[test]
    fn bare_model_is_returned_as_is() {
        let xml = r#"<mxGraphModel><root><mxCell id="0"/></root></mxGraphModel>"#;
        assert_eq!(first_page_model(xml).unwrap(), xml);
    }

    #[test]
    fn uncompressed_page_borrows_the_model_slice() {
        let xml = r#"<mxfile><diagram id="a"><mxGraphModel dx="1"><root/></mxGraphModel></diagram><diagram id="b"/></mxfile>"#;
        let model = first_page_model(xml).unwrap();
        assert!(matches!(model, Cow::Borrowed(_)));
        assert_eq!(model, r#"<mxGraphModel dx="1"><root/></mxGraphModel>"#);
    }

    #[test]
    fn compressed_page_is_inflated() {
        let model = r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="2" value="Héllo &amp; co" vertex="1"/></root></mxGraphModel>"#;
        let xml = format!(
            "<mxfile><diagram id=\"p\" name=\"Page-1\">\n  {}\n</diagram></mxfile>",
            compress(model)
        );
        assert_eq!(first_page_model(&xml).unwrap(), model);
    }

    #[test]
    fn corrupt_compressed_page_is_reported() {
        let err = first_page_model("<mxfile><diagram>!!!</diagram></mxfile>").unwrap_err();
        assert!(err.to_string().starts_with("failed to decode compressed diagram"));
    }

    #[test]
    fn other_roots_and_empty_files_are_rejected() {
        assert!(matches!(
            first_page_model("<svg/>"),
            Err(Error::UnexpectedRoot { .. })
        ));
        assert!(matches!(
            first_page_model("<mxfile/>"),
            Err(Error::MissingModel)
        ));
        assert!(matches!(first_page_model("<mxfile"), Err(Error::Xml(_))));
    }
}
