use crate::*;
use std::time::Duration;

#[test]
fn backend_kind_parses_case_insensitively() {
    assert_eq!("embed".parse::<BackendKind>().unwrap(), BackendKind::Embed);
    assert_eq!(" Local ".parse::<BackendKind>().unwrap(), BackendKind::Local);
    assert_eq!("CLI".parse::<BackendKind>().unwrap(), BackendKind::Cli);
    assert_eq!(
        "browser".parse::<BackendKind>().unwrap_err().to_string(),
        "unknown backend: browser (expected embed, local or cli)"
    );
}

#[test]
fn only_png_is_a_supported_format() {
    assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
    assert!("svg".parse::<ImageFormat>().is_err());
    assert_eq!(ImageFormat::Png.mime_type(), "image/png");
}

#[test]
fn png_signature_requires_a_payload_after_the_magic() {
    assert!(!is_png(PNG_SIGNATURE));
    assert!(!is_png(b"GIF89a..."));
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.push(0);
    assert!(is_png(&bytes));
    assert!(ImageFormat::Png.matches_signature(&bytes));
}

#[test]
fn validate_rejects_out_of_range_options() {
    let base = RenderOptions::default();
    assert!(base.validate().is_ok());
    assert!(base.clone().with_scale(0.0).validate().is_ok());

    for bad in [
        base.clone().with_scale(-1.0),
        base.clone().with_scale(f32::NAN),
        base.clone().with_border(-0.5),
        base.clone().with_timeout(Duration::ZERO),
    ] {
        let err = bad.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOptions);
    }
}

#[test]
fn zero_scale_means_backend_default() {
    assert_eq!(RenderOptions::default().with_scale(0.0).effective_scale(), 1.0);
    assert_eq!(RenderOptions::default().with_scale(2.5).effective_scale(), 2.5);
}

#[test]
fn render_request_validates_on_construction() {
    let doc = DiagramDocument::new("<mxfile/>");
    assert!(RenderRequest::new(doc.clone(), RenderOptions::default()).is_ok());
    let err = RenderRequest::new(doc, RenderOptions::default().with_border(f32::INFINITY))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOptions);
}

#[test]
fn timeout_error_reports_budget_and_stage() {
    let err = Error::timeout(Duration::from_millis(1500), "waiting for export");
    assert_eq!(
        err.to_string(),
        "render timed out after 1500ms while waiting for export"
    );
}

#[test]
fn document_debug_output_hides_the_payload() {
    let doc = DiagramDocument::from("<mxfile>secret</mxfile>");
    assert_eq!(format!("{doc:?}"), "DiagramDocument { len: 23 }");
}
