use std::path::PathBuf;

use drawport::{BackendKind, DiagramDocument, ErrorKind, Pipeline, RenderOptions, RenderResult};

fn fixture(name: &str) -> DiagramDocument {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(name);
    DiagramDocument::new(std::fs::read_to_string(&path).expect("fixture"))
}

fn png_size(result: &RenderResult) -> (u32, u32) {
    let decoder = png::Decoder::new(std::io::Cursor::new(&result.encoded_image));
    let reader = decoder.read_info().expect("png header");
    (reader.info().width, reader.info().height)
}

#[tokio::test]
async fn local_backend_renders_fixture() {
    let options = RenderOptions::default().with_backend(BackendKind::Local);
    let result = Pipeline::default()
        .render(&fixture("basic.drawio"), &options)
        .await
        .expect("render");
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(png_size(&result), (120, 40));
}

#[tokio::test]
async fn zero_scale_means_default_scale() {
    let pipeline = Pipeline::default();
    let doc = fixture("flow.drawio");
    let one = pipeline
        .render(&doc, &RenderOptions::default().with_scale(1.0))
        .await
        .expect("scale 1");
    let zero = pipeline
        .render(&doc, &RenderOptions::default().with_scale(0.0))
        .await
        .expect("scale 0");
    assert_eq!(png_size(&one), png_size(&zero));
}

#[tokio::test]
async fn envelope_round_trip_is_byte_identical() {
    let result = Pipeline::default()
        .render(&fixture("flow-compressed.drawio"), &RenderOptions::default())
        .await
        .expect("render");
    let uri = result.to_data_uri();
    assert!(uri.starts_with("data:image/png;base64,"));
    assert_eq!(RenderResult::from_data_uri(&uri).expect("strip"), result);
}

#[tokio::test]
async fn unparseable_document_is_a_render_error() {
    let err = Pipeline::default()
        .render(
            &DiagramDocument::from("<mxfile><diagram>"),
            &RenderOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
}

#[tokio::test]
async fn empty_page_renders_blank_canvas_of_border_size() {
    let doc = DiagramDocument::from(
        r#"<mxfile><diagram id="p"><mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/></root></mxGraphModel></diagram></mxfile>"#,
    );
    let result = Pipeline::default()
        .render(&doc, &RenderOptions::default().with_border(8.0))
        .await
        .expect("render");
    assert_eq!(png_size(&result), (16, 16));
}
