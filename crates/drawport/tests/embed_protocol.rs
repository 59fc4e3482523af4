use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use drawport::engine::{EngineLauncher, EngineSession};
use drawport::{
    BackendKind, DiagramDocument, Error, ErrorKind, PNG_SIGNATURE, Pipeline, RenderOptions,
    Result, envelope,
};
use futures::future::BoxFuture;
use serde_json::Value;

/// What the scripted surface answers to the export command.
#[derive(Clone)]
enum ExportReply {
    /// A PNG whose body is the loaded document, so results can be traced back to their input.
    Echo,
    Events(Vec<String>),
}

#[derive(Clone)]
struct Script {
    on_start: Vec<String>,
    on_load: Vec<String>,
    on_export: ExportReply,
    /// When no events are queued: wait forever (`true`) or report a closed channel.
    hang_when_idle: bool,
    /// Teardown never completes.
    stuck_on_terminate: bool,
}

impl Script {
    fn happy() -> Self {
        Self {
            on_start: vec![event("init")],
            on_load: vec![event("load")],
            on_export: ExportReply::Echo,
            hang_when_idle: true,
            stuck_on_terminate: false,
        }
    }
}

fn event(name: &str) -> String {
    format!(r#"{{"event":"{name}"}}"#)
}

#[derive(Default)]
struct Tally {
    launched: AtomicUsize,
    terminated: AtomicUsize,
    commands: Mutex<Vec<Value>>,
}

struct ScriptedLauncher {
    script: Script,
    tally: Arc<Tally>,
}

impl EngineLauncher for ScriptedLauncher {
    fn launch(&self) -> BoxFuture<'_, Result<Box<dyn EngineSession>>> {
        self.tally.launched.fetch_add(1, Ordering::SeqCst);
        let session = ScriptedSession {
            script: self.script.clone(),
            tally: Arc::clone(&self.tally),
            queue: self.script.on_start.iter().cloned().collect(),
            document: None,
        };
        Box::pin(async move { Ok(Box::new(session) as Box<dyn EngineSession>) })
    }
}

struct ScriptedSession {
    script: Script,
    tally: Arc<Tally>,
    queue: VecDeque<String>,
    document: Option<String>,
}

impl EngineSession for ScriptedSession {
    fn send(&mut self, message: String) -> BoxFuture<'_, Result<()>> {
        let value: Value = serde_json::from_str(&message).expect("driver sends JSON");
        self.tally
            .commands
            .lock()
            .expect("tally lock")
            .push(value.clone());
        match value["action"].as_str() {
            Some("load") => {
                self.document = value["xml"].as_str().map(str::to_string);
                self.queue.extend(self.script.on_load.iter().cloned());
            }
            Some("export") => match &self.script.on_export {
                ExportReply::Echo => {
                    let mut bytes = PNG_SIGNATURE.to_vec();
                    bytes.extend(self.document.clone().unwrap_or_default().into_bytes());
                    let data = envelope::attach(&bytes, "image/png");
                    self.queue
                        .push_back(serde_json::json!({"event": "export", "data": data}).to_string());
                }
                ExportReply::Events(events) => self.queue.extend(events.iter().cloned()),
            },
            _ => {}
        }
        Box::pin(async { Ok(()) })
    }

    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            if let Some(next) = self.queue.pop_front() {
                return Ok(Some(next));
            }
            if self.script.hang_when_idle {
                futures::future::pending::<()>().await;
            }
            Ok(None)
        })
    }

    fn terminate(self: Box<Self>) -> BoxFuture<'static, ()> {
        self.tally.terminated.fetch_add(1, Ordering::SeqCst);
        let stuck = self.script.stuck_on_terminate;
        Box::pin(async move {
            if stuck {
                futures::future::pending::<()>().await;
            }
        })
    }
}

fn pipeline(script: Script) -> (Pipeline, Arc<Tally>) {
    let tally = Arc::new(Tally::default());
    let launcher = ScriptedLauncher {
        script,
        tally: Arc::clone(&tally),
    };
    (Pipeline::default().with_embed_engine(launcher), tally)
}

fn embed_options() -> RenderOptions {
    RenderOptions::default()
        .with_backend(BackendKind::Embed)
        .with_timeout(Duration::from_secs(5))
}

const DOC: &str = r#"<mxfile><diagram id="a"><mxGraphModel><root><mxCell id="0"/></root></mxGraphModel></diagram></mxfile>"#;

#[tokio::test]
async fn happy_path_returns_png_and_sends_commands_in_order() {
    let (pipeline, tally) = pipeline(Script::happy());
    let options = embed_options().with_scale(2.0).with_border(10.0);
    let result = pipeline
        .render(&DiagramDocument::from(DOC), &options)
        .await
        .expect("render");

    assert_eq!(result.mime_type, "image/png");
    assert!(result.encoded_image.starts_with(PNG_SIGNATURE));
    assert_eq!(&result.encoded_image[8..], DOC.as_bytes());

    let commands = tally.commands.lock().unwrap().clone();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["action"], "load");
    assert_eq!(commands[0]["xml"], DOC);
    assert_eq!(commands[0]["autosave"], 0);
    assert_eq!(commands[1]["action"], "export");
    assert_eq!(commands[1]["format"], "png");
    assert_eq!(commands[1]["scale"], 2.0);
    assert_eq!(commands[1]["border"], 10.0);
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn configure_request_is_answered_before_init() {
    let mut script = Script::happy();
    script.on_start = vec![event("configure"), event("init")];
    let (pipeline, tally) = pipeline(script);
    pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .expect("render");

    let commands = tally.commands.lock().unwrap().clone();
    let actions: Vec<&str> = commands
        .iter()
        .filter_map(|c| c["action"].as_str())
        .collect();
    assert_eq!(actions, ["configure", "load", "export"]);
    assert_eq!(commands[0]["config"], serde_json::json!({}));
}

#[tokio::test]
async fn unknown_events_are_skipped() {
    let mut script = Script::happy();
    script.on_start = vec![r#"{"event":"autosave","xml":""}"#.to_string(), event("init")];
    let (pipeline, _) = pipeline(script);
    let result = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn error_event_becomes_render_error_verbatim() {
    let mut script = Script::happy();
    script.on_export = ExportReply::Events(vec![
        r#"{"event":"error","message":"Invalid file data"}"#.to_string(),
    ]);
    let (pipeline, tally) = pipeline(script);
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .unwrap_err();
    assert!(
        matches!(&err, Error::Render { message } if message == "Invalid file data"),
        "{err:?}"
    );
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_message_is_a_protocol_error() {
    let mut script = Script::happy();
    script.on_start = vec!["<html>not json</html>".to_string()];
    let (pipeline, tally) = pipeline(script);
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn export_before_load_ack_is_a_protocol_error() {
    let mut script = Script::happy();
    script.on_load = vec![
        serde_json::json!({"event": "export", "data": "iVBORw0KGgo="}).to_string(),
    ];
    let (pipeline, _) = pipeline(script);
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("unexpected `export` event"), "{err}");
}

#[tokio::test]
async fn wrong_mime_payload_is_a_protocol_error() {
    let mut script = Script::happy();
    script.on_export = ExportReply::Events(vec![
        serde_json::json!({"event": "export", "data": "data:image/svg+xml;base64,PHN2Zy8+"})
            .to_string(),
    ]);
    let (pipeline, _) = pipeline(script);
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn closed_channel_is_a_protocol_error() {
    let mut script = Script::happy();
    script.on_start = Vec::new();
    script.hang_when_idle = false;
    let (pipeline, tally) = pipeline(script);
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("closed the channel"), "{err}");
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silent_surface_times_out_and_is_terminated() {
    let mut script = Script::happy();
    script.on_load = Vec::new();
    let (pipeline, tally) = pipeline(script);
    let budget = Duration::from_millis(200);
    let started = Instant::now();
    let err = pipeline
        .render(
            &DiagramDocument::from(DOC),
            &embed_options().with_timeout(budget),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < budget + Duration::from_secs(2));
    match err {
        Error::Timeout { budget: b, stage } => {
            assert_eq!(b, budget);
            assert!(stage.contains("load"), "{stage}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stuck_teardown_does_not_stretch_the_timeout() {
    let mut script = Script::happy();
    script.on_load = Vec::new();
    script.stuck_on_terminate = true;
    let (pipeline, tally) = pipeline(script);
    let budget = Duration::from_millis(300);
    let started = Instant::now();
    let err = pipeline
        .render(
            &DiagramDocument::from(DOC),
            &embed_options().with_timeout(budget),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    let elapsed = started.elapsed();
    assert!(elapsed < budget + Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_options_fail_before_any_session() {
    let (pipeline, tally) = pipeline(Script::happy());
    let err = pipeline
        .render(&DiagramDocument::from(DOC), &embed_options().with_scale(-1.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOptions);
    assert_eq!(tally.launched.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renders_stay_isolated() {
    let (pipeline, tally) = pipeline(Script::happy());
    let pipeline = Arc::new(pipeline);

    let mut handles = Vec::new();
    for i in 0..16 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let doc = format!(r#"<mxfile><diagram id="d{i}"/></mxfile>"#);
            let result = pipeline
                .render(&DiagramDocument::from(doc.as_str()), &embed_options())
                .await
                .expect("render");
            (doc, result)
        }));
    }
    for handle in handles {
        let (doc, result) = handle.await.expect("task");
        assert_eq!(&result.encoded_image[8..], doc.as_bytes());
    }
    assert_eq!(tally.launched.load(Ordering::SeqCst), 16);
    assert_eq!(tally.terminated.load(Ordering::SeqCst), 16);
}
