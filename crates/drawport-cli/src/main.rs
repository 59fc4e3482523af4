use drawport::{
    BackendKind, ConfigError, DiagramDocument, EnvelopeError, ErrorKind, ExportConfig,
    ImageFormat, Pipeline, RenderResult,
};
use std::io::{Read, Write};
use std::path::PathBuf;

const LOG_ENV: &str = "DRAWPORT_LOG";

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    InvalidArg(String),
    Io(std::io::Error),
    Config(ConfigError),
    Export(drawport::Error),
    Envelope(EnvelopeError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::InvalidArg(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Config(err) => write!(f, "{err}"),
            CliError::Export(err) => write!(f, "{err}"),
            CliError::Envelope(err) => write!(f, "invalid data URI: {err}"),
        }
    }
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::InvalidArg(_) | CliError::Config(_) => 2,
            CliError::Export(err) => match err.kind() {
                ErrorKind::InvalidOptions => 2,
                ErrorKind::BackendUnavailable => 3,
                ErrorKind::Timeout => 4,
                ErrorKind::Protocol | ErrorKind::Render => 1,
            },
            CliError::Io(_) | CliError::Envelope(_) => 1,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<drawport::Error> for CliError {
    fn from(value: drawport::Error) -> Self {
        Self::Export(value)
    }
}

impl From<EnvelopeError> for CliError {
    fn from(value: EnvelopeError) -> Self {
        Self::Envelope(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Command {
    #[default]
    Render,
    Decode,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    out: Option<String>,
    config: Option<String>,
    backend: Option<BackendKind>,
    format: Option<ImageFormat>,
    scale: Option<f32>,
    border: Option<f32>,
    timeout_ms: Option<u64>,
    drawio: Option<String>,
    bridge: Option<String>,
    data_uri: bool,
    verbose: bool,
}

fn usage() -> &'static str {
    "drawport-cli\n\
\n\
USAGE:\n\
  drawport-cli [render] [--backend embed|local|cli] [--format png] [--scale <n>] [--border <n>] [--timeout-ms <n>] [--config <json-path>] [--drawio <path>] [--bridge <cmd>] [--data-uri] [--out <path>|-] [--verbose] [<path>|-]\n\
  drawport-cli decode [--out <path>|-] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - render writes PNG next to the input file (or ./out.png for stdin); --out - writes to stdout.\n\
  - --data-uri writes a data:image/png;base64 URI instead of raw bytes (stdout unless --out).\n\
  - decode turns a data URI (or bare base64) back into image bytes.\n\
  - Settings apply in order: defaults, --config file, DRAWPORT_* environment, flags.\n\
  - Logging goes to stderr; filter with DRAWPORT_LOG (default drawport=info).\n\
\n\
EXIT CODES:\n\
  0 success, 1 render/protocol failure, 2 usage or configuration, 3 backend unavailable, 4 timeout\n\
"
}

fn next_value<'a>(
    it: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<&'a String, CliError> {
    it.next()
        .ok_or_else(|| CliError::InvalidArg(format!("{flag} expects a value")))
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, CliError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| CliError::InvalidArg(format!("invalid value for {flag}: {raw}")))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "render" => args.command = Command::Render,
            "decode" => args.command = Command::Decode,
            "--verbose" | "-v" => args.verbose = true,
            "--data-uri" => args.data_uri = true,
            "--backend" => {
                args.backend = Some(next_value(&mut it, a)?.parse()?);
            }
            "--format" => {
                args.format = Some(next_value(&mut it, a)?.parse()?);
            }
            "--scale" => {
                args.scale = Some(parse_number(next_value(&mut it, a)?, a)?);
            }
            "--border" => {
                args.border = Some(parse_number(next_value(&mut it, a)?, a)?);
            }
            "--timeout-ms" => {
                args.timeout_ms = Some(parse_number(next_value(&mut it, a)?, a)?);
            }
            "--config" => args.config = Some(next_value(&mut it, a)?.clone()),
            "--drawio" => args.drawio = Some(next_value(&mut it, a)?.clone()),
            "--bridge" => args.bridge = Some(next_value(&mut it, a)?.clone()),
            "--out" | "-o" => args.out = Some(next_value(&mut it, a)?.clone()),
            "-" => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some("-".to_string());
            }
            other if other.starts_with('-') => {
                return Err(CliError::InvalidArg(format!("unknown flag: {other}")));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn init_logging(verbose: bool) {
    let mut filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("drawport=info"));
    if verbose {
        if let Ok(directive) = "drawport=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn default_out_path(input: Option<&str>, ext: &str) -> PathBuf {
    match input {
        Some(path) if path != "-" => PathBuf::from(path).with_extension(ext),
        _ => PathBuf::from(format!("out.{ext}")),
    }
}

fn write_bytes(bytes: &[u8], out: Option<&str>) -> Result<(), CliError> {
    match out {
        None | Some("-") => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        Some(path) => std::fs::write(path, bytes)?,
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ExportConfig, CliError> {
    let mut config = match args.config.as_deref() {
        Some(path) => ExportConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ExportConfig::default(),
    };
    config.apply_env()?;

    let mut overlay = serde_json::Map::new();
    if let Some(backend) = args.backend {
        overlay.insert("backend".into(), backend.as_str().into());
    }
    if let Some(format) = args.format {
        overlay.insert("format".into(), format.as_str().into());
    }
    if let Some(scale) = args.scale {
        overlay.insert("scale".into(), serde_json::json!(scale));
    }
    if let Some(border) = args.border {
        overlay.insert("border".into(), serde_json::json!(border));
    }
    if let Some(timeout_ms) = args.timeout_ms {
        overlay.insert("timeoutMs".into(), timeout_ms.into());
    }
    if let Some(drawio) = &args.drawio {
        overlay.insert("cli".into(), serde_json::json!({ "executable": drawio }));
    }
    if let Some(bridge) = &args.bridge {
        overlay.insert("embed".into(), serde_json::json!({ "command": bridge }));
    }
    config.merge_json(&serde_json::Value::Object(overlay))?;
    Ok(config)
}

fn run_render(args: &Args) -> Result<(), CliError> {
    let config = load_config(args)?;
    let options = config.render_options()?;
    let document = DiagramDocument::new(read_input(args.input.as_deref())?);
    let pipeline = Pipeline::from_config(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(pipeline.render(&document, &options))?;

    if args.data_uri {
        let mut uri = result.to_data_uri();
        uri.push('\n');
        return write_bytes(uri.as_bytes(), args.out.as_deref());
    }
    match args.out.as_deref() {
        Some(out) => write_bytes(&result.encoded_image, Some(out)),
        None => {
            let path = default_out_path(args.input.as_deref(), options.format.extension());
            tracing::info!(path = %path.display(), "writing image");
            std::fs::write(&path, &result.encoded_image)?;
            Ok(())
        }
    }
}

fn run_decode(args: &Args) -> Result<(), CliError> {
    let text = read_input(args.input.as_deref())?;
    let text = text.trim();
    let result = if drawport::envelope::is_data_uri(text) {
        RenderResult::from_data_uri(text)?
    } else {
        let bytes = drawport::envelope::decode_payload(text, ImageFormat::Png.mime_type())?;
        RenderResult::new(bytes, ImageFormat::Png)
    };
    match args.out.as_deref() {
        Some(out) => write_bytes(&result.encoded_image, Some(out)),
        None => {
            let ext = if result.mime_type == ImageFormat::Png.mime_type() {
                ImageFormat::Png.extension()
            } else {
                "bin"
            };
            std::fs::write(default_out_path(args.input.as_deref(), ext), &result.encoded_image)?;
            Ok(())
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Render => run_render(&args),
        Command::Decode => run_decode(&args),
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
    };

    init_logging(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}
