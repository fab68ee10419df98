use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use docsync_core::{
    migrate, EditOutcome, Field, FragmentId, JsonFileStore, KeySpace, KvStore, MemoryStore,
    SafeStore, Session, Settings,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod markdown;

use markdown::{find_spans, splice, Span};

#[derive(Parser)]
#[command(
    name = "docsync",
    version = "0.3.0",
    about = "Keep LeRobot docs code samples in sync with your setup"
)]
struct Cli {
    /// Settings file (default: ./docsync.yaml when present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// -v for info, -vv for debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the values inferred from the documents' own samples
    Defaults {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the configuration and every derived value
    Derive {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long = "set")]
        set_values: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Rewrite the documents' code samples
    Render {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long = "set")]
        set_values: Vec<String>,
        #[arg(long, conflicts_with = "in_place")]
        out: Option<PathBuf>,
        #[arg(long)]
        in_place: bool,
        #[arg(long)]
        json: bool,
    },
    /// Apply and save edits
    Set {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long = "set", required = true)]
        set_values: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Save the inferred defaults as the configuration
    Reset {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Delete every saved value
    Clear {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result =
        load_settings(cli.settings.as_deref()).and_then(|s| run_command(cli.command, &s));
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => {
            let mut settings = Settings::load(path)?;
            if settings.store_path.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                settings.store_path = base.join(&settings.store_path);
            }
            Ok(settings)
        }
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            Ok(Settings::discover(&cwd)?)
        }
    }
}

fn run_command(command: Commands, settings: &Settings) -> Result<Option<Value>> {
    match command {
        Commands::Defaults { paths, json } => {
            let docs = load_documents(&paths)?;
            let session = Session::open(fragments(&docs), MemoryStore::new(), settings);
            let baseline = session.baseline();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "defaults",
                    "documents": docs.len(),
                    "fragments": session.fragments().len(),
                    "defaults": baseline.defaults,
                    "derived": baseline.resolved
                })));
            }
            print_fields(&serde_json::to_value(&baseline.defaults)?);
        }
        Commands::Derive {
            paths,
            set_values,
            json,
        } => {
            let edits = parse_set_bindings(&set_values)?;
            let docs = load_documents(&paths)?;
            let mut session = Session::open(fragments(&docs), preview_store(settings), settings);
            let outcomes = apply_edits(&mut session, &edits);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "derive",
                    "edits": outcomes,
                    "config": session.config(),
                    "derived": session.resolved(),
                    "diagnostics": session.diagnostics()
                })));
            }
            print_fields(&serde_json::to_value(session.resolved())?);
            print_diagnostics(&session);
        }
        Commands::Render {
            paths,
            set_values,
            out,
            in_place,
            json,
        } => {
            let edits = parse_set_bindings(&set_values)?;
            let docs = load_documents(&paths)?;
            let mut session = Session::open(fragments(&docs), preview_store(settings), settings);
            let outcomes = apply_edits(&mut session, &edits);
            let mut files = Vec::new();
            for doc in &docs {
                let rendered = render_document(doc, &session);
                let changed = rendered != doc.text;
                let written = if in_place {
                    if changed {
                        write_file(&doc.path, &rendered)?;
                    }
                    Some(doc.path.clone())
                } else if let Some(dir) = &out {
                    let target = dir.join(&doc.relative);
                    write_file(&target, &rendered)?;
                    Some(target)
                } else {
                    None
                };
                if let Some(path) = &written {
                    info!(path = %path.display(), changed, "rendered");
                }
                if !json && written.is_none() {
                    if docs.len() > 1 {
                        println!("==> {} <==", doc.path.display());
                    }
                    print!("{}", rendered);
                }
                let output = if json && !in_place && out.is_none() {
                    Value::String(rendered)
                } else {
                    Value::Null
                };
                files.push(json!({
                    "path": doc.path.display().to_string(),
                    "written_to": written.map(|p| p.display().to_string()),
                    "changed": changed,
                    "fragments": doc.spans.len(),
                    "output": output,
                }));
            }
            print_diagnostics(&session);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "render",
                    "edits": outcomes,
                    "files": files,
                    "diagnostics": session.diagnostics()
                })));
            }
        }
        Commands::Set {
            paths,
            set_values,
            json,
        } => {
            let edits = parse_set_bindings(&set_values)?;
            let docs = load_documents(&paths)?;
            let store = JsonFileStore::open(&settings.store_path);
            let mut session = Session::open(fragments(&docs), store, settings);
            let outcomes = apply_edits(&mut session, &edits);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "set",
                    "store": settings.store_path.display().to_string(),
                    "edits": outcomes,
                    "config": session.config(),
                    "diagnostics": session.diagnostics()
                })));
            }
            for outcome in &outcomes {
                println!(
                    "{}: {}",
                    outcome["field"].as_str().unwrap_or_default(),
                    outcome["outcome"].as_str().unwrap_or_default()
                );
            }
            println!("store: {}", settings.store_path.display());
            print_diagnostics(&session);
        }
        Commands::Reset { paths, json } => {
            let docs = load_documents(&paths)?;
            let store = JsonFileStore::open(&settings.store_path);
            let mut session = Session::open(fragments(&docs), store, settings);
            session.reset();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "reset",
                    "store": settings.store_path.display().to_string(),
                    "config": session.config()
                })));
            }
            print_fields(&serde_json::to_value(session.config())?);
            println!("store: {}", settings.store_path.display());
        }
        Commands::Clear { json } => {
            let mut store = SafeStore::new(JsonFileStore::open(&settings.store_path));
            migrate::clear(&mut store, &KeySpace::new(settings.key_prefix.clone()));
            let remaining = store.inner().entries().len();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "clear",
                    "store": settings.store_path.display().to_string(),
                    "remaining_keys": remaining
                })));
            }
            println!("cleared: {}", settings.store_path.display());
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{}",
            concat!(
                r#"{"ok":false,"error":{"code":"serialization_error","#,
                r#""message":"failed to serialize JSON payload","details":{}}}"#
            )
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Defaults { json, .. }
        | Commands::Derive { json, .. }
        | Commands::Render { json, .. }
        | Commands::Set { json, .. }
        | Commands::Reset { json, .. }
        | Commands::Clear { json } => *json,
    }
}

fn parse_set_bindings(values: &[String]) -> Result<Vec<(Field, String)>> {
    let mut out = Vec::new();
    for raw in values {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --set '{}': expected k=v", raw))?;
        if key.trim().is_empty() {
            return Err(anyhow!("invalid --set '{}': key cannot be empty", raw));
        }
        let field = key
            .parse::<Field>()
            .with_context(|| format!("invalid --set '{}'", raw))?;
        out.push((field, value.to_string()));
    }
    Ok(out)
}

fn apply_edits<S: KvStore>(session: &mut Session<S>, edits: &[(Field, String)]) -> Vec<Value> {
    edits
        .iter()
        .map(|(field, value)| {
            let outcome = session.edit(*field, value);
            if outcome == EditOutcome::Rejected {
                warn!(?field, value = %value, "edit rejected");
            }
            json!({ "field": field, "value": value, "outcome": outcome })
        })
        .collect()
}

/// Saved values without write access: preview commands must not persist.
fn preview_store(settings: &Settings) -> MemoryStore {
    let saved = JsonFileStore::open(&settings.store_path);
    MemoryStore::with_entries(saved.entries().clone())
}

struct Document {
    path: PathBuf,
    /// Path under the input argument it was found through.
    relative: PathBuf,
    text: String,
    spans: Vec<Span>,
}

fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for root in paths {
        if root.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = entry.with_context(|| format!("walking {}", root.display()))?;
                let is_md = entry.path().extension().map_or(false, |e| e == "md");
                if entry.file_type().is_file() && is_md {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            for path in found {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                docs.push(read_document(path, relative)?);
            }
        } else {
            let relative = root
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("not a file: {}", root.display()))?;
            docs.push(read_document(root.clone(), relative)?);
        }
    }
    debug!(documents = docs.len(), "loaded documents");
    Ok(docs)
}

fn read_document(path: PathBuf, relative: PathBuf) -> Result<Document> {
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let spans = find_spans(&text);
    Ok(Document {
        path,
        relative,
        text,
        spans,
    })
}

fn fragment_id(doc: &Document, n: usize) -> FragmentId {
    FragmentId(format!("{}#{}", doc.path.display(), n))
}

fn fragments(docs: &[Document]) -> Vec<(FragmentId, String)> {
    docs.iter()
        .flat_map(|doc| {
            doc.spans
                .iter()
                .enumerate()
                .map(move |(n, span)| {
                    (fragment_id(doc, n), doc.text[span.range.clone()].to_string())
                })
        })
        .collect()
}

fn render_document<S: KvStore>(doc: &Document, session: &Session<S>) -> String {
    let rendered: Vec<String> = (0..doc.spans.len())
        .map(|n| {
            let id = fragment_id(doc, n);
            session
                .rendered(&id)
                .map(str::to_string)
                .unwrap_or_else(|| doc.text[doc.spans[n].range.clone()].to_string())
        })
        .collect();
    splice(&doc.text, &doc.spans, &rendered)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn print_fields(value: &Value) {
    if let Some(map) = value.as_object() {
        for (key, v) in map {
            match v {
                Value::String(s) => println!("{}: {}", key, s),
                Value::Null => println!("{}:", key),
                other => println!("{}: {}", key, other),
            }
        }
    }
}

fn print_diagnostics<S: KvStore>(session: &Session<S>) {
    for d in session.diagnostics() {
        eprintln!("warning: {}", d);
    }
}
