//! baml CLI: BAML <-> Knotenstrom (Text/JSON).

use clap::{Args, Parser, Subcommand};
use baml::encoder::{BamlWriter, EncoderConfig};
use baml::json::{nodes_to_json, positioned_markup_from_json};
use baml::{BamlNode, DecoderOptions};
use std::io::{IsTerminal, Read, Write};
use std::process;

/// Fertige Bytes werden ab dieser Puffergröße an die Ausgabe abgegeben.
const ENCODE_FLUSH_BYTES: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "baml", about = "Binary markup (BAML) encode/decode")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode BAML into a node listing (text or JSON)
    Decode(DecodeArgs),
    /// Encode a JSON node array into BAML
    Encode(EncodeArgs),
}

#[derive(Args)]
struct IoArgs {
    /// Input file (- for stdin)
    #[arg(short, long)]
    input: String,

    /// Output file (optional; without -o auto-derived, -o - = stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct DecodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// JSON output instead of the indented listing
    #[arg(long)]
    json: bool,

    /// Degraded mode: unresolvable types become unknown tags
    #[arg(long)]
    allow_unknown: bool,

    /// Keep deferred dictionary keys out of the node stream
    #[arg(long)]
    no_keys: bool,
}

#[derive(Args)]
struct EncodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Write line/position debug records
    #[arg(long)]
    debug_info: bool,

    /// Write dictionaries inline instead of as deferred content
    #[arg(long)]
    no_defer: bool,

    /// Never encode built-in extensions in their scalar form
    #[arg(long)]
    no_optimize: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Decode(args) => run_decode(args),
        Command::Encode(args) => run_encode(args),
    }
}

fn read_input(path: &str) -> Result<Vec<u8>, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).map_err(|e| format!("Lesefehler (stdin): {e}"))?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|e| format!("Lesefehler '{path}': {e}"))
    }
}

fn run_decode(args: DecodeArgs) -> Result<(), String> {
    let data = read_input(&args.io.input)?;
    let mut options = DecoderOptions::default();
    if args.allow_unknown {
        options = options.with_allow_unknown_types();
    }
    if args.no_keys {
        options = options.without_key_expansion();
    }
    let nodes = baml::decode_with(&data, options, None).map_err(|e| format!("Decode-Fehler: {e}"))?;
    log::debug!("decoded {} nodes from {} bytes", nodes.len(), data.len());

    let text = if args.json {
        nodes_to_json(&nodes).map_err(|e| format!("Serialisierungs-Fehler: {e}"))?
    } else {
        listing(&nodes)
    };
    let ext = if args.json { "json" } else { "txt" };
    let output = resolve_output_path(args.io.output.as_deref(), &args.io.input, ext)?;
    write_to_output(&output, |mut writer| {
        writer.write_all(text.as_bytes()).map_err(|e| format!("Schreibfehler: {e}"))?;
        writer.write_all(b"\n").map_err(|e| format!("Schreibfehler: {e}"))?;
        writer.flush().map_err(|e| format!("Schreibfehler: {e}"))
    })
}

/// Eine Zeile pro Knoten, Properties eingerückt darunter.
fn listing(nodes: &[BamlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&node.to_string());
    }
    out
}

fn run_encode(args: EncodeArgs) -> Result<(), String> {
    let input = read_input(&args.io.input)?;
    let text = std::str::from_utf8(&input).map_err(|e| format!("JSON muss UTF-8 sein: {e}"))?;
    let nodes = positioned_markup_from_json(text).map_err(|e| format!("JSON-Fehler: {e}"))?;

    let mut config = EncoderConfig::default();
    if args.debug_info {
        config = config.with_debug_info();
    }
    if args.no_defer {
        config = config.without_deferral();
    }
    if args.no_optimize {
        config = config.without_extension_optimization();
    }

    let output = resolve_output_path(args.io.output.as_deref(), &args.io.input, "baml")?;
    write_to_output(&output, |mut writer| {
        let mut encoder = BamlWriter::new(config);
        for (node, line) in &nodes {
            encoder.set_line(*line);
            encoder.write_node(node).map_err(|e| format!("Encode-Fehler: {e}"))?;
            if encoder.buffered_len() >= ENCODE_FLUSH_BYTES {
                encoder.flush_to(&mut writer).map_err(|e| format!("Schreibfehler: {e}"))?;
            }
        }
        let rest = encoder.finish().map_err(|e| format!("Encode-Fehler: {e}"))?;
        writer.write_all(&rest).map_err(|e| format!("Schreibfehler: {e}"))?;
        writer.flush().map_err(|e| format!("Schreibfehler: {e}"))
    })
}

fn create_buf_writer(path: &str) -> Result<std::io::BufWriter<Box<dyn Write>>, String> {
    if path == "-" {
        Ok(std::io::BufWriter::new(Box::new(std::io::stdout())))
    } else {
        let file = std::fs::File::create(path).map_err(|e| format!("Schreibfehler: {e}"))?;
        Ok(std::io::BufWriter::new(Box::new(file)))
    }
}

/// Schreibt Output entweder nach stdout ("-") oder atomar in eine Datei (tmp+rename).
fn write_to_output(
    output_path: &str,
    write_fn: impl FnOnce(std::io::BufWriter<Box<dyn Write>>) -> Result<(), String>,
) -> Result<(), String> {
    if output_path == "-" {
        return write_fn(create_buf_writer("-")?);
    }

    let tmp_path = format!("{output_path}.tmp");
    let writer = create_buf_writer(&tmp_path)?;
    if let Err(e) = write_fn(writer) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    std::fs::rename(&tmp_path, output_path).map_err(|e| format!("Rename-Fehler: {e}"))
}

/// Leitet den Output-Pfad aus der Eingabe und der gewünschten Extension ab.
fn resolve_output_path(explicit: Option<&str>, input: &str, ext: &str) -> Result<String, String> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    if input == "-" {
        return Err("ohne -o braucht es eine Eingabedatei (nicht stdin)".into());
    }
    let path = std::path::Path::new(input);
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| "ungueltiger Eingabepfad".to_string())?;
    let parent = path.parent().unwrap_or_else(|| std::path::Path::new(""));
    Ok(parent.join(format!("{stem}.{ext}")).to_string_lossy().to_string())
}
