//! Local HTTP server for browsing SDBV data files.
//!
//! Serves a directory read-only to the viewer, one request at a time.
//! Directory listings are forbidden; every response allows anonymous GET
//! from any origin so a viewer hosted elsewhere can fetch the files.

use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use clap::Parser;
use itertools::Itertools;
use serde_json::Value;
use tiny_http::{Header, Method, Request, Response, Server};
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(
    name = "sdbv-httpserver",
    about = "Serve SDBV data files to a local viewer."
)]
struct Args {
    /// Server bind address.
    #[arg(short, long, default_value = "localhost")]
    bind: String,
    /// Server port.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
    /// Directory with files to serve.
    #[arg(default_value = ".")]
    directory: PathBuf,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    print_urls(&args.bind, args.port, &args.directory)?;
    println!();
    run(&args.bind, args.port, &args.directory)
}

fn run(bind: &str, port: u16, directory: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    let server = Server::http((bind, port))?;
    println!("** WARNING **");
    println!(
        "All files in {} directory can be read by any application running locally, including web applications.",
        directory.display()
    );
    println!();
    println!("Press CTRL+C to exit");
    println!();
    for request in server.incoming_requests() {
        handle(request, directory);
    }
    Ok(())
}

fn handle(request: Request, directory: &Path) {
    let method = request.method().clone();
    if !matches!(method, Method::Get | Method::Head) {
        respond(request, Response::empty(405));
        return;
    }
    let Some(target) = resolve_path(directory, request.url()) else {
        respond(request, Response::empty(404));
        return;
    };
    // No directory listings.
    if target.is_dir() {
        respond(request, Response::empty(403));
        return;
    }
    match File::open(&target) {
        Ok(f) => {
            let ct = Header::from_bytes(&b"Content-Type"[..], content_type(&target).as_bytes())
                .unwrap();
            if method == Method::Head {
                respond(request, Response::empty(200).with_header(ct));
            } else {
                respond(request, Response::from_file(f).with_header(ct));
            }
        }
        Err(_) => respond(request, Response::empty(404)),
    }
}

fn respond<R: Read>(request: Request, response: Response<R>) {
    let response = response
        .with_header(Header::from_bytes(&b"Access-Control-Allow-Origin"[..], &b"*"[..]).unwrap())
        .with_header(Header::from_bytes(&b"Access-Control-Allow-Methods"[..], &b"GET"[..]).unwrap());
    let _ = request.respond(response);
}

/// Maps a request URL onto a path inside the served directory. Query and
/// fragment are stripped, segments are percent-decoded, and `.`/`..`
/// never escape the root.
fn resolve_path(directory: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap();
    let decoded = urlencoding::decode(path).ok()?;
    let mut parts: Vec<&str> = vec![];
    for seg in decoded.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(seg),
        }
    }
    let mut target = directory.to_path_buf();
    target.extend(parts);
    Some(target)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Prints an index of the data files under `directory`: every `*.json`
/// (import payloads excluded) whose top level carries a `grids` key.
fn print_urls(bind: &str, port: u16, directory: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Found data files:");
    println!();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".json") || file_name.ends_with(".data.json") {
            continue;
        }
        let df: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if !is_data_file(&df) {
            continue;
        }
        let rel = path.strip_prefix(directory).unwrap_or(path);
        let url = encode_path(rel);
        match df.get("name").and_then(Value::as_str) {
            Some(name) => println!("{name} ({}): http://{bind}:{port}/{url}", rel.display()),
            None => println!("{}: http://{bind}:{port}/{url}", rel.display()),
        }
    }
    Ok(())
}

fn is_data_file(doc: &Value) -> bool {
    doc.as_object().is_some_and(|obj| obj.contains_key("grids"))
}

// Percent-encodes each segment, keeping the separators.
fn encode_path(rel: &Path) -> String {
    rel.iter()
        .map(|seg| urlencoding::encode(&seg.to_string_lossy()).into_owned())
        .join("/")
}
