//! Calmline daemon entrypoint.
//!
//! Owns the only [`DistressEngine`] and serves it over a Unix socket:
//! one newline-delimited JSON request per connection, one thread per
//! connection, and a background thread that sweeps idle sessions.

use fs_err as fs;
use std::env;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use calmline_core::{load_config, DistressEngine};
use calmline_protocol::{codes, ErrorInfo, Request, Response, MAX_REQUEST_BYTES};

mod handlers;

const SOCKET_DIR: &str = ".calmline";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT: Duration = Duration::from_secs(2);

fn main() {
    init_logging();

    let config = match load_config(None) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    let sweep_interval = Duration::from_secs(config.daemon.sweep_interval_seconds);

    let engine = match DistressEngine::new(config) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!(error = %err, "Failed to initialize engine");
            std::process::exit(1);
        }
    };

    let (socket_path, listener) = match daemon_socket_path().and_then(|path| {
        let listener = bind_socket(&path)?;
        Ok((path, listener))
    }) {
        Ok(bound) => bound,
        Err(err) => {
            error!(error = %err, "Failed to open daemon socket");
            std::process::exit(1);
        }
    };

    let detector = &engine.config().detector;
    info!(
        path = %socket_path.display(),
        confirmation_window = detector.confirmation_window,
        enable_audio = detector.enable_audio,
        generator = engine.generator_name(),
        "Calmline daemon started"
    );

    spawn_idle_sweeper(Arc::clone(&engine), sweep_interval);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || serve_connection(stream, &engine));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn spawn_idle_sweeper(engine: Arc<DistressEngine>, interval: Duration) {
    thread::spawn(move || loop {
        thread::sleep(interval);
        engine.sweep_idle(chrono::Utc::now());
    });
}

/// `CALMLINE_DEBUG_LOG` forces debug output; otherwise `RUST_LOG` applies, defaulting to info.
fn init_logging() {
    let forced_debug = env::var("CALMLINE_DEBUG_LOG")
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let filter = if forced_debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(SOCKET_DIR).join(SOCKET_NAME))
}

/// Binds the socket, replacing one left behind by a previous run.
fn bind_socket(path: &Path) -> Result<UnixListener, String> {
    let dir = path
        .parent()
        .ok_or_else(|| format!("Socket path {} has no parent", path.display()))?;
    fs::create_dir_all(dir).map_err(|err| err.to_string())?;

    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale socket"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.to_string()),
    }

    UnixListener::bind(path).map_err(|err| format!("bind {}: {}", path.display(), err))
}

fn serve_connection(mut stream: UnixStream, engine: &DistressEngine) {
    let response = match read_request(&stream) {
        Ok(request) => {
            debug!(method = ?request.method, id = ?request.id, "Daemon request received");
            handlers::handle_request(request, engine)
        }
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Rejected daemon request");
            Response::error_with_info(None, err)
        }
    };

    if let Err(err) = send_response(&mut stream, &response) {
        debug!(error = %err, "Client went away before the response was written");
    }
}

/// Reads one newline-terminated JSON request of at most [`MAX_REQUEST_BYTES`].
fn read_request(stream: &UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

    let mut reader = BufReader::new(stream.take(MAX_REQUEST_BYTES as u64 + 1));
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).map_err(|err| match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            ErrorInfo::new(codes::READ_TIMEOUT, "request timed out")
        }
        _ => ErrorInfo::new("read_error", format!("failed to read request: {}", err)),
    })?;

    if line.len() > MAX_REQUEST_BYTES {
        return Err(ErrorInfo::new(
            codes::REQUEST_TOO_LARGE,
            format!("request exceeded {} bytes", MAX_REQUEST_BYTES),
        ));
    }
    if reader.buffer().iter().any(|b| !b.is_ascii_whitespace()) {
        warn!("Ignoring bytes after the first request line");
    }

    let body = trim_whitespace(&line);
    if body.is_empty() {
        return Err(ErrorInfo::new(codes::INVALID_JSON, "request body was empty"));
    }
    serde_json::from_slice(body).map_err(|err| {
        ErrorInfo::new(
            codes::INVALID_JSON,
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |index| index + 1);
    &bytes[start..end]
}

fn send_response(stream: &mut UnixStream, response: &Response) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    stream.write_all(&payload)
}
