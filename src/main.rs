use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use futures_util::StreamExt;
use simplelog::{ConfigBuilder, WriteLogger};

use sterm_x_lib::serial::SystemBackend;
use sterm_x_lib::{
    list_ports, list_serial_ports, DisplaySurface, SettingsStore, TerminalConfig, TerminalSession,
};

const QUIT_HINT: &str = "Ctrl+]";

#[derive(Parser, Debug)]
#[command(name = "sterm-x", version, about = "Interactive serial terminal")]
struct Args {
    /// List serial ports and exit
    #[arg(long)]
    list: bool,

    /// With --list, include every port kind
    #[arg(long, requires = "list")]
    all: bool,

    /// Port to open, overriding the stored settings
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overriding the stored settings
    #[arg(short, long)]
    baud: Option<u32>,

    /// Port settings file (key=value)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Terminal behaviour config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "sterm-x.log")]
    log_file: PathBuf,
}

/// Writes flushed text straight to the console
struct StdoutSurface;

impl DisplaySurface for StdoutSurface {
    fn append_text(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes()).and_then(|_| out.flush());
    }

    fn delete_previous_char(&self) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(b"\x08 \x08").and_then(|_| out.flush());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TerminalConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TerminalConfig::default(),
    };
    init_logging(&args, &config)?;

    if args.list {
        return print_ports(args.all);
    }

    let store = SettingsStore::new(args.settings.clone().unwrap_or_else(SettingsStore::default_path));
    let mut settings = store
        .load_settings()
        .with_context(|| format!("Failed to read port settings {}", store.path().display()))?;
    if let Some(port) = &args.port {
        settings.port_name = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }

    log::info!("sterm-x started");
    let backend = Arc::new(SystemBackend::new(config.read_timeout()));
    let session = TerminalSession::new(backend, Arc::new(StdoutSurface), settings, &config);

    session
        .open()
        .with_context(|| format!("Failed to open {}", session.settings().port_name))?;
    println!("{}", session.settings());
    println!("Connected. Press {} to quit.", QUIT_HINT);

    terminal::enable_raw_mode().context("Failed to enter raw mode")?;
    let result = run(&session).await;
    if let Err(e) = terminal::disable_raw_mode() {
        log::warn!("Failed to restore terminal mode: {}", e);
    }

    let closed = session.shutdown(Some(&store)).await;
    println!();
    result?;
    closed.context("Failed to shut down cleanly")
}

fn init_logging(args: &Args, config: &TerminalConfig) -> Result<()> {
    let file = File::create(&args.log_file)
        .with_context(|| format!("Failed to create log file {}", args.log_file.display()))?;
    WriteLogger::init(config.log_level(), ConfigBuilder::new().build(), file)
        .context("Failed to initialize logger")
}

fn print_ports(all: bool) -> Result<()> {
    let ports = if all { list_ports() } else { list_serial_ports() }.context("Failed to list ports")?;
    if ports.is_empty() {
        println!("No ports found");
    }
    for port in ports {
        match &port.product {
            Some(product) => println!("{} - {} ({})", port.name, port.kind, product),
            None => println!("{} - {}", port.name, port.kind),
        }
    }
    Ok(())
}

/// Keyboard loop: forward keys to the port until quit or the port disappears.
async fn run(session: &TerminalSession) -> Result<()> {
    let mut events = EventStream::new();

    while let Some(event) = events.next().await {
        let Event::Key(key) = event.context("Failed to read keyboard")? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        if is_quit(&key) {
            log::info!("Quit requested");
            break;
        }

        for byte in key_bytes(&key) {
            if let Err(e) = session.key_typed(byte) {
                if !session.is_open() {
                    anyhow::bail!("Port closed: {}", e);
                }
                log::warn!("Failed to send 0x{:02X}: {}", byte, e);
            }
        }
    }

    Ok(())
}

fn is_quit(key: &KeyEvent) -> bool {
    // Unix terminals report the raw 0x1D byte as Ctrl+5
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
}

/// Bytes a key press puts on the wire
fn key_bytes(key: &KeyEvent) -> Vec<u8> {
    match key.code {
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![8],
        KeyCode::Tab => vec![9],
        KeyCode::Esc => vec![27],
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
            vec![(c.to_ascii_lowercase() as u8) - b'a' + 1]
        }
        KeyCode::Char(c) => match u8::try_from(u32::from(c)) {
            Ok(byte) => vec![byte],
            Err(_) => c.to_string().into_bytes(),
        },
        _ => Vec::new(),
    }
}
