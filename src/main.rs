use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hotkey_capture::{
    capture_single_key, pump, resolve_label, CaptureSession, Config, CursorSink,
    InsertionTarget, KeyboardInterceptor, Position, ResultSink, StdoutSink, TerminalNotifier,
    TerminalStatus, TextBuffer,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capture key combos from the keyboard and insert them as text.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    capture: CaptureArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture keys until the stop key is pressed (default)
    Capture(CaptureArgs),
    /// Choose a new stop key by pressing it
    SetStopKey {
        /// Use this key name instead of waiting for a key press
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
    },
    /// Print the config file location and current settings
    ShowConfig,
}

#[derive(Args, Debug, Clone, Default)]
struct CaptureArgs {
    /// Insert the result into this file instead of printing it
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Cursor position in FILE as LINE:COL, 1-based (default: end of file)
    #[arg(long, value_name = "LINE:COL", value_parser = parse_position, requires = "file")]
    at: Option<Position>,

    /// Stop key for this run only, e.g. "Escape", "Enter" or "F12"
    #[arg(short, long, value_name = "KEY")]
    stop_key: Option<String>,
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (line, col) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LINE:COL, got {:?}", s))?;
    let line: usize = line
        .trim()
        .parse()
        .map_err(|_| format!("invalid line {:?}", line))?;
    let col: usize = col
        .trim()
        .parse()
        .map_err(|_| format!("invalid column {:?}", col))?;
    if line == 0 || col == 0 {
        return Err("LINE and COL start at 1".to_string());
    }
    Ok(Position::new(line - 1, col - 1))
}

/// Inserts at the buffer cursor and writes the file back.
struct FileSink(CursorSink<TextBuffer>);

impl ResultSink for FileSink {
    fn deliver(&mut self, text: &str) -> Result<()> {
        self.0.deliver(text)?;
        self.0.target().save()
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn result_sink(args: &CaptureArgs) -> Result<Box<dyn ResultSink>> {
    let Some(path) = &args.file else {
        return Ok(Box::new(StdoutSink));
    };

    let mut buffer = TextBuffer::open(path)?;
    let at = args
        .at
        .unwrap_or_else(|| Position::new(usize::MAX, usize::MAX));
    buffer.set_cursor(at);
    log::debug!("Inserting into {} at {}", path.display(), buffer.cursor());
    Ok(Box::new(FileSink(CursorSink::new(buffer))))
}

fn run_capture(args: CaptureArgs, cancel: &AtomicBool) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(key) = &args.stop_key {
        config.set_stop_key(key);
    }

    let sink = result_sink(&args)?;
    let (gate, stream) = KeyboardInterceptor::open()?.start()?;
    let mut session =
        CaptureSession::new(gate, Box::new(TerminalStatus), Box::new(TerminalNotifier))
            .with_stop_key(config.stop_key);

    session.start(Some(sink))?;
    pump(&mut session, &stream, cancel)
}

fn run_set_stop_key(key: Option<String>, cancel: &AtomicBool) -> Result<()> {
    let mut config = Config::load()?;

    let name = match key {
        Some(name) => name,
        None => {
            let (mut gate, stream) = KeyboardInterceptor::open()?.start()?;
            eprintln!("Press the new stop key...");
            match capture_single_key(&mut gate, &stream, cancel)? {
                Some(event) => event.key,
                None => {
                    eprintln!("Cancelled, stop key unchanged");
                    return Ok(());
                }
            }
        }
    };

    config.set_stop_key(&name);
    let path = config.save()?;
    eprintln!(
        "Stop key set to {} ({})",
        resolve_label(&config.stop_key),
        path.display()
    );
    Ok(())
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    match Config::path() {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: (no config directory)"),
    }
    println!("stop_key: {:?}", config.stop_key);
    if !config.stop_key_reachable() {
        println!("warning: a modifier stop key can never end a capture");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_cancel = Arc::clone(&cancel);
    ctrlc::set_handler(move || handler_cancel.store(true, Ordering::SeqCst))
        .context("Failed to install signal handler")?;

    match cli.command {
        Some(Command::Capture(args)) => run_capture(args, &cancel),
        Some(Command::SetStopKey { key }) => run_set_stop_key(key, &cancel),
        Some(Command::ShowConfig) => show_config(),
        None => run_capture(cli.capture, &cancel),
    }
}
