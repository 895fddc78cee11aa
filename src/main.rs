//! rawcon - raw console input demo
//!
//! Opens a console session and exercises it: single keystrokes until `q`,
//! then a line, then a password.
//!
//! ```text
//! rawcon                 # settings from ~/.rawcon/config.toml
//! rawcon -t none         # line input only
//! rawcon --no-ansi       # strip all colors
//! ```

use std::env;
use std::io::Write;

use anyhow::Context;
use rawcon::core::ansi::Color;
use rawcon::{Ansi, Config, ConsoleSession, TerminalType};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("rawcon {}", VERSION);
}

fn print_help() {
    eprintln!("rawcon {} - raw console input and portable ANSI output", VERSION);
    eprintln!();
    eprintln!("Usage: rawcon [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --terminal <TYPE>  auto, unix, windows or none");
    eprintln!("  --no-ansi              Strip all escape sequences");
    eprintln!("  --force-ansi           Emit escape sequences even when redirected");
    eprintln!("  --no-echo              Start with echo off");
    eprintln!("  --interrupt            Let Ctrl+C interrupt");
    eprintln!("  -v, --version          Show version");
    eprintln!("  -h, --help             Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.rawcon/config.toml");
    eprintln!("Log file:      ~/.rawcon/rawcon.log (level from RUST_LOG)");
}

/// Apply command line overrides on top of the loaded config
fn parse_args(mut config: Config) -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-t" | "--terminal" => {
                i += 1;
                let value = args.get(i).ok_or("Missing terminal type")?;
                config.terminal = TerminalType::parse(value)
                    .ok_or_else(|| format!("Unknown terminal type: {}", value))?;
            }
            "--no-ansi" => config.enable_ansi = false,
            "--force-ansi" => config.force_ansi = true,
            "--no-echo" => config.enable_echo = false,
            "--interrupt" => config.enable_interrupt = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn init_logging() {
    let log_path = Config::dir()
        .map(|dir| dir.join("rawcon.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("rawcon.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let config = match parse_args(Config::load()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("rawcon {} starting", VERSION);

    let session = ConsoleSession::open(config);
    let result = run(&session);
    session.close();
    result
}

/// Input starts on a fresh line, since backspace erases count columns from 1
fn prompt(label: &str) -> String {
    format!("{}:\r\n", label)
}

fn run(session: &ConsoleSession) -> anyhow::Result<()> {
    let mut out = session.stdout();

    let banner = Ansi::new()
        .bold()
        .fg(Color::Cyan)
        .text("rawcon")
        .reset()
        .text(&format!(
            " {} terminal, {}x{}\r\n",
            session.kind(),
            session.width(),
            session.height()
        ));
    write!(out, "{banner}").context("writing banner")?;

    let hint = Ansi::new().fg(Color::Yellow).text("Press keys, q to stop").reset().text("\r\n");
    write!(out, "{hint}")?;
    out.flush()?;

    while let Some(ch) = session.read_char() {
        if ch == 'q' {
            break;
        }
        let code = Ansi::new()
            .fg_bright(Color::Green)
            .text(&format!("U+{:04X}", ch as u32))
            .reset()
            .text("\r\n");
        write!(out, "{code}")?;
        out.flush()?;
    }

    write!(out, "\r\n{}", prompt("Line"))?;
    out.flush()?;
    let line = session.read_line_string().unwrap_or_default();
    write!(out, "{} characters\r\n", line.chars().count())?;

    write!(out, "{}", prompt("Password"))?;
    out.flush()?;
    let password = session.read_password();
    write!(out, "\r\n{} characters\r\n", password.len())?;

    out.close().context("closing output")?;
    info!("rawcon finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_leaves_input_line_empty() {
        let text = prompt("Line");
        assert_eq!(text, "Line:\r\n");
    }
}
