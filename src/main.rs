use std::path::PathBuf;
use std::process::ExitCode;

use lightbox_tui::app::{self, RunOptions};

enum Command {
    Run(RunOptions),
    PrintLink(RunOptions, String),
    Exit,
}

fn main() -> ExitCode {
    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}\n\nRun with --help for usage.");
            return ExitCode::from(2);
        }
    };

    let result = match command {
        Command::Exit => return ExitCode::SUCCESS,
        Command::PrintLink(opts, raw) => print_link(&opts, &raw),
        Command::Run(opts) => app::run(opts),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut opts = RunOptions::default();
    let mut link = None;
    let mut args = args;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .filter(|value| !value.starts_with("--"))
                .ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Lightbox-TUI {}", lightbox_tui::VERSION);
                return Ok(Command::Exit);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(Command::Exit);
            }
            "--config" => opts.config_file = Some(PathBuf::from(value("--config")?)),
            "--catalog" => opts.catalog = Some(PathBuf::from(value("--catalog")?)),
            "--open" => opts.open_link = Some(value("--open")?),
            "--link" => link = Some(value("--link")?),
            other => return Err(format!("unknown argument {other}")),
        }
    }

    Ok(match link {
        Some(raw) => Command::PrintLink(opts, raw),
        None => Command::Run(opts),
    })
}

fn print_link(opts: &RunOptions, raw: &str) -> anyhow::Result<()> {
    let item_id = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("--link expects a numeric item id, got {raw:?}"))?;
    println!("{}", app::share_link(opts, item_id)?);
    Ok(())
}

fn print_help() {
    let config = lightbox_tui::config::default_path()
        .map(|path| app::friendly_path(&path))
        .unwrap_or_else(|| "~/.config/lightbox-tui/config.yaml".to_string());
    println!(
        "Lightbox-TUI - Browse, like and discuss a photo catalog from the terminal.

Usage: lightbox-tui [--catalog <path>] [--open <link>]

  --catalog <path>     Manifest (YAML) or directory of images
  --open <link>        Open a shared link (or item id) on launch
  --link <id>          Print the share link for an item and exit
  --config <path>      Config file (default {config})
  --version, -V        Show version and exit
  --help,    -h        Show this help message

Logs go to the cache directory; set LIGHTBOX_LOG to change the filter."
    );
}
