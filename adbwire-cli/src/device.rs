//! Device commands: shell, exec, ls, push, pull.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use adbwire::{DEFAULT_MODE, Device, RemoteFileEntry};
use anyhow::{Context, Result};
use colored::Colorize;

use crate::OutputFormat;

/// Arguments for `adbwire shell` and `adbwire exec`.
///
/// Arguments are passed through verbatim; quote them for the device shell.
#[derive(clap::Args)]
#[command(trailing_var_arg = true)]
pub struct CommandArgs {
    /// Command and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for `adbwire ls`.
#[derive(clap::Args)]
pub struct LsArgs {
    /// Remote directory.
    #[arg(default_value = "/")]
    pub path: String,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `adbwire push`.
#[derive(clap::Args)]
pub struct PushArgs {
    /// Local file.
    pub local: PathBuf,

    /// Remote destination path.
    pub remote: String,

    /// Octal mode for the remote file (default: 664, mtime kept).
    #[arg(long, value_parser = parse_octal)]
    pub mode: Option<u32>,
}

/// Arguments for `adbwire pull`.
#[derive(clap::Args)]
pub struct PullArgs {
    /// Remote file.
    pub remote: String,

    /// Local destination (default: the remote file name).
    pub local: Option<PathBuf>,
}

pub fn shell(device: &Device, args: &CommandArgs) -> Result<()> {
    let (cmd, rest) = split(args)?;
    let output = device
        .execute_shell(cmd, &rest)
        .with_context(|| format!("shell on {device}"))?;
    copy_to_stdout(output)
}

pub fn exec(device: &Device, args: &CommandArgs) -> Result<()> {
    let (cmd, rest) = split(args)?;
    let output = device
        .execute(cmd, &rest)
        .with_context(|| format!("exec on {device}"))?;
    copy_to_stdout(output)
}

pub fn ls(device: &Device, args: &LsArgs) -> Result<()> {
    let entries = device
        .list(&args.path)
        .with_context(|| format!("listing {} on {device}", args.path))?;

    if matches!(args.format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{:>7o} {:>10} {:>10}  {}",
            entry.mode(),
            entry.size(),
            entry.last_modified(),
            styled_name(entry)
        );
    }
    Ok(())
}

pub fn push(device: &Device, args: &PushArgs) -> Result<()> {
    let sent = match args.mode {
        None => device.push_file(&args.local, &args.remote),
        Some(mode) => {
            let file = std::fs::File::open(&args.local)
                .with_context(|| format!("opening {}", args.local.display()))?;
            let mtime = file
                .metadata()?
                .modified()?
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX));
            device.push(&mut io::BufReader::new(file), mtime, mode, &args.remote)
        }
    }
    .with_context(|| format!("pushing {} to {}", args.local.display(), args.remote))?;
    eprintln!("{}: {sent} bytes", args.remote);
    Ok(())
}

pub fn pull(device: &Device, args: &PullArgs) -> Result<()> {
    let local = match &args.local {
        Some(path) => path.clone(),
        None => PathBuf::from(args.remote.rsplit('/').next().unwrap_or(&args.remote)),
    };
    let received = device
        .pull_file(&args.remote, &local)
        .with_context(|| format!("pulling {} to {}", args.remote, local.display()))?;
    eprintln!("{}: {received} bytes", local.display());
    Ok(())
}

fn split(args: &CommandArgs) -> Result<(&str, Vec<&str>)> {
    let (cmd, rest) = args.command.split_first().context("command required")?;
    Ok((cmd, rest.iter().map(String::as_str).collect()))
}

fn copy_to_stdout(mut output: impl Read) -> Result<()> {
    let mut stdout = io::stdout().lock();
    io::copy(&mut output, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

fn styled_name(entry: &RemoteFileEntry) -> String {
    if entry.is_directory() {
        format!("{}/", entry.name().blue().bold())
    } else {
        entry.name().to_owned()
    }
}

fn parse_octal(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8).map_err(|e| format!("{s:?}: {e}"))
}
