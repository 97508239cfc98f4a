//! # ParsDB Shell
//!
//! A small interactive shell over one database file.
//!
//! ## Usage
//!
//! ```bash
//! parsdb ./my.db
//! ```
//!
//! Commands:
//!
//! ```text
//! set <key> <value>   store a value (the value may contain spaces)
//! get <key>           print the value or report absence
//! del <key>           delete, reporting whether the key was present
//! help                show this list
//! quit                exit (also Ctrl+D)
//! ```
//!
//! Errors are printed and the loop continues; only I/O failures at open
//! terminate the process.

use std::env;
use std::process;

use eyre::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use parsdb::Kv;

const PROMPT: &str = "parsdb> ";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("--help") | Some("-h") => {
            print_usage(&args[0]);
            return Ok(());
        }
        Some("--version") | Some("-v") => {
            println!("parsdb {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(_) => {}
    }

    let mut kv = Kv::open(&args[1])?;
    println!("Opened {}. Type 'help' for commands.", kv.path().display());

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if !dispatch(&mut kv, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    kv.close();
    Ok(())
}

/// Executes one command line. Returns false when the shell should exit.
fn dispatch(kv: &mut Kv, line: &str) -> bool {
    let mut parts = line.splitn(3, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default();

    match cmd {
        "set" => match (parts.next(), parts.next()) {
            (Some(key), Some(val)) => match kv.set(key.as_bytes(), val.as_bytes()) {
                Ok(()) => println!("ok"),
                Err(e) => eprintln!("set failed: {e:#}"),
            },
            _ => eprintln!("usage: set <key> <value>"),
        },
        "get" => match parts.next() {
            Some(key) => match kv.get(key.as_bytes()) {
                Ok(Some(val)) => println!("{}", String::from_utf8_lossy(&val)),
                Ok(None) => println!("(not found)"),
                Err(e) => eprintln!("get failed: {e:#}"),
            },
            None => eprintln!("usage: get <key>"),
        },
        "del" => match parts.next() {
            Some(key) => match kv.del(key.as_bytes()) {
                Ok(deleted) => println!("{deleted}"),
                Err(e) => eprintln!("del failed: {e:#}"),
            },
            None => eprintln!("usage: del <key>"),
        },
        "help" => {
            println!("commands: set <key> <value> | get <key> | del <key> | help | quit");
        }
        "quit" | "exit" => return false,
        other => eprintln!("unknown command '{other}', try 'help'"),
    }
    true
}

fn print_usage(program: &str) {
    println!("Usage: {program} <database-file>");
    println!();
    println!("Opens (creating if missing) a ParsDB database and starts a shell.");
}
