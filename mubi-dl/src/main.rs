use clap::{ColorChoice, Parser};
use kdam::{term, term::Colorizer};
use mubi_dl::{Args, Logger};
use requestty::symbols;
use std::{
    io::{IsTerminal, stderr},
    process,
};

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let colors = match args.color {
        ColorChoice::Always => true,
        ColorChoice::Auto => stderr().is_terminal(),
        ColorChoice::Never => false,
    };
    term::init(colors);
    colored::control::set_override(colors);

    Logger::init(Logger::level(args.verbose, args.quiet))?;
    args.command.execute()
}

fn main() {
    let mut symbols = symbols::UNICODE;
    symbols.completed = '•';
    symbols.cross = 'x';
    symbols::set(symbols);

    if let Err(e) = run() {
        eprintln!("{}: {}", "error".colorize("bold red"), e);
        process::exit(1);
    }
}
