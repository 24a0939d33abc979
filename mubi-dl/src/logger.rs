use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record};

static LOGGER: Logger = Logger;

/// Colored level labels on stderr, stdout is left for command output.
pub struct Logger;

impl Logger {
    /// Install the logger once per process.
    pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
    }

    /// `Info` by default, each `-v` raises it one step, `--quiet` keeps errors only.
    pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::Error;
        }

        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
            && (metadata.target().starts_with("mubi_dl") || metadata.level() <= Level::Warn)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match log::max_level() {
                LevelFilter::Off => (),
                LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => {
                    match record.level() {
                        Level::Info => {
                            eprintln!("{}", record.args());
                        }
                        _ => {
                            eprintln!("{} {}", label(record.level()), record.args());
                        }
                    }
                }
                LevelFilter::Debug | LevelFilter::Trace => {
                    let location = match (record.file(), record.line()) {
                        (Some(file), Some(line)) => format!("[{}:{}]", file, line).dimmed(),
                        _ => "[unk]".dimmed(),
                    };

                    eprintln!(
                        "{} {} {} {}",
                        label(record.level()),
                        record.target().dimmed(),
                        location,
                        record.args()
                    );
                }
            }
        }
    }

    fn flush(&self) {}
}

fn label(level: Level) -> ColoredString {
    match level {
        Level::Debug => "[DEBUG]".bold().blue(),
        Level::Error => "[ERROR]".bold().red(),
        Level::Info => "[INFO]".bold().green(),
        Level::Trace => "[TRACE]".bold().purple(),
        Level::Warn => "[WARN]".bold().yellow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(Logger::level(0, false), LevelFilter::Info);
        assert_eq!(Logger::level(1, false), LevelFilter::Debug);
        assert_eq!(Logger::level(4, false), LevelFilter::Trace);
        assert_eq!(Logger::level(2, true), LevelFilter::Error);
    }
}
