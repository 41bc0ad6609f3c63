//! Hook the `log` macros up to the Martian `_log` file.

use std::fs::File;
use std::io::{self, Write};

use chrono::Local;
use env_logger::{Builder, Target, WriteStyle};
use log::LevelFilter;

/// Copies every log line to the log file and, optionally, stdout.
struct LogTee {
    file: File,
    stdout: bool,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.stdout {
            io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.stdout {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Install the global logger. Lines look like
/// `[2024-01-31 12:00:00][INFO] message`.
///
/// Only the first call in a process takes effect; later calls are ignored.
pub fn setup_logging(log_file: File, level: LevelFilter, to_stdout: bool) {
    let _ = Builder::new()
        .filter_level(level)
        .write_style(WriteStyle::Never)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(LogTee {
            file: log_file,
            stdout: to_stdout,
        })))
        .try_init();
}
