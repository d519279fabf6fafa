use std::io::Write;

/// Console logger for the `log` facade.
pub struct Logger;

impl Logger {
    pub fn init(&self) {
        // Reset any colour state left on the terminal.
        print!("\x1b[0m");
        // A logger has nowhere to report its own write failures.
        let _ = std::io::stdout().flush();
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            println!(
                "[{}:{}] {}: {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        // `Log::flush` cannot return an error.
        let _ = std::io::stdout().flush();
    }
}
