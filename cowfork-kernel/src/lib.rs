pub mod file;
pub mod fork;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod testing;

use logging::Logger;

pub use kernel::{Kernel, KernelConfig, KernelError};

static LOGGER: Logger = Logger;

/// Install the console logger at debug level.
pub fn init() -> Result<(), log::SetLoggerError> {
    LOGGER.init();
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Debug);
    Ok(())
}
