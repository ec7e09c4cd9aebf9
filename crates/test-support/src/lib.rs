//! Shared test doubles and fixtures for the hookfs crates.

pub mod fake_fs;
pub mod fixtures;
pub mod null_file;
pub mod workspace;

pub use fake_fs::{FAKE_TIME, FakeFile, FakeFs};
pub use null_file::NullFile;
pub use workspace::TempWorkspace;

/// Route `log` output through the test harness. Safe to call from every
/// test; only the first call installs the logger.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
