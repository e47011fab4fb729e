//! Logging and fatal-error escalation used by every other module.
//!
//! Grounded on the hosting-environment abstraction the original engine threads through
//! its database and document layers: a narrow seam callers can substitute in tests
//! instead of letting the engine talk to global logging state or abort the test process.

use log::Level;

/// Sink for diagnostic logging and unrecoverable-error escalation.
///
/// The default implementation forwards to the `log` crate. Tests substitute
/// [`RecordingEnvironment`] so a fatal escalation can be asserted on rather than
/// aborting the process.
pub trait HostingEnvironment: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);

    fn is_log_level_active(&self, level: Level) -> bool {
        log::log_enabled!(level)
    }

    /// Reports an unrecoverable internal-invariant breach and terminates the process.
    ///
    /// Implementations must not return.
    fn report_fatal_error_and_exit(&self, message: &str) -> ! {
        self.log(Level::Error, "imgdoc", message);
        std::process::abort();
    }
}

/// Forwards to the `log` crate's global logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEnvironment;

impl HostingEnvironment for DefaultEnvironment {
    fn log(&self, level: Level, target: &str, message: &str) {
        log::log!(target: "imgdoc", level, "[{target}] {message}");
    }

    fn is_log_level_active(&self, level: Level) -> bool {
        log::log_enabled!(level)
    }
}

#[cfg(test)]
pub use test_support::RecordingEnvironment;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Test double that records log lines and panics (rather than aborting) on
    /// fatal escalation, so the failure is observable from `#[test]` functions.
    #[derive(Default)]
    pub struct RecordingEnvironment {
        pub lines: Mutex<Vec<String>>,
    }

    impl HostingEnvironment for RecordingEnvironment {
        fn log(&self, level: Level, target: &str, message: &str) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("[{level}] [{target}] {message}"));
        }

        fn report_fatal_error_and_exit(&self, message: &str) -> ! {
            self.log(Level::Error, "imgdoc", message);
            panic!("fatal error reported: {message}");
        }
    }
}
