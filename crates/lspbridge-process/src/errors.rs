//! Launch failures.

use std::io;

/// The child process could not be started.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The executable does not exist or is not on `PATH`.
    #[error("executable not found: {program}")]
    NotFound {
        /// Program that was requested.
        program: String,
    },

    /// The OS refused to spawn the process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was requested.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Classify a spawn error for `program`.
    pub fn from_io(program: impl Into<String>, source: io::Error) -> Self {
        let program = program.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { program }
        } else {
            Self::Spawn { program, source }
        }
    }
}
