//! Description of the process to launch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Program, arguments and environment for the child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory; inherits the bridge's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables, added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    /// Spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Spec for a language server at `server_path`.
    ///
    /// With a non-empty `command` the server path is appended to
    /// `command args...` (e.g. `java -Xmx2G -jar <path>`); with an empty
    /// `command` the server path is executed directly.
    pub fn for_server(command: &str, args: &[String], server_path: &Path) -> Self {
        let server = server_path.to_string_lossy().into_owned();
        let command = command.trim();
        if command.is_empty() {
            return Self::new(server);
        }
        Self::new(command).with_args(args.iter().cloned()).with_arg(server)
    }

    /// Append one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Space-joined command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> Vec<String> {
        vec!["-Xmx2G".into(), "-jar".into()]
    }

    #[test]
    fn for_server_wraps_with_command() {
        let spec = ProcessSpec::for_server("java", &default_args(), Path::new("/opt/ls.jar"));
        assert_eq!(spec.program, "java");
        assert_eq!(spec.args, vec!["-Xmx2G", "-jar", "/opt/ls.jar"]);
        assert_eq!(spec.command_line(), "java -Xmx2G -jar /opt/ls.jar");
    }

    #[test]
    fn for_server_runs_directly_with_empty_command() {
        let spec = ProcessSpec::for_server("  ", &default_args(), Path::new("/usr/bin/pyls"));
        assert_eq!(spec.program, "/usr/bin/pyls");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn builder_accumulates() {
        let spec = ProcessSpec::new("node")
            .with_arg("server.js")
            .with_args(["--stdio"])
            .with_env("NODE_ENV", "production")
            .with_working_dir("/srv");
        assert_eq!(spec.args, vec!["server.js", "--stdio"]);
        assert_eq!(spec.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert_eq!(spec.working_dir, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn command_line_without_args_is_program() {
        assert_eq!(ProcessSpec::new("cat").command_line(), "cat");
    }
}
