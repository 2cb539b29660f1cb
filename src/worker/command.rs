//! Script launch commands.
//!
//! Run requests name a script and optionally its parameters in a single
//! field, `"worker.js|--flag val"`. This module splits that field and
//! builds the process command for it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use crate::protocol::PARAMETER_SEPARATOR;
use crate::worker::SpawnError;

/// Matches one parameter: a double-quoted group or a run of non-space text.
fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]*)"|([^\s"]+)"#).expect("valid parameter regex"))
}

/// Split a run request into script name and raw parameter text.
#[must_use]
pub fn split_run_request(request: &str) -> (&str, Option<&str>) {
    match request.split_once(PARAMETER_SEPARATOR) {
        Some((name, params)) => (name.trim(), Some(params)),
        None => (request.trim(), None),
    }
}

/// Split raw parameter text into arguments.
///
/// Whitespace separates arguments; double quotes group words.
#[must_use]
pub fn parse_parameters(raw: &str) -> Vec<String> {
    parameter_pattern()
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Everything needed to launch one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    script_name: String,
    script_path: PathBuf,
    parameters: Vec<String>,
    interpreter: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl ScriptCommand {
    /// Create a command for `script_path` with no parameters.
    #[must_use]
    pub fn new(script_name: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_name: script_name.into(),
            script_path: script_path.into(),
            parameters: Vec::new(),
            interpreter: None,
            working_dir: None,
        }
    }

    /// Parse a `"name[|parameters]"` run request relative to `base_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::EmptyName`] if no script is named.
    pub fn parse(request: &str, base_path: &Path) -> Result<Self, SpawnError> {
        let (name, params) = split_run_request(request);
        if name.is_empty() {
            return Err(SpawnError::EmptyName);
        }

        let parameters = params.map(parse_parameters).unwrap_or_default();
        Ok(Self::new(name, base_path.join(name)).parameters(parameters))
    }

    /// Set the launch parameters.
    #[must_use]
    pub fn parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Run the script through an interpreter.
    #[must_use]
    pub fn interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set the working directory for the worker.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    #[must_use]
    pub fn launch_parameters(&self) -> &[String] {
        &self.parameters
    }

    /// The executable that is actually spawned.
    #[must_use]
    pub fn program(&self) -> &Path {
        self.interpreter.as_deref().unwrap_or(&self.script_path)
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.parameters.len() + 1);
        if self.interpreter.is_some() {
            args.push(self.script_path.to_string_lossy().into_owned());
        }
        args.extend(self.parameters.iter().cloned());
        args
    }

    /// Shell-style rendering for log lines.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program().to_string_lossy().into_owned())
            .chain(self.build_args())
            .map(|part| shell_escape::escape(part.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build a process command with captured output streams.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_parameters() {
        assert_eq!(split_run_request("child.js"), ("child.js", None));
        let cmd = ScriptCommand::parse("child.js", Path::new("/scripts")).unwrap();
        assert_eq!(cmd.script_name(), "child.js");
        assert_eq!(cmd.script_path(), Path::new("/scripts/child.js"));
        assert!(cmd.launch_parameters().is_empty());
    }

    #[test]
    fn request_with_parameters() {
        let cmd = ScriptCommand::parse("worker.js|--flag val", Path::new("/scripts")).unwrap();
        assert_eq!(cmd.script_name(), "worker.js");
        assert_eq!(cmd.launch_parameters(), ["--flag", "val"]);
        assert_eq!(cmd.build_args(), vec!["--flag", "val"]);
    }

    #[test]
    fn quoted_parameters_stay_together() {
        assert_eq!(
            parse_parameters(r#"--name "two words" -v"#),
            vec!["--name", "two words", "-v"]
        );
        assert_eq!(parse_parameters("   "), Vec::<String>::new());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = ScriptCommand::parse("|--flag", Path::new("/scripts")).unwrap_err();
        assert!(matches!(err, SpawnError::EmptyName));
    }

    #[test]
    fn interpreter_receives_script_path_first() {
        let cmd = ScriptCommand::parse("child.js|a b", Path::new("/scripts"))
            .unwrap()
            .interpreter(Some(PathBuf::from("node")));
        assert_eq!(cmd.program(), Path::new("node"));
        assert_eq!(cmd.build_args(), vec!["/scripts/child.js", "a", "b"]);
    }

    #[test]
    fn display_escapes_arguments() {
        let cmd = ScriptCommand::new("a.sh", "/scripts/a.sh")
            .parameters(vec!["two words".to_string()]);
        assert_eq!(cmd.display(), "/scripts/a.sh 'two words'");
    }
}
