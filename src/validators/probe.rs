// ABOUTME: Filesystem probe post-validator ("creates")
// Runs a one-shot test command in the container that prints OK or KO

use super::{ValidatorContext, ValidatorError};
use crate::docker::TtyLog;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

const PROBE_OK: &str = "OK";
const PROBE_KO: &str = "KO";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CreatesOptions {
    File {
        path: String,
        #[serde(rename = "minLength")]
        min_length: Option<u64>,
        #[serde(rename = "maxLength")]
        max_length: Option<u64>,
    },
    Directory {
        path: String,
    },
    Absent {
        path: String,
    },
}

impl CreatesOptions {
    pub fn path(&self) -> &str {
        match self {
            CreatesOptions::File { path, .. }
            | CreatesOptions::Directory { path }
            | CreatesOptions::Absent { path } => path,
        }
    }

    fn test_flag(&self) -> &'static str {
        match self {
            CreatesOptions::File { .. } => "-f",
            CreatesOptions::Directory { .. } => "-d",
            CreatesOptions::Absent { .. } => "! -e",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatesValidator {
    options: CreatesOptions,
    context: Option<ValidatorContext>,
}

impl CreatesValidator {
    pub fn new(options: CreatesOptions, context: Option<ValidatorContext>) -> Self {
        Self { options, context }
    }

    pub fn options(&self) -> &CreatesOptions {
        &self.options
    }

    /// The probe command, with a relative path resolved against `workdir`.
    pub fn command(&self, workdir: &str) -> String {
        let path = resolve_path(workdir, self.options.path());
        let path = shell_escape::unix::escape(Cow::from(path));

        let mut command = format!("[[ {} {} ]]", self.options.test_flag(), path);
        if let CreatesOptions::File {
            min_length,
            max_length,
            ..
        } = &self.options
        {
            if let Some(min) = min_length {
                command.push_str(&format!(" && [[ $(stat -c%s {}) -ge {} ]]", path, min));
            }
            if let Some(max) = max_length {
                command.push_str(&format!(" && [[ $(stat -c%s {}) -le {} ]]", path, max));
            }
        }
        command.push_str(&format!(" && echo '{}' || echo '{}'", PROBE_OK, PROBE_KO));
        command
    }

    pub async fn validate(&self, ttylog: &TtyLog) -> Result<bool, ValidatorError> {
        let context = self.context.as_ref().ok_or(ValidatorError::MissingContext("creates"))?;
        let command = self.command(&ttylog.workdir);

        let output = context
            .runtime
            .exec(&context.tutorial_id, &command)
            .await?
            .collect()
            .await;

        if !output.stderr.is_empty() {
            warn!("Probe '{}' wrote to stderr: {}", command, output.stderr.trim());
            return Err(ValidatorError::ExecError(output.stderr.trim().to_string()));
        }

        match output.stdout.trim() {
            PROBE_OK => Ok(true),
            PROBE_KO => {
                debug!("Probe '{}' not satisfied", command);
                Ok(false)
            }
            other => Err(ValidatorError::UnexpectedOutput(other.to_string())),
        }
    }
}

/// Join `path` to `workdir` unless it is absolute.
pub fn resolve_path(workdir: &str, path: &str) -> String {
    if path.starts_with('/') || workdir.is_empty() {
        return path.to_string();
    }
    Path::new(workdir).join(path).to_string_lossy().into_owned()
}
