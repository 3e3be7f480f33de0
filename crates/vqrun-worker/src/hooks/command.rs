//! Arbitrary measurement program.
//!
//! The command line is a whitespace-separated template. Placeholders are
//! replaced per job: `{ref}`, `{dis}`, `{width}`, `{height}`, `{pix_fmt}`,
//! `{log}`, plus one `{key}` per option. The program's stdout is appended to
//! the log and read back as `name=value` lines.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use vqrun_media::run_tool;
use vqrun_models::Scores;

use super::{parse_key_values, ComputeHook, ComputeInputs};
use crate::error::{WorkerError, WorkerResult};
use crate::log_artifact::LogArtifact;

#[derive(Debug, Clone)]
pub struct CommandHook {
    type_name: String,
    version: String,
    program: String,
    args: Vec<String>,
    options: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandHook {
    /// Build from a command line template.
    pub fn parse(command_line: &str) -> WorkerResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| WorkerError::config_error("empty measurement command"))?;
        let args: Vec<String> = parts.collect();

        for placeholder in ["{ref}", "{dis}"] {
            if !args.iter().any(|a| a.contains(placeholder)) {
                return Err(WorkerError::config_error(format!(
                    "measurement command must reference {}",
                    placeholder
                )));
            }
        }

        Ok(Self {
            type_name: "CMD".to_string(),
            version: "1.0".to_string(),
            program,
            args,
            options: BTreeMap::new(),
            timeout: None,
        })
    }

    /// Override the (type, version) identity.
    pub fn with_identity(mut self, type_name: impl Into<String>, version: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self.version = version.into();
        self
    }

    /// Add an option that changes the result.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with every placeholder filled in for one job.
    pub fn render_args(&self, inputs: &ComputeInputs, log: &LogArtifact) -> Vec<String> {
        let mut vars: Vec<(String, String)> = vec![
            ("ref".to_string(), inputs.ref_path.display().to_string()),
            ("dis".to_string(), inputs.dis_path.display().to_string()),
            ("width".to_string(), inputs.dims.width.to_string()),
            ("height".to_string(), inputs.dims.height.to_string()),
            ("pix_fmt".to_string(), inputs.pixel_format.as_str().to_string()),
            ("log".to_string(), log.path().display().to_string()),
        ];
        vars.extend(
            self.options
                .iter()
                .chain(inputs.runtime_options.iter())
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

#[async_trait]
impl ComputeHook for CommandHook {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn options(&self) -> BTreeMap<String, String> {
        self.options.clone()
    }

    fn check_available(&self) -> WorkerResult<()> {
        which::which(&self.program).map(|_| ()).map_err(|_| {
            WorkerError::config_error(format!("measurement program '{}' not found", self.program))
        })
    }

    async fn generate(&self, inputs: &ComputeInputs, log: &LogArtifact) -> WorkerResult<()> {
        let args = self.render_args(inputs, log);
        debug!(program = %self.program, "Running measurement command");

        let output = run_tool(&self.program, &args, self.timeout)
            .await
            .map_err(|e| WorkerError::from_tool(&self.program, e))?;

        if !output.success {
            return Err(WorkerError::external_tool(
                &self.program,
                format!(
                    "exited with status {}: {}",
                    output
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    output.stderr_tail()
                ),
            ));
        }

        log.append(&output.stdout).await
    }

    async fn parse(&self, log: &LogArtifact) -> WorkerResult<Scores> {
        Ok(parse_key_values(&log.read_to_string().await?))
    }
}
