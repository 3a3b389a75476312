//! Static validator runner: execute a shell command and parse its output.
//!
//! Command templates containing `{{files}}` get the space-separated quoted
//! candidate paths substituted in; otherwise the paths are appended unless
//! the command already carries a `--` argument marker. Exit code 0 (or an
//! explicit `success: true` in parsed output) approves; anything else
//! rejects with the severity configured on the validator.

use crate::context::ValidationContext;
use crate::error::RunnerError;
use crate::result::{ResultDetails, Severity, ValidatorResult, ValidatorStatus};
use crate::runners::output::{self, Issue, OutputFormat};
use crate::validator::{FailureMode, ValidatorDefinition};
use async_trait::async_trait;
use std::process::Stdio;

/// Raw output stored in result metadata is capped at this many characters.
const MAX_RAW_OUTPUT_CHARS: usize = 20_000;

/// Seam for executing static validators; swap in a fake for tests.
#[async_trait]
pub trait StaticRunner: Send + Sync {
    async fn run(
        &self,
        def: &ValidatorDefinition,
        command: &str,
        ctx: &ValidationContext,
    ) -> Result<ValidatorResult, RunnerError>;
}

/// Default runner: `sh -c` with kill-on-drop, so a cancelled validation
/// does not leak child processes.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Force an output format instead of auto-detecting.
    pub format: OutputFormat,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: OutputFormat) -> Self {
        Self { format }
    }
}

fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\\\""))
}

/// Substitute `{{files}}`, or append quoted paths when the command has no
/// explicit argument marker.
pub(crate) fn build_command_line(command: &str, ctx: &ValidationContext) -> String {
    let quoted: Vec<String> = ctx.files.iter().map(|f| quote_path(&f.path)).collect();
    let joined = quoted.join(" ");

    if command.contains("{{files}}") {
        return command.replace("{{files}}", &joined);
    }
    if command.contains(" -- ") || command.trim_end().ends_with(" --") {
        return command.to_string();
    }
    if joined.is_empty() {
        return command.to_string();
    }
    format!("{command} {joined}")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push_str("\n... [output truncated]");
        out
    }
}

fn first_issue_details(issues: &[Issue]) -> Option<ResultDetails> {
    issues.first().map(|issue| ResultDetails {
        file: issue.file.clone(),
        line: issue.line,
        column: issue.column,
        suggested_fix: None,
        reasoning: None,
    })
}

#[async_trait]
impl StaticRunner for CommandRunner {
    async fn run(
        &self,
        def: &ValidatorDefinition,
        command: &str,
        ctx: &ValidationContext,
    ) -> Result<ValidatorResult, RunnerError> {
        let command_line = build_command_line(command, ctx);
        tracing::debug!(validator = %def.id, command = %command_line, "running static validator");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RunnerError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_ok = output.status.success();
        let exit_code = output.status.code();

        let parsed = output::parse(&stdout, &stderr, self.format);
        let approved = exit_ok || parsed.success == Some(true);

        let (status, severity, message) = if approved {
            (
                ValidatorStatus::Approved,
                Severity::Info,
                format!("Command passed ({} issues reported)", parsed.issues.len()),
            )
        } else {
            let severity = match def.behavior.on_failure {
                FailureMode::Error => Severity::Error,
                FailureMode::Warning => Severity::Warning,
            };
            let message = parsed
                .issues
                .first()
                .map(|i| i.message.clone())
                .unwrap_or_else(|| {
                    format!(
                        "Command exited with status {}",
                        exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
                    )
                });
            (ValidatorStatus::Rejected, severity, message)
        };

        let raw = if stderr.trim().is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}\n--- stderr ---\n{stderr}")
        };

        let mut result = ValidatorResult::new(&def.id, status, severity, message)
            .with_metadata(
                "all_issues",
                serde_json::to_value(&parsed.issues).unwrap_or_default(),
            )
            .with_metadata("raw_output", truncate_chars(&raw, MAX_RAW_OUTPUT_CHARS).into())
            .with_metadata("exit_code", serde_json::json!(exit_code))
            .with_metadata(
                "output_format",
                serde_json::to_value(parsed.format).unwrap_or_default(),
            );
        if let Some(details) = first_issue_details(&parsed.issues) {
            result = result.with_details(details);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CandidateFile, TriggerKind};
    use crate::validator::{Behavior, ValidatorKind};

    fn ctx(paths: &[&str]) -> ValidationContext {
        let mut ctx = ValidationContext::new(TriggerKind::PreWrite, "s");
        for p in paths {
            ctx.files.push(CandidateFile::new(*p, "content"));
        }
        ctx
    }

    fn def(command: &str) -> ValidatorDefinition {
        ValidatorDefinition::new(
            "static",
            "static",
            ValidatorKind::Static {
                command: command.to_string(),
            },
        )
    }

    // ===== Command-line construction =====

    #[test]
    fn test_files_placeholder_substitution() {
        let line = build_command_line("eslint {{files}} -f json", &ctx(&["a.ts", "b c.ts"]));
        assert_eq!(line, "eslint \"a.ts\" \"b c.ts\" -f json");
    }

    #[test]
    fn test_paths_appended_by_default() {
        let line = build_command_line("tsc --noEmit", &ctx(&["a.ts"]));
        assert_eq!(line, "tsc --noEmit \"a.ts\"");
    }

    #[test]
    fn test_marker_prevents_appending() {
        let line = build_command_line("npm test --", &ctx(&["a.ts"]));
        assert_eq!(line, "npm test --");
        let line = build_command_line("npm test -- --silent", &ctx(&["a.ts"]));
        assert_eq!(line, "npm test -- --silent");
    }

    #[test]
    fn test_no_files_appends_nothing() {
        let line = build_command_line("make lint", &ctx(&[]));
        assert_eq!(line, "make lint");
    }

    #[test]
    fn test_quote_escapes_embedded_quotes() {
        assert_eq!(quote_path(r#"we"ird.ts"#), r#""we\"ird.ts""#);
    }

    // ===== Execution =====

    #[tokio::test]
    async fn test_exit_zero_approves() {
        let runner = CommandRunner::new();
        let result = runner
            .run(&def("true"), "true", &ctx(&[]))
            .await
            .unwrap();
        assert_eq!(result.status, ValidatorStatus::Approved);
        assert_eq!(result.metadata["exit_code"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_rejects_with_configured_severity() {
        let runner = CommandRunner::new();
        let mut definition = def("exit 3");
        definition.behavior = Behavior {
            on_failure: FailureMode::Error,
            ..Behavior::default()
        };
        // `exit 3` is a shell builtin; appended paths are harmless.
        let result = runner
            .run(&definition, "exit 3", &ctx(&[]))
            .await
            .unwrap();
        assert_eq!(result.status, ValidatorStatus::Rejected);
        assert_eq!(result.severity, Severity::Error);
        assert_eq!(result.metadata["exit_code"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_parsed_issue_becomes_details() {
        let runner = CommandRunner::new();
        let script = r#"echo "src/a.ts(4,2): error TS2304: Cannot find name 'x'." ; exit 1"#;
        let result = runner.run(&def(script), script, &ctx(&[])).await.unwrap();
        assert_eq!(result.status, ValidatorStatus::Rejected);
        let details = result.details.expect("details from first issue");
        assert_eq!(details.file.as_deref(), Some("src/a.ts"));
        assert_eq!(details.line, Some(4));
        assert!(result.message.contains("Cannot find name"));
        let issues = result.metadata["all_issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[tokio::test]
    async fn test_success_flag_overrides_exit_code() {
        // Jest-style JSON reporting success even though the wrapper exits 1.
        let runner = CommandRunner::new();
        let script = r#"echo '{"success":true,"numFailedTests":0,"numTotalTests":2,"testResults":[]}' ; exit 1"#;
        let result = runner.run(&def(script), script, &ctx(&[])).await.unwrap();
        assert_eq!(result.status, ValidatorStatus::Approved);
    }

    #[tokio::test]
    async fn test_raw_output_recorded() {
        let runner = CommandRunner::new();
        let script = "echo out ; echo err 1>&2";
        let result = runner.run(&def(script), script, &ctx(&[])).await.unwrap();
        let raw = result.metadata["raw_output"].as_str().unwrap();
        assert!(raw.contains("out"));
        assert!(raw.contains("err"));
    }
}
