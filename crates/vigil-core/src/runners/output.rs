//! Parsers for static-validator command output.
//!
//! The format is auto-detected unless the runner is configured with one:
//! ESLint JSON (an array), Jest JSON (an object), TypeScript compiler
//! lines (both `path(L,C): error TSxxxx:` and `path:L:C - error TSxxxx:`
//! shapes), TAP, and a generic `file:line:col` fallback that ignores
//! matches inside dependency paths and URLs.

use crate::result::Severity;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Configured output format for a static validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Auto,
    TypeScript,
    EslintJson,
    JestJson,
    Tap,
    Generic,
}

/// What the parser decided the output was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    TypeScript,
    EslintJson,
    JestJson,
    Tap,
    Generic,
}

/// One issue extracted from tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
    pub severity: Severity,
}

/// Structured view of one command's output.
#[derive(Debug, Clone)]
pub struct ParsedOutput {
    /// Explicit success flag when the format carries one (Jest, TAP,
    /// ESLint); `None` means the exit code decides.
    pub success: Option<bool>,
    pub issues: Vec<Issue>,
    pub format: DetectedFormat,
}

// `src/a.ts(12,5): error TS2304: Cannot find name 'x'.`
static TSC_PAREN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.{1,300}?)\((\d+),(\d+)\): (error|warning) (TS\d+): (.+)$")
        .expect("tsc paren regex is valid")
});

// `src/a.ts:12:5 - error TS2304: Cannot find name 'x'.`
static TSC_COLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.{1,300}?):(\d+):(\d+) - (error|warning) (TS\d+): (.+)$")
        .expect("tsc colon regex is valid")
});

static TAP_NOT_OK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^not ok\s+(\d+)(?:\s*-?\s*(.*))?$").expect("tap not-ok regex is valid")
});

static TAP_OK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ok\s+\d+").expect("tap ok regex is valid"));

// `path/to/file.ext:12:5` with a mandatory extension to cut false positives.
static GENERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_./\\-]+\.[A-Za-z0-9]+):(\d+)(?::(\d+))?")
        .expect("generic location regex is valid")
});

#[derive(Debug, Deserialize)]
struct EslintFile {
    #[serde(rename = "filePath", default)]
    file_path: String,
    #[serde(default)]
    messages: Vec<EslintMessage>,
    #[serde(rename = "errorCount", default)]
    error_count: u32,
}

#[derive(Debug, Deserialize)]
struct EslintMessage {
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    #[serde(rename = "ruleId", default)]
    rule_id: Option<String>,
    #[serde(default)]
    message: String,
    /// ESLint severity: 1 = warning, 2 = error.
    #[serde(default)]
    severity: u8,
}

#[derive(Debug, Deserialize)]
struct JestOutput {
    #[serde(default)]
    success: Option<bool>,
    #[serde(rename = "numFailedTests", default)]
    num_failed_tests: u32,
    #[serde(rename = "testResults", default)]
    test_results: Vec<JestTestFile>,
}

#[derive(Debug, Deserialize)]
struct JestTestFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Parse command output into issues and an optional success flag.
pub fn parse(stdout: &str, stderr: &str, format: OutputFormat) -> ParsedOutput {
    match format {
        OutputFormat::Auto => detect_and_parse(stdout, stderr),
        OutputFormat::EslintJson => {
            parse_eslint(stdout).unwrap_or_else(|| parse_generic(stdout, stderr))
        }
        OutputFormat::JestJson => {
            parse_jest(stdout).unwrap_or_else(|| parse_generic(stdout, stderr))
        }
        OutputFormat::TypeScript => parse_typescript(stdout, stderr),
        OutputFormat::Tap => parse_tap(stdout),
        OutputFormat::Generic => parse_generic(stdout, stderr),
    }
}

fn detect_and_parse(stdout: &str, stderr: &str) -> ParsedOutput {
    let trimmed = stdout.trim_start();
    if trimmed.starts_with('[') {
        if let Some(parsed) = parse_eslint(stdout) {
            return parsed;
        }
    }
    if trimmed.starts_with('{') {
        if let Some(parsed) = parse_jest(stdout) {
            return parsed;
        }
    }
    let combined_has_tsc = stdout
        .lines()
        .chain(stderr.lines())
        .any(|l| TSC_PAREN_RE.is_match(l.trim_end()) || TSC_COLON_RE.is_match(l.trim_end()));
    if combined_has_tsc {
        return parse_typescript(stdout, stderr);
    }
    let looks_like_tap = stdout.lines().any(|l| {
        let l = l.trim();
        l.starts_with("TAP version") || TAP_OK_RE.is_match(l) || TAP_NOT_OK_RE.is_match(l)
    });
    if looks_like_tap {
        return parse_tap(stdout);
    }
    parse_generic(stdout, stderr)
}

fn parse_eslint(stdout: &str) -> Option<ParsedOutput> {
    let files: Vec<EslintFile> = serde_json::from_str(stdout.trim()).ok()?;
    let mut issues = Vec::new();
    let mut error_count = 0u32;
    for file in &files {
        error_count += file.error_count;
        for msg in &file.messages {
            issues.push(Issue {
                file: Some(file.file_path.clone()),
                line: msg.line,
                column: msg.column,
                rule: msg.rule_id.clone(),
                message: msg.message.clone(),
                severity: if msg.severity >= 2 {
                    Severity::Error
                } else {
                    Severity::Warning
                },
            });
        }
    }
    Some(ParsedOutput {
        success: Some(error_count == 0),
        issues,
        format: DetectedFormat::EslintJson,
    })
}

fn parse_jest(stdout: &str) -> Option<ParsedOutput> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).ok()?;
    // Only treat objects that look like a Jest run as Jest output.
    let looks_like_jest = value.get("numTotalTests").is_some()
        || value.get("testResults").is_some()
        || value.get("numFailedTests").is_some();
    if !looks_like_jest {
        return None;
    }
    let jest: JestOutput = serde_json::from_value(value).ok()?;

    let mut issues = Vec::new();
    for test in &jest.test_results {
        let failed = test.status.as_deref() == Some("failed")
            || test.message.as_deref().is_some_and(|m| !m.trim().is_empty());
        if failed {
            issues.push(Issue {
                file: test.name.clone(),
                line: None,
                column: None,
                rule: None,
                message: test
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Test suite failed".to_string()),
                severity: Severity::Error,
            });
        }
    }
    let success = jest.success.unwrap_or(jest.num_failed_tests == 0);
    Some(ParsedOutput {
        success: Some(success),
        issues,
        format: DetectedFormat::JestJson,
    })
}

fn parse_typescript(stdout: &str, stderr: &str) -> ParsedOutput {
    let mut issues = Vec::new();
    for line in stdout.lines().chain(stderr.lines()) {
        let line = line.trim_end();
        let caps = TSC_PAREN_RE
            .captures(line)
            .or_else(|| TSC_COLON_RE.captures(line));
        if let Some(caps) = caps {
            issues.push(Issue {
                file: Some(caps[1].trim().to_string()),
                line: caps[2].parse().ok(),
                column: caps[3].parse().ok(),
                rule: Some(caps[5].to_string()),
                message: caps[6].to_string(),
                severity: if &caps[4] == "error" {
                    Severity::Error
                } else {
                    Severity::Warning
                },
            });
        }
    }
    ParsedOutput {
        success: None,
        issues,
        format: DetectedFormat::TypeScript,
    }
}

fn parse_tap(stdout: &str) -> ParsedOutput {
    let mut issues = Vec::new();
    let mut saw_test_line = false;
    for line in stdout.lines() {
        let line = line.trim();
        if TAP_OK_RE.is_match(line) {
            saw_test_line = true;
        } else if let Some(caps) = TAP_NOT_OK_RE.captures(line) {
            saw_test_line = true;
            let title = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|t| !t.is_empty())
                .unwrap_or("unnamed test");
            issues.push(Issue {
                file: None,
                line: None,
                column: None,
                rule: Some(format!("tap:{}", &caps[1])),
                message: format!("Test failed: {title}"),
                severity: Severity::Error,
            });
        }
    }
    ParsedOutput {
        success: saw_test_line.then(|| issues.is_empty()),
        issues,
        format: DetectedFormat::Tap,
    }
}

/// Whether a matched path sits inside a third-party dependency tree.
fn is_dependency_path(path: &str) -> bool {
    path.contains("node_modules/")
        || path.contains("vendor/")
        || path.starts_with("target/")
        || path.contains("/target/")
        || path.contains(".cargo/")
}

fn parse_generic(stdout: &str, stderr: &str) -> ParsedOutput {
    let mut issues = Vec::new();
    for line in stdout.lines().chain(stderr.lines()) {
        let line = line.trim();
        if line.is_empty() || line.contains("://") {
            continue;
        }
        if let Some(caps) = GENERIC_RE.captures(line) {
            let file = caps[1].to_string();
            if is_dependency_path(&file) {
                continue;
            }
            let severity = if line.to_lowercase().contains("warning") {
                Severity::Warning
            } else {
                Severity::Error
            };
            issues.push(Issue {
                file: Some(file),
                line: caps[2].parse().ok(),
                column: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                rule: None,
                message: line.to_string(),
                severity,
            });
        }
    }
    ParsedOutput {
        success: None,
        issues,
        format: DetectedFormat::Generic,
    }
}
