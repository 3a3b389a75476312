//! File-pattern matching for validator applicability.
//!
//! `require_literal_separator` is on, so `*` only matches within a single
//! path component; `**` is the recursive form. A leading `**/` additionally
//! matches the unprefixed path, so `**/*.ts` covers both `a.ts` and
//! `src/a.ts`.

use crate::context::CandidateFile;

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Whether a single path matches a single glob pattern.
///
/// Invalid patterns are logged and never match; pattern validity is not a
/// registration invariant, so this stays lenient at match time.
pub(crate) fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.replace('\\', "/");
    let path = path.replace('\\', "/");
    let path = path.strip_prefix("./").unwrap_or(&path);

    let compiled = match glob::Pattern::new(&pattern) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(pattern, error = %e, "ignoring invalid file pattern");
            return false;
        }
    };
    if compiled.matches_with(path, MATCH_OPTIONS) {
        return true;
    }

    // `**/foo` must also match plain `foo`.
    if let Some(rest) = pattern.strip_prefix("**/") {
        if let Ok(p) = glob::Pattern::new(rest) {
            return p.matches_with(path, MATCH_OPTIONS);
        }
    }
    false
}

/// Whether at least one candidate file matches at least one pattern.
pub(crate) fn any_file_matches(patterns: &[String], files: &[CandidateFile]) -> bool {
    files
        .iter()
        .any(|file| patterns.iter().any(|pattern| path_matches(pattern, &file.path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_pattern_matches_nested_and_bare() {
        assert!(path_matches("**/*.ts", "a.ts"));
        assert!(path_matches("**/*.ts", "src/a.ts"));
        assert!(path_matches("**/*.ts", "src/deep/nested/a.ts"));
        assert!(!path_matches("**/*.ts", "src/a.rs"));
    }

    #[test]
    fn test_star_stays_within_segment() {
        assert!(path_matches("src/*.ts", "src/a.ts"));
        assert!(!path_matches("src/*.ts", "src/deep/a.ts"));
    }

    #[test]
    fn test_directory_recursive_suffix() {
        assert!(path_matches("tests/**", "tests/unit/a.rs"));
        assert!(!path_matches("tests/**", "src/a.rs"));
    }

    #[test]
    fn test_exact_and_leading_dot() {
        assert!(path_matches("Cargo.toml", "Cargo.toml"));
        assert!(path_matches("**/.env", ".env"));
        assert!(path_matches("**/*.md", "./README.md"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!path_matches("[unclosed", "anything"));
    }

    #[test]
    fn test_any_file_matches() {
        let files = vec![
            CandidateFile::new("src/a.rs", ""),
            CandidateFile::new("web/b.ts", ""),
        ];
        assert!(any_file_matches(&["**/*.ts".to_string()], &files));
        assert!(!any_file_matches(&["**/*.py".to_string()], &files));
        assert!(!any_file_matches(&[], &files));
    }
}
