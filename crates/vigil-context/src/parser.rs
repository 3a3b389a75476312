//! Markdown rule-file parser.
//!
//! Consumes one UTF-8 markdown string plus a `source_file` identifier and
//! produces a [`ParsedContext`]. Purely syntactic: malformed markdown is
//! tolerated, unknown section headers fall through to architecture notes,
//! and the function is deterministic over its byte input.
//!
//! Sections are classified by case-insensitive keyword search in the header
//! text. Anti-pattern detection runs before pattern detection because
//! "anti-pattern" contains "pattern".

use crate::model::{
    AntiPattern, Convention, OverrideDirective, OverrideKind, ParsedContext, Pattern,
};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

/// Fallback alternative text for anti-pattern items without an arrow form.
const DEFAULT_ALTERNATIVE: &str = "(see context for alternatives)";

/// `@disable: "console.log"`, optionally behind a list marker, optionally
/// carrying a new value after the quoted target.
static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:[-*]\s+|\d+\.\s+)?@(extend|override|disable):\s*"([^"]+)"(?:\s+(.+))?\s*$"#)
        .expect("directive regex is valid")
});

/// `` `X` -> Y `` -- backticked forbidden form, highest priority.
static BACKTICK_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^`([^`]+)`\s*(?:→|->|—|–|--)\s*(.+)$").expect("backtick arrow regex is valid")
});

/// `X -> Y` -- plain forbidden form.
static PLAIN_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*(?:→|->|—|–|--)\s+(.+)$").expect("plain arrow regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Patterns,
    AntiPatterns,
    Conventions,
    Examples,
    Overrides,
    Architecture,
}

/// Classify a section header by keyword, in precedence order.
fn classify_heading(text: &str) -> Section {
    let t = text.to_lowercase();
    // Anti-pattern keywords must win over "pattern".
    if t.contains("anti-pattern")
        || t.contains("antipattern")
        || t.contains("do not")
        || t.contains("don't")
        || t.contains("avoid")
    {
        Section::AntiPatterns
    } else if t.contains("required pattern") || t.contains("pattern") || t.contains("best practice")
    {
        Section::Patterns
    } else if t.contains("convention") || t.contains("style") {
        Section::Conventions
    } else if t.contains("example") {
        Section::Examples
    } else if t.contains("override") {
        Section::Overrides
    } else {
        Section::Architecture
    }
}

/// Derive a stable id prefix from the source file path.
fn slugify(source_file: &str) -> String {
    let mut slug = String::with_capacity(source_file.len());
    let mut last_dash = true;
    for ch in source_file.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("context");
    }
    slug
}

/// Which item most recently flushed, so later code blocks and example items
/// can be attached to it.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Pattern(usize),
    AntiPattern(usize),
    Convention(usize),
}

struct ContextBuilder {
    out: ParsedContext,
    slug: String,
    seq: usize,
    last_slot: Option<Slot>,
}

impl ContextBuilder {
    fn new(source_file: &str) -> Self {
        Self {
            out: ParsedContext::new(source_file),
            slug: slugify(source_file),
            seq: 0,
            last_slot: None,
        }
    }

    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.slug, self.seq);
        self.seq += 1;
        id
    }

    fn push_pattern(&mut self, description: String, examples: Vec<String>) {
        let id = self.next_id();
        self.out.patterns.push(Pattern {
            id,
            description,
            source_file: self.out.source_file.clone(),
            examples,
        });
        self.last_slot = Some(Slot::Pattern(self.out.patterns.len() - 1));
    }

    fn push_anti_pattern(&mut self, mut anti: AntiPattern, examples: Vec<String>) {
        anti.id = self.next_id();
        anti.source_file = self.out.source_file.clone();
        if !examples.is_empty() {
            append_reason(&mut anti.reason, &examples.join("\n"));
        }
        self.out.anti_patterns.push(anti);
        self.last_slot = Some(Slot::AntiPattern(self.out.anti_patterns.len() - 1));
    }

    fn push_convention(&mut self, description: String) {
        let id = self.next_id();
        self.out.conventions.push(Convention {
            id,
            description,
            source_file: self.out.source_file.clone(),
        });
        self.last_slot = Some(Slot::Convention(self.out.conventions.len() - 1));
    }

    fn append_note(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.out.architecture_notes.is_empty() {
            self.out.architecture_notes.push_str("\n\n");
        }
        self.out.architecture_notes.push_str(text);
    }

    /// Attach an example (code block or example-section item) to the most
    /// recently flushed item. Conventions carry no example field; for them
    /// and for files with no items yet, the text lands in the notes.
    fn attach_example(&mut self, text: String) {
        match self.last_slot {
            Some(Slot::Pattern(i)) => self.out.patterns[i].examples.push(text),
            Some(Slot::AntiPattern(i)) => {
                append_reason(&mut self.out.anti_patterns[i].reason, &text);
            }
            Some(Slot::Convention(_)) | None => self.append_note(&text),
        }
    }
}

fn append_reason(reason: &mut Option<String>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match reason {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(text);
        }
        None => *reason = Some(text.to_string()),
    }
}

/// Parse one anti-pattern list item.
///
/// Tries the backticked arrow form, then the plain arrow form. A trailing
/// `(reason)` or a second sentence after the alternative becomes the reason;
/// items without an arrow keep the whole first line as `forbidden` and any
/// remaining lines as the reason.
fn parse_anti_pattern_item(text: &str) -> AntiPattern {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").trim();
    let rest: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();

    let captures = BACKTICK_ARROW_RE
        .captures(first)
        .or_else(|| PLAIN_ARROW_RE.captures(first));

    let (forbidden, alternative, mut reason) = match captures {
        Some(caps) => {
            let forbidden = caps[1].trim().trim_matches('`').to_string();
            let (alternative, reason) = split_alternative(caps[2].trim());
            (forbidden, alternative, reason)
        }
        None => (first.to_string(), DEFAULT_ALTERNATIVE.to_string(), None),
    };

    if !rest.is_empty() {
        append_reason(&mut reason, &rest.join(" "));
    }

    AntiPattern {
        id: String::new(),
        forbidden,
        alternative,
        reason,
        source_file: String::new(),
    }
}

/// Split a trailing `(reason)` or `. Reason sentence.` off the alternative.
fn split_alternative(raw: &str) -> (String, Option<String>) {
    if raw.ends_with(')') {
        if let Some(open) = raw.rfind('(') {
            let alternative = raw[..open].trim();
            let reason = raw[open + 1..raw.len() - 1].trim();
            if !alternative.is_empty() && !reason.is_empty() {
                return (alternative.to_string(), Some(reason.to_string()));
            }
        }
    }
    if let Some(pos) = raw.find(". ") {
        let alternative = raw[..pos].trim();
        let reason = raw[pos + 2..].trim().trim_end_matches('.');
        if !reason.is_empty() {
            return (alternative.to_string(), Some(reason.to_string()));
        }
    }
    (raw.trim_matches('`').to_string(), None)
}

/// Collect override directives from raw source lines, skipping fenced code
/// blocks so example snippets cannot inject directives.
fn collect_directives(source: &str, source_file: &str) -> Vec<OverrideDirective> {
    let mut directives = Vec::new();
    let mut in_fence = false;
    for line in source.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = DIRECTIVE_RE.captures(line) {
            let kind = match &caps[1] {
                "extend" => OverrideKind::Extend,
                "override" => OverrideKind::Override,
                _ => OverrideKind::Disable,
            };
            directives.push(OverrideDirective {
                kind,
                target_id: caps[2].to_string(),
                new_value: caps.get(3).map(|m| m.as_str().trim().to_string()),
                source_file: source_file.to_string(),
            });
        }
    }
    directives
}

fn is_directive_line(line: &str) -> bool {
    DIRECTIVE_RE.is_match(line)
}

/// Strip directive lines out of free text destined for items or notes.
fn without_directive_lines(text: &str) -> String {
    text.lines()
        .filter(|l| !is_directive_line(l))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse a markdown rule file into a [`ParsedContext`].
///
/// Never fails: the worst malformed input degrades into architecture notes.
/// Ids are `slugify(source_file)-<seq>` and stable across re-parses of
/// unchanged content.
pub fn parse_context(source: &str, source_file: &str) -> ParsedContext {
    let mut builder = ContextBuilder::new(source_file);
    builder.out.overrides = collect_directives(source, source_file);

    let mut section = Section::Architecture;
    let mut heading: Option<String> = None;
    let mut item: Option<String> = None;
    let mut item_examples: Vec<String> = Vec::new();
    let mut code: Option<String> = None;
    let mut para: Option<String> = None;

    let push_text = |buf: &mut Option<String>, text: &str| {
        if let Some(b) = buf.as_mut() {
            b.push_str(text);
        }
    };

    for event in Parser::new(source) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                heading = Some(String::new());
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(text) = heading.take() {
                    section = classify_heading(&text);
                }
            }
            Event::Start(Tag::Item) => {
                // A new list item flushes the one being built (covers nested
                // lists, where no End(Item) has arrived yet).
                if let Some(text) = item.take() {
                    flush_item(
                        &mut builder,
                        section,
                        &text,
                        std::mem::take(&mut item_examples),
                    );
                }
                item = Some(String::new());
            }
            Event::End(TagEnd::Item) => {
                if let Some(text) = item.take() {
                    flush_item(
                        &mut builder,
                        section,
                        &text,
                        std::mem::take(&mut item_examples),
                    );
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                code = Some(String::new());
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = code.take() {
                    let block = block.trim_end_matches('\n').to_string();
                    if block.is_empty() {
                        continue;
                    }
                    if item.is_some() {
                        item_examples.push(block);
                    } else {
                        builder.attach_example(block);
                    }
                }
            }
            Event::Start(Tag::Paragraph) => {
                if let Some(buf) = item.as_mut() {
                    if !buf.is_empty() {
                        buf.push('\n');
                    }
                } else {
                    para = Some(String::new());
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if let Some(text) = para.take() {
                    if item.is_none() && section == Section::Architecture {
                        builder.append_note(&without_directive_lines(&text));
                    }
                }
            }
            Event::Text(t) => {
                if code.is_some() {
                    push_text(&mut code, &t);
                } else if heading.is_some() {
                    push_text(&mut heading, &t);
                } else if item.is_some() {
                    push_text(&mut item, &t);
                } else {
                    push_text(&mut para, &t);
                }
            }
            Event::Code(t) => {
                let wrapped = format!("`{t}`");
                if heading.is_some() {
                    push_text(&mut heading, &wrapped);
                } else if item.is_some() {
                    push_text(&mut item, &wrapped);
                } else {
                    push_text(&mut para, &wrapped);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if heading.is_some() {
                    push_text(&mut heading, " ");
                } else if item.is_some() {
                    push_text(&mut item, "\n");
                } else {
                    push_text(&mut para, "\n");
                }
            }
            _ => {}
        }
    }

    // Unterminated structures at EOF.
    if let Some(text) = item.take() {
        flush_item(&mut builder, section, &text, item_examples);
    }
    if let Some(text) = para.take() {
        if section == Section::Architecture {
            builder.append_note(&without_directive_lines(&text));
        }
    }

    builder.out
}

fn flush_item(builder: &mut ContextBuilder, section: Section, text: &str, examples: Vec<String>) {
    let text = without_directive_lines(text);
    if text.is_empty() {
        // Directive-only or blank item; directives were already collected.
        return;
    }
    match section {
        Section::AntiPatterns => {
            let anti = parse_anti_pattern_item(&text);
            builder.push_anti_pattern(anti, examples);
        }
        Section::Patterns => {
            builder.push_pattern(text, examples);
        }
        Section::Conventions => {
            builder.push_convention(text);
        }
        Section::Examples => {
            builder.attach_example(text);
        }
        Section::Overrides => {
            // Non-directive prose inside an overrides section is dropped.
        }
        Section::Architecture => {
            builder.append_note(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedContext {
        parse_context(source, "rules/context.md")
    }

    // ===== Section classification =====

    #[test]
    fn test_anti_pattern_header_never_classified_as_patterns() {
        for header in [
            "Anti-Patterns",
            "ANTI-PATTERNS",
            "Antipatterns to watch",
            "Things to avoid",
            "Do not do this",
            "Don't do these",
        ] {
            assert_eq!(
                classify_heading(header),
                Section::AntiPatterns,
                "header {header:?} misclassified"
            );
        }
    }

    #[test]
    fn test_pattern_and_convention_headers() {
        assert_eq!(classify_heading("Required Patterns"), Section::Patterns);
        assert_eq!(classify_heading("Best Practices"), Section::Patterns);
        assert_eq!(classify_heading("Conventions"), Section::Conventions);
        assert_eq!(classify_heading("Code Style"), Section::Conventions);
        assert_eq!(classify_heading("Examples"), Section::Examples);
        assert_eq!(classify_heading("Overrides"), Section::Overrides);
    }

    #[test]
    fn test_unknown_headers_are_architecture() {
        for header in ["Overview", "Architecture", "Notes", "Context", "About"] {
            assert_eq!(classify_heading(header), Section::Architecture);
        }
    }

    // ===== Items =====

    #[test]
    fn test_patterns_from_list_items() {
        let ctx = parse(
            "## Patterns\n\n- Use dependency injection\n- Return `Result` from fallible functions\n",
        );
        assert_eq!(ctx.patterns.len(), 2);
        assert_eq!(ctx.patterns[0].description, "Use dependency injection");
        assert_eq!(
            ctx.patterns[1].description,
            "Return `Result` from fallible functions"
        );
        assert!(ctx.anti_patterns.is_empty());
    }

    #[test]
    fn test_numbered_and_star_list_items() {
        let ctx = parse("## Conventions\n\n1. camelCase for functions\n\n* kebab-case for files\n");
        assert_eq!(ctx.conventions.len(), 2);
    }

    #[test]
    fn test_anti_pattern_backtick_arrow() {
        let ctx = parse("## Anti-Patterns\n\n- `console.log` → debugLog\n");
        assert_eq!(ctx.anti_patterns.len(), 1);
        assert_eq!(ctx.anti_patterns[0].forbidden, "console.log");
        assert_eq!(ctx.anti_patterns[0].alternative, "debugLog");
        assert!(ctx.anti_patterns[0].reason.is_none());
    }

    #[test]
    fn test_anti_pattern_ascii_arrow_and_dashes() {
        for arrow in ["->", "—", "–", "--"] {
            let src = format!("## Avoid\n\n- var {arrow} let or const\n");
            let ctx = parse(&src);
            assert_eq!(ctx.anti_patterns.len(), 1, "arrow {arrow:?}");
            assert_eq!(ctx.anti_patterns[0].forbidden, "var");
            assert_eq!(ctx.anti_patterns[0].alternative, "let or const");
        }
    }

    #[test]
    fn test_anti_pattern_paren_reason() {
        let ctx = parse("## Anti-Patterns\n\n- `any` -> explicit types (defeats type checking)\n");
        let anti = &ctx.anti_patterns[0];
        assert_eq!(anti.forbidden, "any");
        assert_eq!(anti.alternative, "explicit types");
        assert_eq!(anti.reason.as_deref(), Some("defeats type checking"));
    }

    #[test]
    fn test_anti_pattern_sentence_reason() {
        let ctx = parse("## Anti-Patterns\n\n- `eval` -> a parser. Arbitrary code execution is unsafe.\n");
        let anti = &ctx.anti_patterns[0];
        assert_eq!(anti.alternative, "a parser");
        assert_eq!(
            anti.reason.as_deref(),
            Some("Arbitrary code execution is unsafe")
        );
    }

    #[test]
    fn test_anti_pattern_without_arrow_falls_back() {
        let ctx = parse("## Anti-Patterns\n\n- Global mutable state\n  makes tests flaky\n");
        let anti = &ctx.anti_patterns[0];
        assert_eq!(anti.forbidden, "Global mutable state");
        assert_eq!(anti.alternative, DEFAULT_ALTERNATIVE);
        assert_eq!(anti.reason.as_deref(), Some("makes tests flaky"));
    }

    // ===== Code blocks =====

    #[test]
    fn test_code_block_attached_to_previous_pattern() {
        let ctx = parse(
            "## Patterns\n\n- Use the builder API\n\n```rust\nClient::builder().timeout(5).build()\n```\n",
        );
        assert_eq!(ctx.patterns.len(), 1);
        assert_eq!(ctx.patterns[0].examples.len(), 1);
        assert!(ctx.patterns[0].examples[0].contains("Client::builder()"));
    }

    #[test]
    fn test_example_section_items_attach_to_last_item() {
        let ctx = parse("## Patterns\n\n- Prefer iterators\n\n## Examples\n\n- items.iter().map(f)\n");
        assert_eq!(ctx.patterns.len(), 1);
        assert_eq!(ctx.patterns[0].examples, vec!["items.iter().map(f)"]);
    }

    #[test]
    fn test_code_block_without_items_lands_in_notes() {
        let ctx = parse("## Overview\n\nLayered design.\n\n```text\nui -> core -> store\n```\n");
        assert!(ctx.architecture_notes.contains("Layered design."));
        assert!(ctx.architecture_notes.contains("ui -> core -> store"));
    }

    // ===== Overrides =====

    #[test]
    fn test_disable_directive() {
        let ctx = parse("# Context\n\n@disable: \"console.log\"\n");
        assert_eq!(ctx.overrides.len(), 1);
        assert_eq!(ctx.overrides[0].kind, OverrideKind::Disable);
        assert_eq!(ctx.overrides[0].target_id, "console.log");
        assert!(ctx.overrides[0].new_value.is_none());
    }

    #[test]
    fn test_override_directive_with_value() {
        let ctx = parse("@override: \"timeout\" Use 30s timeouts\n");
        assert_eq!(ctx.overrides.len(), 1);
        assert_eq!(ctx.overrides[0].kind, OverrideKind::Override);
        assert_eq!(ctx.overrides[0].new_value.as_deref(), Some("Use 30s timeouts"));
    }

    #[test]
    fn test_extend_directive_in_list_item() {
        let ctx = parse("## Overrides\n\n- @extend: \"error handling\" including panics\n");
        assert_eq!(ctx.overrides.len(), 1);
        assert_eq!(ctx.overrides[0].kind, OverrideKind::Extend);
        assert_eq!(ctx.overrides[0].new_value.as_deref(), Some("including panics"));
        // Directive-only items never become rules.
        assert!(ctx.patterns.is_empty());
        assert!(ctx.conventions.is_empty());
    }

    #[test]
    fn test_directive_inside_code_fence_ignored() {
        let ctx = parse("## Overview\n\n```md\n@disable: \"everything\"\n```\n");
        assert!(ctx.overrides.is_empty());
    }

    #[test]
    fn test_directive_not_duplicated_into_notes() {
        let ctx = parse("# Notes\n\nSome prose.\n\n@disable: \"x\"\n");
        assert_eq!(ctx.overrides.len(), 1);
        assert!(!ctx.architecture_notes.contains("@disable"));
        assert!(ctx.architecture_notes.contains("Some prose."));
    }

    // ===== Architecture notes =====

    #[test]
    fn test_prose_under_unknown_header_becomes_notes() {
        let ctx = parse("## About\n\nThis service brokers validation runs.\n");
        assert!(
            ctx.architecture_notes
                .contains("This service brokers validation runs.")
        );
    }

    #[test]
    fn test_architecture_list_items_become_notes() {
        let ctx = parse("## Architecture\n\n- core owns the pipeline\n- ui subscribes to events\n");
        assert!(ctx.architecture_notes.contains("core owns the pipeline"));
        assert!(ctx.architecture_notes.contains("ui subscribes to events"));
        assert!(ctx.patterns.is_empty());
    }

    // ===== Ids =====

    #[test]
    fn test_ids_are_sequential_and_prefixed() {
        let ctx = parse_context(
            "## Patterns\n\n- one\n- two\n\n## Conventions\n\n- three\n",
            "src/api/context.md",
        );
        assert_eq!(ctx.patterns[0].id, "src-api-context-md-0");
        assert_eq!(ctx.patterns[1].id, "src-api-context-md-1");
        assert_eq!(ctx.conventions[0].id, "src-api-context-md-2");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("src/a/context.md"), "src-a-context-md");
        assert_eq!(slugify("///"), "context");
        assert_eq!(slugify("Weird  Name.MD"), "weird-name-md");
    }

    // ===== Determinism =====

    #[test]
    fn test_parse_is_deterministic() {
        let source = "## Patterns\n\n- a\n\n## Anti-Patterns\n\n- `x` -> y (z)\n\n@disable: \"q\"\n";
        let a = parse_context(source, "ctx.md");
        let b = parse_context(source, "ctx.md");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(parse("").is_empty());
        let ctx = parse(">>> ??? ``` unterminated");
        // Garbage degrades, never panics.
        assert!(ctx.patterns.is_empty());
        assert!(ctx.anti_patterns.is_empty());
    }

    #[test]
    fn test_mixed_document() {
        let ctx = parse(
            r#"# Frontend rules

General guidance for the web client.

## Required Patterns

- Use functional components
- Fetch through the api client

## Anti-Patterns

- `fetch` → apiClient.get (central retry and auth handling)
- Inline styles

## Conventions

- PascalCase component files

## Overrides

- @disable: "legacy router"
"#,
        );
        assert_eq!(ctx.patterns.len(), 2);
        assert_eq!(ctx.anti_patterns.len(), 2);
        assert_eq!(ctx.conventions.len(), 1);
        assert_eq!(ctx.overrides.len(), 1);
        assert!(ctx.architecture_notes.contains("General guidance"));
        assert_eq!(ctx.anti_patterns[0].forbidden, "fetch");
        assert_eq!(ctx.anti_patterns[0].alternative, "apiClient.get");
        assert_eq!(
            ctx.anti_patterns[0].reason.as_deref(),
            Some("central retry and auth handling")
        );
        assert_eq!(ctx.anti_patterns[1].alternative, DEFAULT_ALTERNATIVE);
    }
}
