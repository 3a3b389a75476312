//! Hierarchical merge of parsed rule files.
//!
//! Contexts merge in list order, coarsest first. Each file's override
//! directives apply against the accumulated merge *before* that file's own
//! items are appended, so a child file can disable a parent's rule without
//! immediately re-adding it under the same key. Item deduplication is by id
//! with incoming-wins semantics.

use crate::model::{MergedRules, OverrideDirective, OverrideKind, ParsedContext};

/// Merge parsed contexts, coarsest first, into a single [`MergedRules`].
pub fn merge_contexts(contexts: &[ParsedContext]) -> MergedRules {
    let mut merged = MergedRules::default();

    for ctx in contexts {
        // Overrides first: they target what earlier (coarser) files added.
        for directive in &ctx.overrides {
            apply_override(&mut merged, directive);
            merged.overrides.push(directive.clone());
        }

        for pattern in &ctx.patterns {
            match merged.patterns.iter_mut().find(|p| p.id == pattern.id) {
                Some(existing) => *existing = pattern.clone(),
                None => merged.patterns.push(pattern.clone()),
            }
        }
        for anti in &ctx.anti_patterns {
            match merged.anti_patterns.iter_mut().find(|a| a.id == anti.id) {
                Some(existing) => *existing = anti.clone(),
                None => merged.anti_patterns.push(anti.clone()),
            }
        }
        for convention in &ctx.conventions {
            match merged.conventions.iter_mut().find(|c| c.id == convention.id) {
                Some(existing) => *existing = convention.clone(),
                None => merged.conventions.push(convention.clone()),
            }
        }

        let notes = ctx.architecture_notes.trim();
        if !notes.is_empty() {
            if !merged.architecture_notes.is_empty() {
                merged.architecture_notes.push_str("\n\n");
            }
            merged.architecture_notes.push_str(notes);
        }
    }

    merged
}

/// Whether an item matches an override target: the id contains the target,
/// or the item's primary string contains it case-insensitively.
fn matches_target(id: &str, primary: &str, target: &str) -> bool {
    id.contains(target) || primary.to_lowercase().contains(&target.to_lowercase())
}

fn apply_override(merged: &mut MergedRules, directive: &OverrideDirective) {
    let target = &directive.target_id;
    match directive.kind {
        OverrideKind::Disable => {
            merged
                .patterns
                .retain(|p| !matches_target(&p.id, &p.description, target));
            merged
                .anti_patterns
                .retain(|a| !matches_target(&a.id, &a.forbidden, target));
            merged
                .conventions
                .retain(|c| !matches_target(&c.id, &c.description, target));
        }
        OverrideKind::Override => {
            let Some(new_value) = directive.new_value.as_deref() else {
                return;
            };
            for p in &mut merged.patterns {
                if matches_target(&p.id, &p.description, target) {
                    p.description = new_value.to_string();
                    p.source_file = directive.source_file.clone();
                }
            }
            for a in &mut merged.anti_patterns {
                if matches_target(&a.id, &a.forbidden, target) {
                    a.forbidden = new_value.to_string();
                    a.source_file = directive.source_file.clone();
                }
            }
            for c in &mut merged.conventions {
                if matches_target(&c.id, &c.description, target) {
                    c.description = new_value.to_string();
                    c.source_file = directive.source_file.clone();
                }
            }
        }
        OverrideKind::Extend => {
            let Some(suffix) = directive.new_value.as_deref() else {
                return;
            };
            // Only patterns are extended.
            for p in &mut merged.patterns {
                if matches_target(&p.id, &p.description, target) {
                    p.description.push(' ');
                    p.description.push_str(suffix);
                }
            }
        }
    }
}
