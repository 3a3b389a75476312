//! In-memory validator table.
//!
//! Keeps definitions in registration order so that equal-priority
//! validators execute in the order they were registered (the pipeline's
//! sort is stable).

use crate::context::{TriggerKind, ValidationContext};
use crate::error::RegistryError;
use crate::patterns;
use crate::validator::{ValidatorDefinition, ValidatorKind};

#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    validators: Vec<ValidatorDefinition>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, enforcing the definition invariants and that
    /// every composite child resolves. Re-registering an existing id
    /// replaces the definition in place, keeping its original order.
    pub fn register(&mut self, def: ValidatorDefinition) -> Result<(), RegistryError> {
        def.check_invariants()
            .map_err(|reason| RegistryError::InvalidDefinition {
                id: def.id.clone(),
                reason,
            })?;

        if let ValidatorKind::Composite { children } = &def.kind {
            for child in children {
                let resolves = *child == def.id || self.validators.iter().any(|v| v.id == *child);
                if !resolves {
                    return Err(RegistryError::UnknownChild {
                        id: def.id.clone(),
                        child: child.clone(),
                    });
                }
                if *child == def.id {
                    return Err(RegistryError::InvalidDefinition {
                        id: def.id.clone(),
                        reason: "composite validator cannot contain itself".to_string(),
                    });
                }
            }
        }

        match self.validators.iter_mut().find(|v| v.id == def.id) {
            Some(existing) => *existing = def,
            None => self.validators.push(def),
        }
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.validators.len();
        self.validators.retain(|v| v.id != id);
        self.validators.len() != before
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.validators.iter_mut().find(|v| v.id == id) {
            Some(def) => {
                def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ValidatorDefinition> {
        self.validators.iter().find(|v| v.id == id)
    }

    pub fn list(&self) -> &[ValidatorDefinition] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators applicable to a (trigger, context) pair, sorted by
    /// ascending priority. The sort is stable, so registration order breaks
    /// ties.
    pub fn applicable(&self, trigger: TriggerKind, ctx: &ValidationContext) -> Vec<ValidatorDefinition> {
        let mut applicable: Vec<ValidatorDefinition> = self
            .validators
            .iter()
            .filter(|def| def.enabled)
            .filter(|def| def.triggers.contains(&trigger))
            .filter(|def| {
                def.file_patterns.is_empty()
                    || patterns::any_file_matches(&def.file_patterns, &ctx.files)
            })
            .cloned()
            .collect();
        applicable.sort_by_key(|def| def.priority);
        applicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CandidateFile;
    use crate::validator::ValidatorKind;

    fn def(id: &str) -> ValidatorDefinition {
        ValidatorDefinition::new(
            id,
            id,
            ValidatorKind::Static {
                command: "true".to_string(),
            },
        )
        .with_trigger(TriggerKind::PreWrite)
    }

    fn ctx_with(paths: &[&str]) -> ValidationContext {
        let mut ctx = ValidationContext::new(TriggerKind::PreWrite, "s");
        for p in paths {
            ctx.files.push(CandidateFile::new(*p, ""));
        }
        ctx
    }

    #[test]
    fn test_register_and_get() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("a")).unwrap();
        assert!(reg.get("a").is_some());
        assert!(reg.get("b").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("a")).unwrap();
        reg.register(def("b")).unwrap();
        reg.register(def("a").with_priority(5)).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.list()[0].id, "a");
        assert_eq!(reg.list()[0].priority, 5);
    }

    #[test]
    fn test_register_rejects_invalid_definition() {
        let mut reg = ValidatorRegistry::new();
        let result = reg.register(def("bad").with_priority(-2));
        assert!(matches!(
            result,
            Err(RegistryError::InvalidDefinition { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_register_composite_requires_known_children() {
        let mut reg = ValidatorRegistry::new();
        let composite = ValidatorDefinition::new(
            "suite",
            "suite",
            ValidatorKind::Composite {
                children: vec!["missing".to_string()],
            },
        );
        assert!(matches!(
            reg.register(composite),
            Err(RegistryError::UnknownChild { .. })
        ));

        reg.register(def("child")).unwrap();
        let composite = ValidatorDefinition::new(
            "suite",
            "suite",
            ValidatorKind::Composite {
                children: vec!["child".to_string()],
            },
        );
        assert!(reg.register(composite).is_ok());
    }

    #[test]
    fn test_register_composite_rejects_self_reference() {
        let mut reg = ValidatorRegistry::new();
        let composite = ValidatorDefinition::new(
            "suite",
            "suite",
            ValidatorKind::Composite {
                children: vec!["suite".to_string()],
            },
        );
        assert!(reg.register(composite).is_err());
    }

    #[test]
    fn test_unregister() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("a")).unwrap();
        assert!(reg.unregister("a"));
        assert!(!reg.unregister("a"));
    }

    #[test]
    fn test_set_enabled() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("a")).unwrap();
        assert!(reg.set_enabled("a", false));
        assert!(!reg.get("a").unwrap().enabled);
        assert!(!reg.set_enabled("missing", false));
    }

    #[test]
    fn test_applicable_filters_disabled_and_trigger() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("a")).unwrap();
        reg.register(def("b").with_triggers([TriggerKind::PreCommit]))
            .unwrap();
        reg.register(def("c")).unwrap();
        reg.set_enabled("c", false);

        let ctx = ctx_with(&["x.ts"]);
        let applicable = reg.applicable(TriggerKind::PreWrite, &ctx);
        let ids: Vec<&str> = applicable.iter().map(|d| d.id.as_str()).collect();
        // "b" also has PreWrite from `def`, so only "c" (disabled) drops out.
        assert_eq!(ids, vec!["a", "b"]);

        let applicable = reg.applicable(TriggerKind::PreCommit, &ctx);
        let ids: Vec<&str> = applicable.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_applicable_filters_by_file_pattern() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("ts-only").with_file_pattern("**/*.ts"))
            .unwrap();
        reg.register(def("everything")).unwrap();

        let applicable = reg.applicable(TriggerKind::PreWrite, &ctx_with(&["src/a.rs"]));
        let ids: Vec<&str> = applicable.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["everything"]);

        let applicable = reg.applicable(TriggerKind::PreWrite, &ctx_with(&["src/a.ts"]));
        assert_eq!(applicable.len(), 2);
    }

    #[test]
    fn test_applicable_sorted_by_priority_stable() {
        let mut reg = ValidatorRegistry::new();
        reg.register(def("late").with_priority(50)).unwrap();
        reg.register(def("early").with_priority(10)).unwrap();
        reg.register(def("tie-1").with_priority(20)).unwrap();
        reg.register(def("tie-2").with_priority(20)).unwrap();

        let applicable = reg.applicable(TriggerKind::PreWrite, &ctx_with(&["a.ts"]));
        let ids: Vec<&str> = applicable.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "tie-1", "tie-2", "late"]);
    }
}
