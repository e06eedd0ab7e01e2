//! Per-verification-context `@Id` registry.
//!
//! The source system kept this as a process-wide static; §9 calls that out
//! as a design smell and requires scoping it to a verification context
//! instead, reset explicitly before each verify rather than shared across
//! concurrent operations (§5: "there is one process-wide registry of XML
//! element `@Id` values maintained by the parse path; it must be reset
//! before each verify to avoid cross-document collisions").

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Tracks `@Id` values observed while parsing one document, and mints fresh
/// ones while building a new signature.
#[derive(Debug, Default)]
pub struct IdRegistry {
    seen: HashSet<String>,
}

impl IdRegistry {
    /// A fresh, empty registry — call this at the start of every `verify()`.
    pub fn new() -> Self {
        IdRegistry::default()
    }

    /// Discards all previously observed ids.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Registers an `@Id` observed during parsing; fails on collision.
    pub fn register(&mut self, id: &str) -> Result<()> {
        if !self.seen.insert(id.to_owned()) {
            return Err(Error::StructuralMismatch(format!(
                "duplicate @Id {:?} in document",
                id
            )));
        }
        Ok(())
    }

    /// Mints a fresh, registry-unique id of the form `{prefix}-{uuid}`.
    pub fn fresh_id(&mut self, prefix: &str) -> String {
        loop {
            let id = format!("{prefix}-{}", Uuid::new_v4());
            if self.seen.insert(id.clone()) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_is_rejected() {
        let mut reg = IdRegistry::new();
        reg.register("sig-1").unwrap();
        assert!(reg.register("sig-1").is_err());
    }

    #[test]
    fn reset_forgets_prior_ids() {
        let mut reg = IdRegistry::new();
        reg.register("sig-1").unwrap();
        reg.reset();
        assert!(reg.register("sig-1").is_ok());
    }

    #[test]
    fn fresh_ids_are_unique_and_prefixed() {
        let mut reg = IdRegistry::new();
        let a = reg.fresh_id("sig");
        let b = reg.fresh_id("sig");
        assert_ne!(a, b);
        assert!(a.starts_with("sig-"));
    }
}
