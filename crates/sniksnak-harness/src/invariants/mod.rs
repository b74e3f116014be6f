//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during a simulation,
//! whatever the store does. They are checked against [`SystemSnapshot`]s
//! taken from [`crate::SimParty`]s rather than against live sessions, so a
//! check always sees one consistent state.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SystemSnapshot::from_parties(vec![alice.snapshot(), bob.snapshot()]);
//! registry.assert_all(&snapshot, "after exchange");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    CursorMonotonicity, CursorTracksLog, InvalidRoomIsQuiet, LogOrdering, TranscriptAgreement,
};
pub use snapshot::{PartySnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against system state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard session invariant.
    ///
    /// - [`LogOrdering`]: `createdAt` strictly increasing, IDs unique
    /// - [`CursorTracksLog`]: cursor is the newest appended `createdAt`
    /// - [`CursorMonotonicity`]: the cursor never goes backwards
    /// - [`InvalidRoomIsQuiet`]: an invalid room never polls
    /// - [`TranscriptAgreement`]: parties in one room see the same history
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(LogOrdering);
        registry.add(CursorTracksLog);
        registry.add(CursorMonotonicity);
        registry.add(InvalidRoomIsQuiet);
        registry.add(TranscriptAgreement);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns every violation found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, failing the calling test on any violation.
    #[allow(clippy::panic, reason = "test helper that fails the calling test")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// [`Self::assert_all`] for a single party.
    pub fn assert_party(&self, party: &PartySnapshot, context: &str) {
        self.assert_all(&SystemSnapshot::single(party.clone()), context);
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&SystemSnapshot::empty()).is_ok());
    }
}
