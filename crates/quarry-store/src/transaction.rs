//! Transaction nesting state.
//!
//! The store runs BEGIN/COMMIT/ROLLBACK through its backend; this module
//! holds the bookkeeping that decides when those statements fire. Nested
//! `run_in_transaction` calls join the outer transaction instead of opening
//! a new one, and any failure anywhere in the nest poisons the whole
//! transaction: only a rollback can complete it.

/// What the caller must do to the database when leaving a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Inner scope ended; the outer transaction continues.
    Nested,
    /// Outermost scope ended cleanly; issue COMMIT.
    Commit,
    /// Outermost scope ended poisoned or failed; issue ROLLBACK.
    Rollback,
}

/// Depth counter plus rollback-only flag for one logical transaction.
#[derive(Debug, Default)]
pub struct TransactionState {
    depth: u32,
    rollback_only: bool,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a transaction scope. Returns `true` when this is the outermost
    /// scope and the caller must issue BEGIN.
    pub fn enter(&mut self) -> bool {
        self.depth += 1;
        self.depth == 1
    }

    /// Mark the transaction as unfit to commit.
    pub fn mark_rollback_only(&mut self) {
        if self.depth > 0 {
            self.rollback_only = true;
        }
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Leave the current scope.
    ///
    /// A failed inner scope marks the transaction rollback-only; the actual
    /// ROLLBACK happens when the outermost scope exits.
    pub fn exit(&mut self, success: bool) -> Completion {
        debug_assert!(self.depth > 0, "exit without matching enter");
        if !success {
            self.rollback_only = true;
        }
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return Completion::Nested;
        }
        let poisoned = self.rollback_only;
        self.rollback_only = false;
        if poisoned {
            Completion::Rollback
        } else {
            Completion::Commit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outermost_scope_begins_and_commits() {
        let mut tx = TransactionState::new();
        assert!(tx.enter());
        assert!(tx.is_active());
        assert_eq!(tx.exit(true), Completion::Commit);
        assert!(!tx.is_active());
    }

    #[test]
    fn nested_scope_joins_outer() {
        let mut tx = TransactionState::new();
        assert!(tx.enter());
        assert!(!tx.enter());
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.exit(true), Completion::Nested);
        assert_eq!(tx.exit(true), Completion::Commit);
    }

    #[test]
    fn inner_failure_poisons_outer_commit() {
        let mut tx = TransactionState::new();
        tx.enter();
        tx.enter();
        assert_eq!(tx.exit(false), Completion::Nested);
        assert!(tx.is_rollback_only());
        // Outer scope succeeded but the transaction is poisoned.
        assert_eq!(tx.exit(true), Completion::Rollback);
    }

    #[test]
    fn statement_error_marks_rollback_only() {
        let mut tx = TransactionState::new();
        tx.enter();
        tx.mark_rollback_only();
        assert!(tx.is_rollback_only());
        assert_eq!(tx.exit(true), Completion::Rollback);
    }

    #[test]
    fn rollback_only_resets_after_completion() {
        let mut tx = TransactionState::new();
        tx.enter();
        tx.mark_rollback_only();
        tx.exit(true);
        assert!(!tx.is_rollback_only());
        tx.enter();
        assert_eq!(tx.exit(true), Completion::Commit);
    }

    #[test]
    fn mark_outside_transaction_is_ignored() {
        let mut tx = TransactionState::new();
        tx.mark_rollback_only();
        assert!(!tx.is_rollback_only());
    }
}
