//! Reactive Context
//!
//! The context stack tracks which derivation is currently running. This
//! enables automatic dependency tracking: when a signal is read, the
//! derivation on top of the stack is registered as its consumer.
//!
//! # Implementation
//!
//! Each runtime owns its own stack, so nothing here is process-global.
//! Before a derivation runs, its context is pushed; when it finishes, the
//! context is popped. Nested derivations (a derivation reading another one
//! that has to run first) therefore see strictly LIFO entries, and the top
//! of the stack is always the only active context.

use std::cell::RefCell;

use super::ContextKey;

/// The stack of running derivations.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    entries: RefCell<Vec<ContextKey>>,
}

impl ContextStack {
    /// Enter a context. The context is exited when the guard is dropped,
    /// including when the derivation panics.
    pub(crate) fn enter(&self, key: ContextKey) -> ContextGuard<'_> {
        self.entries.borrow_mut().push(key);
        ContextGuard { stack: self, key }
    }

    /// Check if any derivation is running.
    pub(crate) fn is_active(&self) -> bool {
        !self.entries.borrow().is_empty()
    }

    /// The context of the innermost running derivation, if any.
    pub(crate) fn current(&self) -> Option<ContextKey> {
        self.entries.borrow().last().copied()
    }

    pub(crate) fn depth(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Guard that pops the context when dropped.
pub(crate) struct ContextGuard<'a> {
    stack: &'a ContextStack,
    key: ContextKey,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.entries.borrow_mut().pop();

        // Verify we're popping the right context.
        debug_assert_eq!(
            popped,
            Some(self.key),
            "context stack mismatch: expected {:?}, got {:?}",
            self.key,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::panic::{self, AssertUnwindSafe};

    fn keys(n: usize) -> Vec<ContextKey> {
        let mut arena: SlotMap<ContextKey, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn context_tracks_current() {
        let stack = ContextStack::default();
        let key = keys(1)[0];

        assert!(!stack.is_active());
        assert!(stack.current().is_none());

        {
            let _ctx = stack.enter(key);

            assert!(stack.is_active());
            assert_eq!(stack.current(), Some(key));
        }

        // Context should be cleaned up after drop
        assert!(!stack.is_active());
        assert!(stack.current().is_none());
    }

    #[test]
    fn nested_contexts() {
        let stack = ContextStack::default();
        let keys = keys(2);

        {
            let _outer = stack.enter(keys[0]);
            assert_eq!(stack.current(), Some(keys[0]));

            {
                let _inner = stack.enter(keys[1]);
                assert_eq!(stack.current(), Some(keys[1]));
                assert_eq!(stack.depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(stack.current(), Some(keys[0]));
        }

        assert!(stack.current().is_none());
    }

    #[test]
    fn unwinding_restores_the_previous_context() {
        let stack = ContextStack::default();
        let keys = keys(2);

        let _outer = stack.enter(keys[0]);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _inner = stack.enter(keys[1]);
            panic!("derivation failed");
        }));

        assert!(result.is_err());
        assert_eq!(stack.current(), Some(keys[0]));
        assert_eq!(stack.depth(), 1);
    }
}
