//! Display handles for working images.
//!
//! Every working image gets one opaque handle while it is shown. A handle is
//! revoked exactly once, when its image is superseded or cleared.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayHandle(u64);

impl DisplayHandle {
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview://{}", self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    live: BTreeSet<u64>,
    revoked: u64,
}

/// Issues and revokes display handles. Cloning shares the registry.
#[derive(Clone, Debug, Default)]
pub struct PreviewRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> DisplayHandle {
        self.with_state(|state| {
            state.next_id += 1;
            let id = state.next_id;
            state.live.insert(id);
            DisplayHandle(id)
        })
    }

    /// Returns false when the handle was not live (already revoked or foreign).
    pub fn revoke(&self, handle: &DisplayHandle) -> bool {
        self.with_state(|state| {
            let removed = state.live.remove(&handle.0);
            if removed {
                state.revoked += 1;
            } else {
                log::warn!("display handle {} revoked twice or unknown", handle);
            }
            removed
        })
    }

    pub fn is_live(&self, handle: &DisplayHandle) -> bool {
        self.with_state(|state| state.live.contains(&handle.0))
    }

    pub fn live_count(&self) -> usize {
        self.with_state(|state| state.live.len())
    }

    pub fn revoked_count(&self) -> u64 {
        self.with_state(|state| state.revoked)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_revoked_once() {
        let registry = PreviewRegistry::new();
        let a = registry.issue();
        let b = registry.issue();
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);

        assert!(registry.revoke(&a));
        assert!(!registry.revoke(&a));
        assert!(!registry.is_live(&a));
        assert!(registry.is_live(&b));
        assert_eq!(registry.revoked_count(), 1);
        assert_eq!(a.uri(), "preview://1");
        assert_eq!(a.to_string(), a.uri());
    }
}
