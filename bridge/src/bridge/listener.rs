//! Authentication prompt signalling for the host application.
//!
//! Hosts that obscure their UI when they lose focus can read this flag and
//! skip obfuscation while the OS shows its own authentication prompt.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared `will_prompt_for_authentication` flag.
///
/// Counts access-controlled calls in flight; the flag is up while any of them
/// is. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationListener {
    in_flight: Arc<AtomicUsize>,
}

impl AuthenticationListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn will_prompt_for_authentication(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn prompt(&self) -> PromptGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        PromptGuard {
            listener: self.clone(),
        }
    }
}

/// Releases one raise of the flag on drop.
#[derive(Debug)]
pub struct PromptGuard {
    listener: AuthenticationListener,
}

impl Drop for PromptGuard {
    fn drop(&mut self) {
        self.listener.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
