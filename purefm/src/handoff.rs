//! Lock-free delivery of patches from a control thread to the audio thread.
//!
//! The [PatchPublisher] lives on the control side and the [PatchReceiver] on
//! the audio side.  Publishing swaps a new `Arc<Patch>` into a shared slot;
//! the receiver picks it up with a single atomic load and pointer comparison.
//!
//! The publisher keeps a reference to every patch it has published until
//! nothing else refers to it.  The audio thread therefore never drops the last
//! reference to a patch, and never frees memory.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::patch::Patch;

/// Create a connected publisher/receiver pair with no patch published
pub fn patch_channel() -> (PatchPublisher, PatchReceiver) {
    let slot = Arc::new(ArcSwapOption::empty());
    (
        PatchPublisher {
            slot: slot.clone(),
            published: Vec::new(),
        },
        PatchReceiver { slot, used: None },
    )
}

/// The control side of a patch channel
pub struct PatchPublisher {
    slot: Arc<ArcSwapOption<Patch>>,
    published: Vec<Arc<Patch>>,
}

impl PatchPublisher {
    /// Publish a new patch
    pub fn publish(&mut self, patch: Patch) {
        self.publish_arc(Arc::new(patch));
    }

    /// Publish a patch that is already shared
    pub fn publish_arc(&mut self, patch: Arc<Patch>) {
        self.slot.store(Some(patch.clone()));
        self.published.push(patch);
        let freed = self.collect();
        log::debug!(
            "Published patch, {} retained, {} freed",
            self.published.len(),
            freed
        );
    }

    /// Withdraw the current patch.  Receivers will go silent.
    pub fn clear(&mut self) {
        self.slot.store(None);
        self.collect();
    }

    /// Free every published patch no longer referenced elsewhere, returning
    /// how many were freed.  Called on every publish; call it periodically
    /// to free patches the audio thread has since let go of.
    pub fn collect(&mut self) -> usize {
        let before = self.published.len();
        self.published.retain(|p| Arc::strong_count(p) > 1);
        let freed = before - self.published.len();
        if freed > 0 {
            log::trace!("Freed {} stale patches", freed);
        }
        freed
    }

    /// The number of patches still held on behalf of the receiver
    pub fn retained(&self) -> usize {
        self.published.len()
    }
}

/// The audio side of a patch channel
pub struct PatchReceiver {
    slot: Arc<ArcSwapOption<Patch>>,
    used: Option<Arc<Patch>>,
}

impl PatchReceiver {
    /// Check for a newly published patch.  Returns true (and makes it
    /// current) if the published patch differs from the current one.
    pub fn fetch(&mut self) -> bool {
        let guard = self.slot.load();
        let changed = match (&*guard, &self.used) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.used = (*guard).clone();
        }
        changed
    }

    /// The current patch, as of the last [PatchReceiver::fetch]
    pub fn current(&self) -> Option<&Patch> {
        self.used.as_deref()
    }

    /// A shared reference to the current patch
    pub fn snapshot(&self) -> Option<Arc<Patch>> {
        self.used.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, Engine, EngineConfig};

    #[test]
    fn fetch_sees_each_publish_once() {
        let (mut tx, mut rx) = patch_channel();
        assert!(!rx.fetch());
        assert!(rx.current().is_none());

        tx.publish(Patch::default());
        assert!(rx.fetch());
        assert!(!rx.fetch());
        assert_eq!(rx.current(), Some(&Patch::default()));

        let mono = Patch {
            mono: true,
            ..Default::default()
        };
        tx.publish(mono.clone());
        assert!(rx.fetch());
        assert_eq!(rx.current(), Some(&mono));

        tx.clear();
        assert!(rx.fetch());
        assert!(rx.current().is_none());
    }

    #[test]
    fn publisher_frees_patches() {
        let (mut tx, mut rx) = patch_channel();
        tx.publish(Patch::default());
        rx.fetch();
        let held = rx.snapshot();

        tx.publish(Patch::default());
        // the first is still referenced by the receiver and `held`
        assert_eq!(tx.retained(), 2);
        rx.fetch();
        assert_eq!(tx.collect(), 0);
        drop(held);
        assert_eq!(tx.collect(), 1);
        assert_eq!(tx.retained(), 1);
    }

    #[test]
    fn engine_sync_across_threads() {
        let (mut tx, mut rx) = patch_channel();
        let mut engine = Engine::new(Context::new(48000).unwrap(), EngineConfig::default());
        assert!(!engine.sync(&mut rx));

        let control = std::thread::spawn(move || {
            tx.publish(Patch::default());
            tx
        });
        let mut tx = control.join().unwrap();
        assert!(engine.sync(&mut rx));
        assert!(engine.patch().is_some());
        assert!(!engine.sync(&mut rx));

        // the engine and receiver keep the first patch alive
        tx.publish(Patch::default());
        assert_eq!(tx.retained(), 2);
        assert!(engine.sync(&mut rx));
        assert_eq!(tx.collect(), 1);
    }
}
