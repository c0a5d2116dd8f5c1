//! Chart host widget and the handle lookup the engine uses.
//!
//! The host owns the chart instance and decides when it exists. Everyone else
//! gets a [`SlotProvider`], which holds only a weak reference to the host's
//! mount slot and re-reads it on every call.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::chart::ChartHandle;

/// Lookup for the live chart instance.
pub trait HandleProvider {
    /// The current instance, or `None` if the host has not mounted one.
    fn current(&self) -> Option<ChartHandle>;
}

type Slot = RefCell<Option<ChartHandle>>;

pub struct ChartHost {
    slot: Rc<Slot>,
    width: u32,
    height: u32,
    mounts: u32,
}

impl ChartHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
            width,
            height,
            mounts: 0,
        }
    }

    /// Create the chart instance if it does not exist yet.
    pub fn mount(&mut self) -> ChartHandle {
        if let Some(existing) = self.slot.borrow().as_ref() {
            return existing.clone();
        }
        let chart = ChartHandle::new(self.width, self.height);
        self.mounts += 1;
        log::debug!("chart mounted ({}x{}, mount #{})", self.width, self.height, self.mounts);
        *self.slot.borrow_mut() = Some(chart.clone());
        chart
    }

    /// Dispose of the instance. Returns false if nothing was mounted.
    pub fn unmount(&mut self) -> bool {
        match self.slot.borrow_mut().take() {
            Some(chart) => {
                chart.dispose();
                log::debug!("chart unmounted");
                true
            }
            None => false,
        }
    }

    /// Replace the instance with a fresh one.
    pub fn remount(&mut self) -> ChartHandle {
        self.unmount();
        self.mount()
    }

    pub fn is_mounted(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// How many instances this host has created.
    pub fn mount_count(&self) -> u32 {
        self.mounts
    }

    pub fn provider(&self) -> SlotProvider {
        SlotProvider {
            slot: Rc::downgrade(&self.slot),
        }
    }
}

impl HandleProvider for ChartHost {
    fn current(&self) -> Option<ChartHandle> {
        self.slot.borrow().clone()
    }
}

/// Weak view of a host's mount slot. Returns `None` once the host is gone.
#[derive(Clone)]
pub struct SlotProvider {
    slot: Weak<Slot>,
}

impl HandleProvider for SlotProvider {
    fn current(&self) -> Option<ChartHandle> {
        self.slot.upgrade().and_then(|slot| slot.borrow().clone())
    }
}

impl<P: HandleProvider + ?Sized> HandleProvider for Rc<P> {
    fn current(&self) -> Option<ChartHandle> {
        (**self).current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_absent_until_mount() {
        let mut host = ChartHost::new(800, 600);
        let provider = host.provider();
        assert!(provider.current().is_none());

        let chart = host.mount();
        let resolved = provider.current().unwrap();
        assert!(resolved.ptr_eq(&chart));
        assert_eq!(resolved.size(), (800, 600));
    }

    #[test]
    fn test_mount_is_idempotent() {
        let mut host = ChartHost::new(10, 10);
        let first = host.mount();
        let second = host.mount();
        assert!(first.ptr_eq(&second));
        assert_eq!(host.mount_count(), 1);
    }

    #[test]
    fn test_remount_gives_new_instance() {
        let mut host = ChartHost::new(10, 10);
        let provider = host.provider();
        let first = host.mount();
        let second = host.remount();

        assert!(!first.ptr_eq(&second));
        assert!(first.is_disposed());
        assert!(provider.current().unwrap().ptr_eq(&second));
        assert_eq!(host.mount_count(), 2);
    }

    #[test]
    fn test_unmount_clears_provider() {
        let mut host = ChartHost::new(10, 10);
        let provider = host.provider();
        host.mount();
        assert!(host.unmount());
        assert!(!host.unmount());
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_provider_after_host_dropped() {
        let provider = {
            let mut host = ChartHost::new(10, 10);
            host.mount();
            host.provider()
        };
        assert!(provider.current().is_none());
    }
}
