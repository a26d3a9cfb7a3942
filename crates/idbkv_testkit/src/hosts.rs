//! Hosts that change when events are delivered.

use idbkv_host::{HostFactory, MemoryConnection, MemoryHost, OpenCallbacks};
use std::cell::RefCell;
use std::rc::Rc;

type ParkedOpen = (String, u32, OpenCallbacks<MemoryConnection>);

/// A [`MemoryHost`] whose open requests wait until [`DeferredHost::release`].
///
/// Lets a test look at a handle while its open is in flight, or abandon the
/// open before the host answers. Clones share the parked requests.
#[derive(Clone, Default)]
pub struct DeferredHost {
    memory: MemoryHost,
    parked: Rc<RefCell<Vec<ParkedOpen>>>,
}

impl DeferredHost {
    /// Defers the open requests sent to `memory`.
    pub fn new(memory: MemoryHost) -> Self {
        Self {
            memory,
            parked: Rc::default(),
        }
    }

    /// The engine requests are released to.
    pub fn memory(&self) -> &MemoryHost {
        &self.memory
    }

    /// Open requests waiting for release.
    pub fn parked(&self) -> usize {
        self.parked.borrow().len()
    }

    /// Hands every parked request to the engine, oldest first.
    pub fn release(&self) {
        let parked = std::mem::take(&mut *self.parked.borrow_mut());
        for (name, version, callbacks) in parked {
            self.memory.open(&name, version, callbacks);
        }
    }
}

impl HostFactory for DeferredHost {
    type Connection = MemoryConnection;

    fn open(&self, name: &str, version: u32, callbacks: OpenCallbacks<MemoryConnection>) {
        self.parked
            .borrow_mut()
            .push((name.to_string(), version, callbacks));
    }
}
