//! Connection state shared between a handle and its bound stores.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Lifecycle of a handle's connection.
///
/// `Closed -> Opening -> (Upgrading ->)? Open -> Closed`. A failed, blocked
/// or abandoned open returns to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Closed,
    /// Open requested, waiting for the host.
    Opening,
    /// The host is running the schema upgrade.
    Upgrading,
    /// Connection live; operations allowed.
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Opening => "opening",
            ConnectionState::Upgrading => "upgrading",
            ConnectionState::Open => "open",
        })
    }
}

/// The single connection slot of a handle.
///
/// Borrows of the slot never span a host call.
pub(crate) struct ConnectionSlot<C> {
    database: String,
    state: Cell<ConnectionState>,
    connection: RefCell<Option<Rc<C>>>,
}

impl<C> ConnectionSlot<C> {
    pub(crate) fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            state: Cell::new(ConnectionState::Closed),
            connection: RefCell::new(None),
        }
    }

    pub(crate) fn database(&self) -> &str {
        &self.database
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    pub(crate) fn connection(&self) -> Option<Rc<C>> {
        self.connection.borrow().clone()
    }

    pub(crate) fn install(&self, connection: Rc<C>) {
        *self.connection.borrow_mut() = Some(connection);
        self.state.set(ConnectionState::Open);
    }

    /// Empties the slot and marks it closed.
    pub(crate) fn take(&self) -> Option<Rc<C>> {
        let connection = self.connection.borrow_mut().take();
        self.state.set(ConnectionState::Closed);
        connection
    }
}

/// An open attempt in progress on a slot.
///
/// Marks the slot `Opening` on start. When dropped, puts the slot back to
/// `Closed` unless a connection was installed, so an attempt whose future
/// is dropped mid-flight cannot leave the slot half-open.
pub(crate) struct OpenAttempt<C> {
    slot: Rc<ConnectionSlot<C>>,
}

impl<C> OpenAttempt<C> {
    pub(crate) fn start(slot: Rc<ConnectionSlot<C>>) -> Self {
        slot.set_state(ConnectionState::Opening);
        Self { slot }
    }
}

impl<C> Drop for OpenAttempt<C> {
    fn drop(&mut self) {
        if self.slot.connection.borrow().is_none() {
            self.slot.set_state(ConnectionState::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_take() {
        let slot = ConnectionSlot::new("db");
        assert_eq!(slot.state(), ConnectionState::Closed);
        assert!(slot.connection().is_none());

        slot.set_state(ConnectionState::Opening);
        slot.install(Rc::new(7u8));
        assert_eq!(slot.state(), ConnectionState::Open);
        assert_eq!(slot.connection().as_deref(), Some(&7));

        assert_eq!(slot.take().as_deref(), Some(&7));
        assert_eq!(slot.state(), ConnectionState::Closed);
        assert!(slot.take().is_none());
    }

    #[test]
    fn abandoned_attempt_closes_the_slot() {
        let slot = Rc::new(ConnectionSlot::<u8>::new("db"));
        let attempt = OpenAttempt::start(Rc::clone(&slot));
        assert_eq!(slot.state(), ConnectionState::Opening);
        slot.set_state(ConnectionState::Upgrading);
        drop(attempt);
        assert_eq!(slot.state(), ConnectionState::Closed);
    }

    #[test]
    fn finished_attempt_keeps_the_connection() {
        let slot = Rc::new(ConnectionSlot::new("db"));
        let attempt = OpenAttempt::start(Rc::clone(&slot));
        slot.install(Rc::new(1u8));
        drop(attempt);
        assert_eq!(slot.state(), ConnectionState::Open);
    }
}
