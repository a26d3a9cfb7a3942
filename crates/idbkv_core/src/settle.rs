//! One settle point per call.
//!
//! A host reports a call's outcome through several callbacks (request
//! success, request error, transaction complete, transaction error). Each of
//! them holds a clone of a [`Settle`]; the first one to fire delivers the
//! outcome and every later one is ignored.

use futures_channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;

/// Sending side, shared by every callback of one call.
pub(crate) struct Settle<T> {
    sender: Rc<RefCell<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Rc::clone(&self.sender),
        }
    }
}

/// Receiving side, awaited by the call.
pub(crate) struct Pending<T> {
    receiver: oneshot::Receiver<T>,
}

/// Every [`Settle`] was dropped without delivering an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dropped;

pub(crate) fn channel<T>() -> (Settle<T>, Pending<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Settle {
            sender: Rc::new(RefCell::new(Some(sender))),
        },
        Pending { receiver },
    )
}

impl<T> Settle<T> {
    /// Delivers `value` unless the call already settled or the caller
    /// stopped waiting, in which case `value` comes back.
    pub(crate) fn settle(&self, value: T) -> Result<(), T> {
        let sender = self.sender.borrow_mut().take();
        match sender {
            Some(sender) => sender.send(value),
            None => Err(value),
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.sender.borrow().is_none()
    }

    /// Whether the caller stopped waiting before anything was delivered.
    pub(crate) fn is_canceled(&self) -> bool {
        self.sender
            .borrow()
            .as_ref()
            .is_some_and(oneshot::Sender::is_canceled)
    }
}

impl<T> Pending<T> {
    pub(crate) async fn wait(self) -> Result<T, Dropped> {
        self.receiver.await.map_err(|_| Dropped)
    }
}
