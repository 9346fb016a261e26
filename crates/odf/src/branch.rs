//! Single-token relays across a composite-actor boundary.
//!
//! A [`Branch`] moves one token at a time from a producer boundary receiver
//! to a consumer boundary receiver, keeping its time stamp. Its thread blocks
//! inside those receivers like any process; the receivers report the blocking
//! to the branch, which forwards each transition exactly once to its
//! [`BranchController`](crate::BranchController).
//!
//! ## States
//!
//! ```text
//! Inactive --set_active(true)--> Active <--block/unblock--> Blocked
//!     ^                            |                           |
//!     +-------- stop / finish -----+---------------------------+
//! ```

use core::fmt;

use log::{debug, error, trace};

use crate::branch_controller::ControllerCore;
use crate::director::Block;
use crate::error::{Error, Result};
use crate::receiver::RendezvousReceiver;
use crate::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(pub u16);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

struct LinkState {
    active: bool,
    blocked: Option<Block>,
}

/// Blocking state of one branch, shared with the receivers it waits on.
pub struct BranchLink {
    id: BranchId,
    state: Mutex<LinkState>,
    controller: Weak<ControllerCore>,
}

impl BranchLink {
    pub(crate) fn new(id: BranchId, controller: Weak<ControllerCore>) -> Self {
        Self {
            id,
            state: Mutex::new(LinkState {
                active: false,
                blocked: None,
            }),
            controller,
        }
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    /// Records that the branch waits in a receiver. Repeated calls while
    /// already blocked are ignored.
    pub fn register_rcvr_blocked(&self, block: Block) {
        let mut state = self.state.lock();
        if state.blocked.is_some() {
            return;
        }
        state.blocked = Some(block);
        debug!("branch {}: blocked on {}", self.id, block.receiver);
        if let Some(controller) = self.controller.upgrade() {
            controller.branch_blocked(self.id, block);
        }
    }

    /// Records that the branch stopped waiting. Ignored when not blocked.
    pub fn register_rcvr_unblocked(&self) {
        let mut state = self.state.lock();
        if let Some(block) = state.blocked.take() {
            debug!("branch {}: unblocked", self.id);
            if let Some(controller) = self.controller.upgrade() {
                controller.branch_unblocked(self.id, block);
            }
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.state.lock().blocked.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    fn set_active(&self, active: bool) {
        let mut state = self.state.lock();
        if state.active == active {
            return;
        }
        state.active = active;
        if let Some(controller) = self.controller.upgrade() {
            if active {
                controller.branch_activated(self.id);
            } else {
                controller.branch_deactivated(self.id);
            }
        }
    }
}

pub struct Branch<T> {
    producer: Arc<RendezvousReceiver<T>>,
    consumer: Arc<RendezvousReceiver<T>>,
    link: Arc<BranchLink>,
}

impl<T: Send + 'static> Branch<T> {
    /// Joins a producer boundary receiver to a consumer boundary receiver.
    pub(crate) fn new(
        id: BranchId,
        producer: Arc<RendezvousReceiver<T>>,
        consumer: Arc<RendezvousReceiver<T>>,
        controller: Weak<ControllerCore>,
    ) -> Result<Self> {
        if !producer.is_producer_receiver() {
            return Err(Error::InvalidAction(format!(
                "branch {id}: receiver {} is not a producer receiver",
                producer.id()
            )));
        }
        if !consumer.is_consumer_receiver() {
            return Err(Error::InvalidAction(format!(
                "branch {id}: receiver {} is not a consumer receiver",
                consumer.id()
            )));
        }
        if Arc::ptr_eq(&producer, &consumer) {
            return Err(Error::InvalidAction(format!(
                "branch {id}: producer and consumer are the same receiver"
            )));
        }
        Ok(Self {
            producer,
            consumer,
            link: Arc::new(BranchLink::new(id, controller)),
        })
    }

    pub fn id(&self) -> BranchId {
        self.link.id()
    }

    pub fn producer(&self) -> &Arc<RendezvousReceiver<T>> {
        &self.producer
    }

    pub fn consumer(&self) -> &Arc<RendezvousReceiver<T>> {
        &self.consumer
    }

    pub fn is_active(&self) -> bool {
        self.link.is_active()
    }

    pub fn set_active(&self, active: bool) {
        self.link.set_active(active);
    }

    pub fn is_blocked(&self) -> bool {
        self.link.is_blocked()
    }

    pub fn register_rcvr_blocked(&self, block: Block) {
        self.link.register_rcvr_blocked(block);
    }

    pub fn register_rcvr_unblocked(&self) {
        self.link.register_rcvr_unblocked();
    }

    /// Moves one token across the boundary.
    ///
    /// Returns false once the producer side finished and drained; the notice
    /// is forwarded to the consumer and the branch goes inactive.
    pub fn transfer_token(&self) -> Result<bool> {
        let Some(timed) = self.producer.get_from_branch(&self.link)? else {
            debug!("branch {}: producer finished", self.id());
            self.consumer.finish_producer();
            self.set_active(false);
            return Ok(false);
        };
        trace!(
            "branch {}: {} -> {} at {}",
            self.id(),
            self.producer.id(),
            self.consumer.id(),
            timed.time
        );
        self.consumer.put_from_branch(timed, &self.link)?;
        Ok(true)
    }

    /// Transfers tokens while active. A finish request ends the loop
    /// cleanly; the consumer is told that no more tokens follow.
    pub fn run(&self) -> Result<()> {
        let mut outcome = Ok(());
        while self.is_active() {
            match self.transfer_token() {
                Ok(true) => {}
                Ok(false) => break,
                Err(Error::Terminated) => {
                    debug!("branch {}: terminated", self.id());
                    break;
                }
                Err(err) => {
                    error!("branch {}: {}", self.id(), err);
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.consumer.finish_producer();
        self.set_active(false);
        outcome
    }
}
