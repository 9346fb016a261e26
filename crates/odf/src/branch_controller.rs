//! Owner of the branches crossing one boundary.

use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::branch::{Branch, BranchId};
use crate::director::{Block, Director};
use crate::error::{Error, Result};
use crate::receiver::RendezvousReceiver;
use crate::sync::{Arc, Mutex};
use crate::trace::{records, PayloadBuilder};

#[derive(Default)]
struct ControllerCounts {
    active: usize,
    blocked: usize,
}

/// Type-independent half of a controller, reachable from branch links.
pub(crate) struct ControllerCore {
    director: Arc<Director>,
    counts: Mutex<ControllerCounts>,
}

impl ControllerCore {
    pub(crate) fn branch_activated(&self, id: BranchId) {
        self.counts.lock().active += 1;
        self.emit(records::branch::ACTIVATED, id);
    }

    pub(crate) fn branch_deactivated(&self, id: BranchId) {
        let mut counts = self.counts.lock();
        counts.active = counts.active.saturating_sub(1);
        drop(counts);
        self.emit(records::branch::DEACTIVATED, id);
    }

    pub(crate) fn branch_blocked(&self, id: BranchId, block: Block) {
        self.counts.lock().blocked += 1;
        self.director.add_block(block);
        self.emit(records::branch::BLOCKED, id);
    }

    pub(crate) fn branch_unblocked(&self, id: BranchId, block: Block) {
        let mut counts = self.counts.lock();
        counts.blocked = counts.blocked.saturating_sub(1);
        self.director.remove_block(block);
        drop(counts);
        self.emit(records::branch::UNBLOCKED, id);
    }

    fn emit(&self, record_type: u8, id: BranchId) {
        let mut payload = PayloadBuilder::new();
        payload.push_u16(id.0);
        self.director.emit(record_type, payload);
    }
}

/// Spawns, counts and stops the branches of one boundary.
pub struct BranchController<T> {
    core: Arc<ControllerCore>,
    branches: Mutex<Vec<Arc<Branch<T>>>>,
    handles: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl<T: Send + 'static> BranchController<T> {
    pub fn new(director: &Arc<Director>) -> Self {
        Self {
            core: Arc::new(ControllerCore {
                director: Arc::clone(director),
                counts: Mutex::new(ControllerCounts::default()),
            }),
            branches: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn director(&self) -> &Arc<Director> {
        &self.core.director
    }

    /// Creates a branch from `producer` to `consumer`.
    ///
    /// Fails with [`Error::InvalidAction`] unless `producer` is flagged as a
    /// producer receiver, `consumer` as a consumer receiver, and the two
    /// differ.
    pub fn add_branch(
        &self,
        producer: Arc<RendezvousReceiver<T>>,
        consumer: Arc<RendezvousReceiver<T>>,
    ) -> Result<Arc<Branch<T>>> {
        let mut branches = self.branches.lock();
        let id = u16::try_from(branches.len())
            .map(BranchId)
            .map_err(|_| Error::InvalidAction("branch ids exhausted".into()))?;
        let branch = Arc::new(Branch::new(
            id,
            producer,
            consumer,
            Arc::downgrade(&self.core),
        )?);
        branches.push(Arc::clone(&branch));
        Ok(branch)
    }

    pub fn branches(&self) -> Vec<Arc<Branch<T>>> {
        self.branches.lock().clone()
    }

    /// Starts one thread per branch. Each branch counts as an active process
    /// with the director until its thread ends.
    pub fn activate_branches(&self) -> Result<()> {
        let director = &self.core.director;
        let mut handles = self.handles.lock();
        for branch in self.branches() {
            branch.set_active(true);
            director.add_active_process();

            let mut builder = thread::Builder::new().name(format!("branch-{}", branch.id().0));
            if let Some(stack_size) = director.config().stack_size {
                builder = builder.stack_size(stack_size);
            }
            let spawned = builder.spawn({
                let branch = Arc::clone(&branch);
                let director = Arc::clone(director);
                move || {
                    let outcome = branch.run();
                    director.remove_active_process();
                    outcome
                }
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    branch.set_active(false);
                    director.remove_active_process();
                    return Err(Error::Spawn(err.to_string()));
                }
            }
        }
        info!("{} branch(es) activated", handles.len());
        Ok(())
    }

    /// Marks every branch inactive. A branch leaves once its current transfer
    /// completes or its receivers are finished.
    pub fn deactivate_branches(&self) {
        for branch in self.branches() {
            branch.set_active(false);
        }
        debug!("branches deactivated");
    }

    /// Waits for every branch thread. Returns the number of branches that
    /// failed or panicked.
    pub fn join(&self) -> usize {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        handles
            .into_iter()
            .map(JoinHandle::join)
            .filter(|joined| match joined {
                Ok(Ok(())) => false,
                Ok(Err(_)) => true,
                Err(_) => {
                    error!("branch thread panicked");
                    true
                }
            })
            .count()
    }

    pub fn active_branches(&self) -> usize {
        self.core.counts.lock().active
    }

    pub fn blocked_branches(&self) -> usize {
        self.core.counts.lock().blocked
    }

    /// True when every active branch is blocked.
    pub fn is_blocked(&self) -> bool {
        let counts = self.core.counts.lock();
        counts.active > 0 && counts.blocked >= counts.active
    }
}
