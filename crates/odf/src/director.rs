//! Process-wide blocking bookkeeping and deadlock resolution.
//!
//! The [`Director`] counts read-blocked and write-blocked processes against
//! the number of active processes. When every active process is blocked the
//! network is deadlocked. An *artificial* deadlock, caused only by the
//! time-ordering rule or by full queues, is resolved by advancing the global
//! time to the earliest pending time stamp and releasing exactly the receivers
//! waiting at that time. A *real* deadlock, with no finite pending time left,
//! ends the run: every registered receiver is asked to finish.

use core::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::ActorId;
use crate::receiver::{ReceiverConfig, ReceiverId, DEFAULT_CAPACITY};
use crate::sync::{Arc, Condvar, Mutex, Weak};
use crate::time::Time;
use crate::trace::{self, records, PayloadBuilder, TraceHook};

/// Configuration for a [`Director`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorConfig {
    pub name: String,
    /// Capacity of receivers created by [`Network::connect`](crate::Network::connect);
    /// `None` for unbounded queues.
    pub default_capacity: Option<usize>,
    /// Tokens stamped later than this time are queued as inactive markers.
    pub completion_time: Option<Time>,
    /// Stack size of process and branch threads; the platform default if unset.
    pub stack_size: Option<usize>,
    /// Artificial deadlocks resolved before the run is ended as a real one.
    pub max_artificial_deadlocks: Option<usize>,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            name: "odf".to_owned(),
            default_capacity: Some(DEFAULT_CAPACITY),
            completion_time: None,
            stack_size: None,
            max_artificial_deadlocks: None,
        }
    }
}

impl DirectorConfig {
    /// Creates a new director configuration builder.
    pub fn builder() -> DirectorConfigBuilder {
        DirectorConfigBuilder::default()
    }

    /// Receiver settings derived from this configuration.
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            capacity: self.default_capacity,
            completion_time: self.completion_time,
            ..ReceiverConfig::default()
        }
    }
}

/// Builder for ergonomic director configuration construction.
#[derive(Debug, Clone, Default)]
pub struct DirectorConfigBuilder {
    config: DirectorConfig,
}

impl DirectorConfigBuilder {
    /// Sets the director name used in log messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the capacity of receivers created with default settings.
    pub fn default_capacity(mut self, capacity: usize) -> Self {
        self.config.default_capacity = Some(capacity);
        self
    }

    /// Makes receivers created with default settings unbounded.
    pub fn unbounded_receivers(mut self) -> Self {
        self.config.default_capacity = None;
        self
    }

    /// Sets the completion time applied to every default receiver.
    pub fn completion_time(mut self, time: Time) -> Self {
        self.config.completion_time = Some(time);
        self
    }

    /// Sets the stack size of spawned threads.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Caps the number of artificial deadlocks resolved in one run.
    pub fn max_artificial_deadlocks(mut self, max: usize) -> Self {
        self.config.max_artificial_deadlocks = Some(max);
        self
    }

    /// Builds the director configuration.
    pub fn build(self) -> DirectorConfig {
        self.config
    }
}

/// What a blocked receiver waits for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockKind {
    Read,
    /// A writer waiting to append a token stamped `pending`.
    Write { pending: Time },
}

/// One registered block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub receiver: ReceiverId,
    pub kind: BlockKind,
}

impl Block {
    pub fn read(receiver: ReceiverId) -> Self {
        Self {
            receiver,
            kind: BlockKind::Read,
        }
    }

    pub fn write(receiver: ReceiverId, pending: Time) -> Self {
        Self {
            receiver,
            kind: BlockKind::Write { pending },
        }
    }
}

/// The view the director needs of a receiver to resolve deadlocks.
pub trait BlockableReceiver: Send + Sync {
    fn id(&self) -> ReceiverId;
    fn owner(&self) -> Option<ActorId>;
    fn block_state(&self) -> Option<BlockKind>;
    fn head_time(&self) -> Option<Time>;
    /// Advances a read-blocked receiver to `time`, makes it yield same-time
    /// ties and wakes its reader. Returns false if nobody was waiting.
    fn release_read(&self, time: Time) -> bool;
    /// Grants a write-blocked receiver one more slot and wakes its writer.
    fn release_write(&self) -> bool;
    fn request_finish(&self);
}

/// Result of [`Director::resolve_deadlock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlockResolution {
    /// Artificial deadlock: time advanced and the receivers pending at that
    /// time were released.
    Advanced(Time),
    /// Real deadlock: every receiver was asked to finish.
    Terminated,
}

impl fmt::Display for DeadlockResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced(time) => write!(f, "advanced to {time}"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

struct DirectorState {
    read_blocks: usize,
    write_blocks: usize,
    active: usize,
    current_time: Time,
    artificial_deadlocks: usize,
    real_deadlock: bool,
    stop_requested: bool,
    next_receiver: u32,
    receivers: Vec<Weak<dyn BlockableReceiver>>,
}

impl DirectorState {
    fn is_deadlocked(&self) -> bool {
        self.active > 0 && self.read_blocks + self.write_blocks >= self.active
    }
}

struct Snapshot {
    owner: Option<ActorId>,
    block: Option<BlockKind>,
    head: Option<Time>,
}

pub struct Director {
    config: DirectorConfig,
    state: Mutex<DirectorState>,
    cond: Condvar,
    trace: Option<TraceHook>,
}

impl Director {
    pub fn new(config: DirectorConfig) -> Arc<Self> {
        Self::with_trace_hook(config, None)
    }

    pub fn with_trace_hook(config: DirectorConfig, trace: Option<TraceHook>) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(DirectorState {
                read_blocks: 0,
                write_blocks: 0,
                active: 0,
                current_time: Time::ZERO,
                artificial_deadlocks: 0,
                real_deadlock: false,
                stop_requested: false,
                next_receiver: 0,
                receivers: Vec::new(),
            }),
            cond: Condvar::new(),
            trace,
        })
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn trace_hook(&self) -> Option<TraceHook> {
        self.trace.clone()
    }

    pub(crate) fn emit(&self, record_type: u8, payload: PayloadBuilder) {
        trace::emit(self.trace.as_ref(), record_type, payload);
    }

    pub(crate) fn next_receiver_id(&self) -> ReceiverId {
        let mut state = self.state.lock();
        let id = ReceiverId(state.next_receiver);
        state.next_receiver += 1;
        id
    }

    /// Tracks `receiver` for deadlock resolution without keeping it alive.
    pub fn register_receiver(&self, receiver: Weak<dyn BlockableReceiver>) {
        let mut state = self.state.lock();
        state.receivers.retain(|r| r.strong_count() > 0);
        state.receivers.push(receiver);
    }

    /// Resets the counters for a new run. Registered receivers are kept.
    pub fn initialize(&self) {
        let mut state = self.state.lock();
        state.read_blocks = 0;
        state.write_blocks = 0;
        state.active = 0;
        state.current_time = Time::ZERO;
        state.artificial_deadlocks = 0;
        state.real_deadlock = false;
        state.stop_requested = false;
        info!(
            "{}: initialized with {} receivers",
            self.config.name,
            state.receivers.len()
        );
        drop(state);
        self.emit(records::director::INITIALIZE, PayloadBuilder::new());
    }

    /// Checks that every block registered during the run was retracted.
    pub fn wrapup(&self) -> Result<()> {
        let state = self.state.lock();
        let (read, write) = (state.read_blocks, state.write_blocks);
        info!(
            "{}: wrapup at {} after {} artificial deadlocks",
            self.config.name, state.current_time, state.artificial_deadlocks
        );
        drop(state);
        if read != 0 || write != 0 {
            warn!(
                "{}: unbalanced blocks at wrapup ({read} read, {write} write)",
                self.config.name
            );
            return Err(Error::UnbalancedBlocks { read, write });
        }
        Ok(())
    }

    pub fn add_read_block(&self, receiver: ReceiverId) {
        self.add_block(Block::read(receiver));
    }

    pub fn remove_read_block(&self, receiver: ReceiverId) {
        self.remove_block(Block::read(receiver));
    }

    pub fn add_write_block(&self, receiver: ReceiverId, pending: Time) {
        self.add_block(Block::write(receiver, pending));
    }

    pub fn remove_write_block(&self, receiver: ReceiverId, pending: Time) {
        self.remove_block(Block::write(receiver, pending));
    }

    pub fn add_block(&self, block: Block) {
        let mut state = self.state.lock();
        let mut payload = PayloadBuilder::new();
        payload.push_receiver(block.receiver.0);
        let record_type = match block.kind {
            BlockKind::Read => {
                state.read_blocks += 1;
                records::block::READ
            }
            BlockKind::Write { pending } => {
                state.write_blocks += 1;
                payload.push_time(pending.to_wire());
                records::block::WRITE
            }
        };
        debug!(
            "{}: {} blocked on {:?} ({} read, {} write, {} active)",
            self.config.name,
            block.receiver,
            block.kind,
            state.read_blocks,
            state.write_blocks,
            state.active
        );
        drop(state);
        self.cond.notify_all();
        self.emit(record_type, payload);
    }

    pub fn remove_block(&self, block: Block) {
        let mut state = self.state.lock();
        let (counter, record_type) = match block.kind {
            BlockKind::Read => (&mut state.read_blocks, records::block::READ_RELEASE),
            BlockKind::Write { .. } => (&mut state.write_blocks, records::block::WRITE_RELEASE),
        };
        match counter.checked_sub(1) {
            Some(count) => *counter = count,
            None => warn!(
                "{}: release of {} without a matching block",
                self.config.name, block.receiver
            ),
        }
        debug!("{}: {} released", self.config.name, block.receiver);
        drop(state);
        self.cond.notify_all();
        let mut payload = PayloadBuilder::new();
        payload.push_receiver(block.receiver.0);
        self.emit(record_type, payload);
    }

    pub fn add_active_process(&self) {
        self.state.lock().active += 1;
        self.cond.notify_all();
    }

    pub fn remove_active_process(&self) {
        let mut state = self.state.lock();
        match state.active.checked_sub(1) {
            Some(active) => state.active = active,
            None => warn!("{}: no active process to remove", self.config.name),
        }
        drop(state);
        self.cond.notify_all();
    }

    pub fn read_blocks(&self) -> usize {
        self.state.lock().read_blocks
    }

    pub fn write_blocks(&self) -> usize {
        self.state.lock().write_blocks
    }

    pub fn active_processes(&self) -> usize {
        self.state.lock().active
    }

    /// True when at least one process is active and all of them are blocked.
    pub fn is_deadlocked(&self) -> bool {
        self.state.lock().is_deadlocked()
    }

    /// Waits until the network deadlocks or `timeout` elapses.
    pub fn wait_for_deadlock(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_deadlocked() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.is_deadlocked();
            }
        }
        true
    }

    pub fn current_time(&self) -> Time {
        self.state.lock().current_time
    }

    pub fn artificial_deadlocks(&self) -> usize {
        self.state.lock().artificial_deadlocks
    }

    pub fn is_real_deadlock(&self) -> bool {
        self.state.lock().real_deadlock
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.lock().stop_requested
    }

    /// Ends the run from outside: every receiver is asked to finish.
    pub fn request_stop(&self) {
        let receivers = {
            let mut state = self.state.lock();
            state.stop_requested = true;
            self.live_receivers(&mut state)
        };
        info!("{}: stop requested", self.config.name);
        for receiver in &receivers {
            receiver.request_finish();
        }
        self.cond.notify_all();
    }

    /// Resolves the current deadlock.
    ///
    /// The pending time of a write-blocked receiver is the time stamp waiting
    /// to be written. The pending time of a read-blocked receiver is the
    /// earliest finite head time among the receivers of the same actor.
    pub fn resolve_deadlock(&self) -> DeadlockResolution {
        let (receivers, limit_reached) = {
            let mut state = self.state.lock();
            let limit_reached = self
                .config
                .max_artificial_deadlocks
                .map_or(false, |max| state.artificial_deadlocks >= max);
            (self.live_receivers(&mut state), limit_reached)
        };

        let snapshots: Vec<Snapshot> = receivers
            .iter()
            .map(|r| Snapshot {
                owner: r.owner(),
                block: r.block_state(),
                head: r.head_time(),
            })
            .collect();

        let pending: Vec<Option<Time>> = snapshots
            .iter()
            .map(|snapshot| match snapshot.block {
                Some(BlockKind::Write { pending }) => Some(pending).filter(|t| t.is_finite()),
                Some(BlockKind::Read) => snapshot.owner.and_then(|owner| {
                    snapshots
                        .iter()
                        .filter(|sibling| sibling.owner == Some(owner))
                        .filter_map(|sibling| sibling.head)
                        .filter(|t| t.is_finite())
                        .min()
                }),
                None => None,
            })
            .collect();

        let earliest = pending.iter().flatten().min().copied();
        if limit_reached && earliest.is_some() {
            warn!(
                "{}: artificial deadlock limit reached, ending the run",
                self.config.name
            );
        }

        if let Some(time) = earliest.filter(|_| !limit_reached) {
            let mut released = 0usize;
            for ((receiver, snapshot), at) in receivers.iter().zip(&snapshots).zip(&pending) {
                if *at != Some(time) {
                    continue;
                }
                let woke = match snapshot.block {
                    Some(BlockKind::Write { .. }) => receiver.release_write(),
                    Some(BlockKind::Read) => receiver.release_read(time),
                    None => false,
                };
                if woke {
                    released += 1;
                }
            }

            if released > 0 {
                let mut state = self.state.lock();
                if time > state.current_time {
                    state.current_time = time;
                }
                state.artificial_deadlocks += 1;
                drop(state);
                info!(
                    "{}: artificial deadlock resolved at {time}, {released} receiver(s) released",
                    self.config.name
                );
                let mut payload = PayloadBuilder::new();
                payload
                    .push_time(time.to_wire())
                    .push_u32(u32::try_from(released).unwrap_or(u32::MAX));
                self.emit(records::director::TIME_ADVANCE, payload);
                return DeadlockResolution::Advanced(time);
            }
        }

        self.state.lock().real_deadlock = true;
        info!(
            "{}: real deadlock, terminating {} receivers",
            self.config.name,
            receivers.len()
        );
        self.emit(records::director::DEADLOCK, PayloadBuilder::new());
        for receiver in &receivers {
            receiver.request_finish();
        }
        self.emit(records::director::TERMINATE, PayloadBuilder::new());
        DeadlockResolution::Terminated
    }

    /// Runs until every active process ended, resolving deadlocks as they
    /// occur.
    pub fn supervise(&self) {
        let mut terminated = false;
        loop {
            {
                let mut state = self.state.lock();
                loop {
                    if state.active == 0 {
                        return;
                    }
                    if !terminated && state.is_deadlocked() {
                        break;
                    }
                    self.cond.wait(&mut state);
                }
            }
            terminated = self.resolve_deadlock() == DeadlockResolution::Terminated;
        }
    }

    fn live_receivers(&self, state: &mut DirectorState) -> Vec<Arc<dyn BlockableReceiver>> {
        state.receivers.retain(|r| r.strong_count() > 0);
        state.receivers.iter().filter_map(Weak::upgrade).collect()
    }
}
