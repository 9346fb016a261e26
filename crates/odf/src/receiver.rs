//! Blocking, time-stamped rendezvous receivers.
//!
//! A [`RendezvousReceiver`] wraps a [`TimedReceiver`] in its own monitor.
//! Reads block until the receiver holds the highest ranked minimum time among
//! the receivers of the owning actor and a token is present; writes block
//! while the queue is full.
//!
//! Every blocking wait is registered with the [`Director`] (or, for branch
//! traffic, with the branch) before the thread suspends. The thread that ends
//! a wait, whether by putting, getting, releasing a deadlock or requesting
//! finish, retracts the waiter's block while it still holds the receiver
//! lock, so the director's counts are exact whenever it inspects them.

use core::fmt;

use log::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::branch::BranchLink;
use crate::director::{Block, BlockKind, BlockableReceiver, Director};
use crate::error::{Error, Result};
use crate::process::ActorId;
use crate::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use crate::time::Time;
use crate::time_keeper::{NullSink, ReadWaker, TimeKeeper, Turn};
use crate::timed_queue::TimedReceiver;
use crate::token::{TimedToken, Token};
use crate::triple::RcvrTimeTriple;

/// Capacity of receivers created without an explicit setting.
pub const DEFAULT_CAPACITY: usize = 1;

/// Non-owning handle naming a receiver.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReceiverId(pub u32);

impl ReceiverId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Per-receiver settings.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// `None` for an unbounded queue.
    pub capacity: Option<usize>,
    pub priority: i32,
    pub completion_time: Option<Time>,
    pub owner: Option<ActorId>,
    /// Read by a branch on the producer side of a boundary.
    pub producer: bool,
    /// Written by a branch on the consumer side of a boundary.
    pub consumer: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CAPACITY),
            priority: 0,
            completion_time: None,
            owner: None,
            producer: false,
            consumer: false,
        }
    }
}

impl ReceiverConfig {
    pub fn builder() -> ReceiverConfigBuilder {
        ReceiverConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiverConfigBuilder {
    config: ReceiverConfig,
}

impl ReceiverConfigBuilder {
    /// Starts from an existing configuration.
    pub fn from_config(config: ReceiverConfig) -> Self {
        Self { config }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.config.capacity = None;
        self
    }

    /// Higher priorities win same-time ties.
    pub fn priority(mut self, priority: i32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn completion_time(mut self, time: Time) -> Self {
        self.config.completion_time = Some(time);
        self
    }

    pub fn owner(mut self, owner: ActorId) -> Self {
        self.config.owner = Some(owner);
        self
    }

    pub fn producer_boundary(mut self) -> Self {
        self.config.producer = true;
        self
    }

    pub fn consumer_boundary(mut self) -> Self {
        self.config.consumer = true;
        self
    }

    pub fn build(self) -> ReceiverConfig {
        self.config
    }
}

/// Who is suspended on a receiver.
#[derive(Clone)]
pub(crate) enum Waiter {
    Process,
    Branch(Arc<BranchLink>),
}

struct ReceiverState<T> {
    queue: TimedReceiver<T>,
    priority: i32,
    owner: Option<ActorId>,
    producer: bool,
    consumer: bool,
    terminate: bool,
    yielded: bool,
    keeper: Option<Arc<TimeKeeper>>,
    read_waiter: Option<Waiter>,
    write_waiter: Option<(Waiter, Time)>,
}

impl<T> ReceiverState<T> {
    fn triple(&self, id: ReceiverId) -> RcvrTimeTriple {
        RcvrTimeTriple::new(id, self.queue.rcvr_time(), self.priority).yielded(self.yielded)
    }
}

pub struct RendezvousReceiver<T> {
    id: ReceiverId,
    director: Arc<Director>,
    state: Mutex<ReceiverState<T>>,
    cond: Condvar,
}

impl<T> std::fmt::Debug for RendezvousReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousReceiver").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<T: Send + 'static> RendezvousReceiver<T> {
    /// Creates a receiver and registers it with `director`.
    pub fn new(director: &Arc<Director>, config: ReceiverConfig) -> Arc<Self> {
        let id = director.next_receiver_id();
        let mut queue = TimedReceiver::new(id, config.capacity);
        queue.set_completion_time(config.completion_time);

        let receiver = Arc::new(Self {
            id,
            director: Arc::clone(director),
            state: Mutex::new(ReceiverState {
                queue,
                priority: config.priority,
                owner: config.owner,
                producer: config.producer,
                consumer: config.consumer,
                terminate: false,
                yielded: false,
                keeper: None,
                read_waiter: None,
                write_waiter: None,
            }),
            cond: Condvar::new(),
        });
        let weak = Arc::downgrade(&receiver);
        let weak: Weak<dyn BlockableReceiver> = weak;
        director.register_receiver(weak);
        receiver
    }

    /// Attaches the owning actor's time keeper, publishes this receiver's
    /// triple to it and lets the keeper wake this receiver's reader.
    pub fn bind(self: &Arc<Self>, keeper: &Arc<TimeKeeper>) -> Result<()> {
        let mut state = self.state.lock();
        keeper.update_rcvr_list(state.triple(self.id))?;
        let weak = Arc::downgrade(self);
        let input: Weak<dyn ReadWaker> = weak;
        keeper.add_input(self.id, input);
        state.keeper = Some(Arc::clone(keeper));
        Ok(())
    }
}

impl<T> RendezvousReceiver<T> {
    pub fn id(&self) -> ReceiverId {
        self.id
    }

    pub fn director(&self) -> &Arc<Director> {
        &self.director
    }

    pub fn priority(&self) -> i32 {
        self.state.lock().priority
    }

    /// Changes the tie-breaking priority. A reader of the same actor, on
    /// this receiver or a sibling, re-evaluates.
    pub fn set_priority(&self, priority: i32) {
        let mut state = self.state.lock();
        state.priority = priority;
        self.sync_keeper(&state);
        self.release_reader(&mut state);
        self.cond.notify_all();
        let keeper = state.keeper.clone();
        drop(state);
        self.wake_sibling_reader(keeper);
    }

    pub fn owner(&self) -> Option<ActorId> {
        self.state.lock().owner
    }

    pub fn set_owner(&self, owner: ActorId) {
        self.state.lock().owner = Some(owner);
    }

    pub fn is_producer_receiver(&self) -> bool {
        self.state.lock().producer
    }

    pub fn is_consumer_receiver(&self) -> bool {
        self.state.lock().consumer
    }

    pub fn has_room(&self) -> bool {
        self.state.lock().queue.has_room()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.state.lock().queue.capacity()
    }

    pub fn rcvr_time(&self) -> Time {
        self.state.lock().queue.rcvr_time()
    }

    pub fn last_put_time(&self) -> Time {
        self.state.lock().queue.last_put_time()
    }

    pub fn completion_time(&self) -> Option<Time> {
        self.state.lock().queue.completion_time()
    }

    pub fn set_completion_time(&self, time: Option<Time>) {
        self.state.lock().queue.set_completion_time(time);
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminate
    }

    pub fn is_read_blocked(&self) -> bool {
        self.state.lock().read_waiter.is_some()
    }

    pub fn is_write_blocked(&self) -> bool {
        self.state.lock().write_waiter.is_some()
    }

    pub fn time_keeper(&self) -> Option<Arc<TimeKeeper>> {
        self.state.lock().keeper.clone()
    }

    /// Returns true once this receiver may deliver a token to its actor.
    ///
    /// Blocks while this receiver holds the actor's earliest time but no
    /// token. Returns false when a sibling receiver goes first. Leading null
    /// tokens are consumed on the way and only advance the actor's time.
    pub fn has_token(&self) -> Result<bool> {
        self.await_token(&Waiter::Process)
    }

    /// Removes the head token. Call only after [`has_token`](Self::has_token)
    /// returned true.
    pub fn get(&self) -> Result<TimedToken<T>> {
        let mut state = self.state.lock();
        if state.terminate {
            return Err(Error::Terminated);
        }
        self.take(&mut state)
    }

    /// Appends a token, blocking while the queue is full.
    ///
    /// This moves a single token. Null flushing on the writer's other
    /// outputs belongs to the writing actor and runs in
    /// [`ProcessContext::send_at`](crate::ProcessContext::send_at); the
    /// receiver only knows its reader's time keeper.
    pub fn put(&self, token: Token<T>, time: Time) -> Result<Time> {
        self.put_with(token, time, &Waiter::Process)
    }

    pub fn put_null(&self, time: Time) -> Result<Time> {
        self.put_with(Token::Null, time, &Waiter::Process)
    }

    /// Asks every thread suspended on this receiver to stop.
    ///
    /// Waiters observe [`Error::Terminated`]; later reads and writes fail
    /// the same way until [`reset`](Self::reset).
    pub fn request_finish(&self) {
        let mut state = self.state.lock();
        if !state.terminate {
            debug!("receiver {}: finish requested", self.id);
        }
        state.terminate = true;
        self.release_reader(&mut state);
        self.release_writer(&mut state);
        self.cond.notify_all();
    }

    /// Prepares the receiver for a new run.
    ///
    /// Clears the terminate flag, queued tokens and the time keeper binding.
    /// Capacity, completion time and priority keep their configured values.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.release_reader(&mut state);
        self.release_writer(&mut state);
        state.terminate = false;
        state.yielded = false;
        state.keeper = None;
        state.queue.reset();
        self.cond.notify_all();
    }

    /// Notice that the writing side finished. Once drained the receiver
    /// reports [`Time::Inactive`].
    pub fn finish_producer(&self) {
        let mut state = self.state.lock();
        state.queue.finish_producer();
        if state.queue.is_empty() {
            self.release_reader(&mut state);
        }
        self.sync_keeper(&state);
        self.cond.notify_all();
        let keeper = state.keeper.clone();
        drop(state);
        self.wake_sibling_reader(keeper);
    }

    /// Branch read: blocks like [`has_token`](Self::has_token) but reports
    /// blocking to the branch. Null tokens are returned like data. Returns
    /// `None` once the producer finished and the queue drained.
    pub fn get_from_branch(&self, link: &Arc<BranchLink>) -> Result<Option<TimedToken<T>>> {
        let waiter = Waiter::Branch(Arc::clone(link));
        if !self.await_token(&waiter)? {
            return Ok(None);
        }
        let mut state = self.state.lock();
        if state.terminate {
            return Err(Error::Terminated);
        }
        let timed = state.queue.get()?;
        trace!("receiver {}: branch took token at {}", self.id, timed.time);
        self.sync_keeper(&state);
        self.release_writer(&mut state);
        self.cond.notify_all();
        Ok(Some(timed))
    }

    /// Branch write: blocks like [`put`](Self::put) but reports blocking to
    /// the branch. The time stamp is kept.
    pub fn put_from_branch(&self, timed: TimedToken<T>, link: &Arc<BranchLink>) -> Result<Time> {
        self.put_with(timed.token, timed.time, &Waiter::Branch(Arc::clone(link)))
    }

    fn await_token(&self, waiter: &Waiter) -> Result<bool> {
        let mut state = self.state.lock();
        loop {
            if state.terminate {
                return Err(Error::Terminated);
            }

            if let Some(keeper) = state.keeper.clone() {
                match keeper.evaluate(state.triple(self.id))? {
                    Turn::Finished => {
                        debug!("receiver {}: every input inactive", self.id);
                        state.terminate = true;
                        self.release_writer(&mut state);
                        self.cond.notify_all();
                        return Err(Error::Terminated);
                    }
                    Turn::Wait | Turn::Yield => return Ok(false),
                    Turn::Ready => {}
                }
            }

            match state.queue.front().map(|head| head.token.is_null()) {
                // branches relay nulls downstream
                Some(true) if matches!(waiter, Waiter::Branch(_)) => return Ok(true),
                Some(true) => {
                    let null = state.queue.get()?;
                    trace!("receiver {}: null token at {}", self.id, null.time);
                    if let Some(keeper) = &state.keeper {
                        keeper.advance_current_time(null.time);
                    }
                    self.release_writer(&mut state);
                    self.cond.notify_all();
                    continue;
                }
                Some(false) => return Ok(true),
                None if state.keeper.is_none() && state.queue.is_producer_finished() => {
                    return Ok(false);
                }
                None => {}
            }

            state.read_waiter = Some(waiter.clone());
            self.register(waiter, Block::read(self.id));
            while state.read_waiter.is_some() && !state.terminate {
                self.cond.wait(&mut state);
            }
        }
    }

    /// Removes the first data token, consuming the nulls ahead of it. When
    /// only nulls were queued they are still consumed and a blocked writer is
    /// released before `NoTokenAvailable` is returned.
    fn take(&self, state: &mut MutexGuard<'_, ReceiverState<T>>) -> Result<TimedToken<T>> {
        if state.queue.is_empty() {
            return Err(Error::NoTokenAvailable);
        }
        let mut taken = Err(Error::NoTokenAvailable);
        while !state.queue.is_empty() {
            let timed = state.queue.get()?;
            if let Some(keeper) = &state.keeper {
                keeper.advance_current_time(timed.time);
            }
            if !timed.token.is_null() {
                trace!("receiver {}: token taken at {}", self.id, timed.time);
                taken = Ok(timed);
                break;
            }
        }
        self.sync_keeper(state);
        self.release_writer(state);
        self.cond.notify_all();
        taken
    }

    fn put_with(&self, token: Token<T>, time: Time, waiter: &Waiter) -> Result<Time> {
        let mut state = self.state.lock();
        loop {
            if state.terminate {
                return Err(Error::Terminated);
            }
            if state.queue.has_room() {
                break;
            }
            let pending = state.queue.effective_time(time)?;
            state.write_waiter = Some((waiter.clone(), pending));
            self.register(waiter, Block::write(self.id, pending));
            while state.write_waiter.is_some() && !state.terminate {
                self.cond.wait(&mut state);
            }
        }

        let effective = state.queue.put(token, time)?;
        trace!("receiver {}: token put at {}", self.id, effective);
        state.yielded = false;
        if let Some(keeper) = &state.keeper {
            keeper.update_rcvr_list(state.triple(self.id))?;
        }
        self.release_reader(&mut state);
        self.cond.notify_all();
        let keeper = state.keeper.clone();
        drop(state);
        self.wake_sibling_reader(keeper);
        Ok(effective)
    }

    fn register(&self, waiter: &Waiter, block: Block) {
        match waiter {
            Waiter::Process => self.director.add_block(block),
            Waiter::Branch(link) => link.register_rcvr_blocked(block),
        }
    }

    fn retract(&self, waiter: &Waiter, block: Block) {
        match waiter {
            Waiter::Process => self.director.remove_block(block),
            Waiter::Branch(link) => link.register_rcvr_unblocked(),
        }
    }

    fn release_reader(&self, state: &mut ReceiverState<T>) {
        if let Some(waiter) = state.read_waiter.take() {
            self.retract(&waiter, Block::read(self.id));
        }
    }

    fn release_writer(&self, state: &mut ReceiverState<T>) {
        if let Some((waiter, pending)) = state.write_waiter.take() {
            self.retract(&waiter, Block::write(self.id, pending));
        }
    }

    /// Lets the actor's reader re-evaluate when it waits on a sibling that no
    /// longer heads the ranking. Call after releasing the state lock.
    fn wake_sibling_reader(&self, keeper: Option<Arc<TimeKeeper>>) {
        if let Some(keeper) = keeper {
            keeper.wake_reader_after(self.id);
        }
    }

    fn sync_keeper(&self, state: &ReceiverState<T>) {
        if let Some(keeper) = &state.keeper {
            if let Err(err) = keeper.update_rcvr_list(state.triple(self.id)) {
                warn!("receiver {}: {}", self.id, err);
            }
        }
    }
}

impl<T: Send> BlockableReceiver for RendezvousReceiver<T> {
    fn id(&self) -> ReceiverId {
        self.id
    }

    fn owner(&self) -> Option<ActorId> {
        self.state.lock().owner
    }

    fn block_state(&self) -> Option<BlockKind> {
        let state = self.state.lock();
        if state.read_waiter.is_some() {
            Some(BlockKind::Read)
        } else {
            state
                .write_waiter
                .as_ref()
                .map(|(_, pending)| BlockKind::Write { pending: *pending })
        }
    }

    fn head_time(&self) -> Option<Time> {
        self.state.lock().queue.peek_time()
    }

    fn release_read(&self, time: Time) -> bool {
        let mut state = self.state.lock();
        if state.read_waiter.is_none() {
            return false;
        }
        state.queue.advance_time(time);
        state.yielded = true;
        self.sync_keeper(&state);
        self.release_reader(&mut state);
        self.cond.notify_all();
        true
    }

    fn release_write(&self) -> bool {
        let mut state = self.state.lock();
        if state.write_waiter.is_none() {
            return false;
        }
        state.queue.grow_capacity();
        self.release_writer(&mut state);
        self.cond.notify_all();
        true
    }

    fn request_finish(&self) {
        RendezvousReceiver::request_finish(self);
    }
}

impl<T: Send> NullSink for RendezvousReceiver<T> {
    fn id(&self) -> ReceiverId {
        self.id
    }

    fn try_put_null(&self, time: Time) -> bool {
        let mut state = self.state.lock();
        if state.terminate || !state.queue.has_room() || !state.queue.lags(time) {
            return false;
        }
        if state.queue.put(Token::Null, time).is_err() {
            return false;
        }
        trace!("receiver {}: null token put at {}", self.id, time);
        self.sync_keeper(&state);
        self.release_reader(&mut state);
        self.cond.notify_all();
        let keeper = state.keeper.clone();
        drop(state);
        self.wake_sibling_reader(keeper);
        true
    }
}

impl<T: Send> ReadWaker for RendezvousReceiver<T> {
    fn wake_reader(&self) {
        let mut state = self.state.lock();
        if state.read_waiter.is_some() {
            trace!("receiver {}: reader woken to re-evaluate", self.id);
            self.release_reader(&mut state);
            self.cond.notify_all();
        }
    }
}
