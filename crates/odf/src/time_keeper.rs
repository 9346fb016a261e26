//! Per-actor ranking of input receivers.
//!
//! A [`TimeKeeper`] is created when a process initialises and holds one
//! [`RcvrTimeTriple`] for every receiver the actor reads from. Receivers push
//! fresh triples whenever their time or tie state changes; the keeper decides
//! which of them may hand out a token next.
//!
//! The keeper also remembers the actor's output receivers so that null
//! tokens can be flushed downstream once the actor's time moves on.
//!
//! The actor reads on one receiver at a time. The keeper records that
//! receiver, and when a sibling takes over the head of the ranking the reader
//! is woken through [`ReadWaker`] so it re-evaluates instead of sleeping past
//! an eligible token.

use log::trace;

use crate::error::{Error, Result};
use crate::process::ActorId;
use crate::receiver::ReceiverId;
use crate::sync::{Mutex, Weak};
use crate::time::Time;
use crate::triple::RcvrTimeTriple;

/// Output side of a receiver as seen by the null-flush hook.
pub trait NullSink: Send + Sync {
    fn id(&self) -> ReceiverId;

    /// Queues a null token at `time` without blocking. Returns false when the
    /// receiver is full, terminated or already at or past `time`.
    fn try_put_null(&self, time: Time) -> bool;
}

/// Input side of a receiver as seen by the keeper.
pub trait ReadWaker: Send + Sync {
    /// Wakes a reader suspended on this receiver, retracting its block.
    fn wake_reader(&self);
}

/// Outcome of evaluating one receiver against its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// The receiver holds the highest ranked minimum time.
    Ready,
    /// Another receiver has an earlier time.
    Wait,
    /// The receiver is tied at the minimum time and lost the tie.
    Yield,
    /// Every receiver of the actor is inactive.
    Finished,
}

struct KeeperState {
    triples: Vec<RcvrTimeTriple>,
    current_time: Time,
    outputs: Vec<Weak<dyn NullSink>>,
    inputs: Vec<(ReceiverId, Weak<dyn ReadWaker>)>,
    /// Receiver the actor may be suspended on.
    reading: Option<ReceiverId>,
}

impl KeeperState {
    fn update(&mut self, triple: RcvrTimeTriple) -> Result<()> {
        match self
            .triples
            .iter_mut()
            .find(|t| t.receiver() == triple.receiver())
        {
            Some(existing) => {
                if triple.time() < existing.time() {
                    return Err(Error::TimeRegression {
                        receiver: triple.receiver(),
                        time: triple.time(),
                        last: existing.time(),
                    });
                }
                *existing = triple;
            }
            None => self.triples.push(triple),
        }
        Ok(())
    }

    fn resort(&mut self) {
        self.triples.sort_by(|a, b| a.rank(b));
    }
}

pub struct TimeKeeper {
    owner: ActorId,
    state: Mutex<KeeperState>,
}

impl TimeKeeper {
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            state: Mutex::new(KeeperState {
                triples: Vec::new(),
                current_time: Time::ZERO,
                outputs: Vec::new(),
                inputs: Vec::new(),
                reading: None,
            }),
        }
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn resort_rcvr_list(&self) {
        self.state.lock().resort();
    }

    /// Replaces the triple of the same receiver or inserts a new one.
    ///
    /// A triple whose time lies before the receiver's previous triple is
    /// rejected with [`Error::TimeRegression`].
    pub fn update_rcvr_list(&self, triple: RcvrTimeTriple) -> Result<()> {
        self.state.lock().update(triple)
    }

    /// Minimum time over all receivers, [`Time::Inactive`] when there are none.
    pub fn next_time(&self) -> Time {
        let mut state = self.state.lock();
        state.resort();
        state
            .triples
            .first()
            .map_or(Time::Inactive, RcvrTimeTriple::time)
    }

    /// True when exactly one receiver holds the minimum time.
    pub fn has_min_rcvr_time(&self) -> bool {
        let mut state = self.state.lock();
        state.resort();
        match state.triples.as_slice() {
            [] => false,
            [_] => true,
            [first, second, ..] => first.time() < second.time(),
        }
    }

    /// Highest ranked receiver among those at the minimum time.
    pub fn highest_priority_receiver(&self) -> Option<ReceiverId> {
        let mut state = self.state.lock();
        state.resort();
        state.triples.first().map(RcvrTimeTriple::receiver)
    }

    /// Records `triple` and decides whether its receiver may deliver.
    pub fn evaluate(&self, triple: RcvrTimeTriple) -> Result<Turn> {
        let mut state = self.state.lock();
        state.update(triple)?;
        state.resort();

        let head = state.triples[0];
        let turn = if head.time().is_inactive() {
            Turn::Finished
        } else if triple.time() > head.time() {
            Turn::Wait
        } else if head.receiver() != triple.receiver() {
            Turn::Yield
        } else {
            Turn::Ready
        };
        state.reading = (turn == Turn::Ready).then_some(triple.receiver());
        trace!(
            "actor {}: receiver {} at {} -> {:?}",
            self.owner,
            triple.receiver(),
            triple.time(),
            turn
        );
        Ok(turn)
    }

    pub fn triples(&self) -> Vec<RcvrTimeTriple> {
        let mut state = self.state.lock();
        state.resort();
        state.triples.clone()
    }

    pub fn current_time(&self) -> Time {
        self.state.lock().current_time
    }

    /// Moves the actor's time forward; earlier or non-finite times are ignored.
    pub fn advance_current_time(&self, time: Time) {
        let mut state = self.state.lock();
        if time.is_finite() && time > state.current_time {
            state.current_time = time;
        }
    }

    pub fn add_output(&self, output: Weak<dyn NullSink>) {
        self.state.lock().outputs.push(output);
    }

    /// Registers an input receiver so its reader can be woken. Registering
    /// the same receiver again replaces the earlier handle.
    pub fn add_input(&self, receiver: ReceiverId, input: Weak<dyn ReadWaker>) {
        let mut state = self.state.lock();
        state.inputs.retain(|(id, _)| *id != receiver);
        state.inputs.push((receiver, input));
    }

    /// Receiver the actor last evaluated as ready, if any.
    pub fn reading_receiver(&self) -> Option<ReceiverId> {
        self.state.lock().reading
    }

    /// Called after `changed` pushed a new triple. Wakes the reader when it
    /// waits on another receiver that no longer heads the ranking. Returns
    /// true if a reader was woken.
    ///
    /// Must be called without holding any receiver lock.
    pub fn wake_reader_after(&self, changed: ReceiverId) -> bool {
        let waker = {
            let mut state = self.state.lock();
            let Some(reading) = state.reading.filter(|id| *id != changed) else {
                return false;
            };
            state.resort();
            if state.triples.first().map(RcvrTimeTriple::receiver) == Some(reading) {
                return false;
            }
            state.reading = None;
            state
                .inputs
                .iter()
                .find(|(id, _)| *id == reading)
                .and_then(|(_, input)| input.upgrade())
        };
        match waker {
            Some(input) => {
                trace!("actor {}: head moved to {}, waking reader", self.owner, changed);
                input.wake_reader();
                true
            }
            None => false,
        }
    }

    /// Sends a null token at the current time on every output except
    /// `except` that lags behind it. Returns the number of nulls placed.
    pub fn send_out_null_tokens(&self, except: Option<ReceiverId>) -> usize {
        let (time, outputs) = {
            let state = self.state.lock();
            (state.current_time, state.outputs.clone())
        };
        if !time.is_finite() {
            return 0;
        }
        outputs
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|out| Some(out.id()) != except)
            .filter(|out| out.try_put_null(time))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Arc, Mutex as PlMutex};

    fn triple(id: u32, time: f64, priority: i32) -> RcvrTimeTriple {
        RcvrTimeTriple::new(ReceiverId(id), Time::new(time), priority)
    }

    #[test]
    fn keeps_one_triple_per_receiver() {
        let keeper = TimeKeeper::new(ActorId(0));
        keeper.update_rcvr_list(triple(1, 1.0, 0)).unwrap();
        keeper.update_rcvr_list(triple(1, 2.0, 0)).unwrap();
        keeper.update_rcvr_list(triple(2, 1.5, 0)).unwrap();

        let triples = keeper.triples();
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].receiver(), ReceiverId(2));
        assert_eq!(keeper.next_time(), Time::new(1.5));
        assert!(keeper.has_min_rcvr_time());
    }

    #[test]
    fn regressing_triple_fails_fast() {
        let keeper = TimeKeeper::new(ActorId(0));
        keeper.update_rcvr_list(triple(1, 4.0, 0)).unwrap();
        let err = keeper.update_rcvr_list(triple(1, 3.0, 0)).unwrap_err();
        assert_eq!(
            err,
            Error::TimeRegression {
                receiver: ReceiverId(1),
                time: Time::new(3.0),
                last: Time::new(4.0),
            }
        );
    }

    #[test]
    fn tie_goes_to_highest_priority() {
        let keeper = TimeKeeper::new(ActorId(0));
        keeper.update_rcvr_list(triple(1, 3.0, 5)).unwrap();
        keeper.update_rcvr_list(triple(2, 3.0, 10)).unwrap();

        assert!(!keeper.has_min_rcvr_time());
        assert_eq!(keeper.highest_priority_receiver(), Some(ReceiverId(2)));
        assert_eq!(keeper.evaluate(triple(1, 3.0, 5)).unwrap(), Turn::Yield);
        assert_eq!(keeper.evaluate(triple(2, 3.0, 10)).unwrap(), Turn::Ready);
    }

    #[test]
    fn later_receiver_waits_and_inactive_finishes() {
        let keeper = TimeKeeper::new(ActorId(0));
        keeper.update_rcvr_list(triple(1, 1.0, 0)).unwrap();
        assert_eq!(keeper.evaluate(triple(2, 2.0, 0)).unwrap(), Turn::Wait);

        let inactive = |id| RcvrTimeTriple::new(ReceiverId(id), Time::Inactive, 0);
        keeper.update_rcvr_list(inactive(1)).unwrap();
        assert_eq!(keeper.evaluate(inactive(2)).unwrap(), Turn::Finished);
    }

    #[test]
    fn current_time_only_moves_forward() {
        let keeper = TimeKeeper::new(ActorId(0));
        keeper.advance_current_time(Time::new(5.0));
        keeper.advance_current_time(Time::new(2.0));
        keeper.advance_current_time(Time::Inactive);
        assert_eq!(keeper.current_time(), Time::new(5.0));
    }

    struct RecordingSink {
        id: ReceiverId,
        nulls: PlMutex<Vec<Time>>,
    }

    impl NullSink for RecordingSink {
        fn id(&self) -> ReceiverId {
            self.id
        }

        fn try_put_null(&self, time: Time) -> bool {
            self.nulls.lock().push(time);
            true
        }
    }

    #[derive(Default)]
    struct CountingWaker {
        wakes: PlMutex<usize>,
    }

    impl ReadWaker for CountingWaker {
        fn wake_reader(&self) {
            *self.wakes.lock() += 1;
        }
    }

    #[test]
    fn reader_is_woken_when_a_sibling_takes_the_head() {
        let keeper = TimeKeeper::new(ActorId(0));
        let waker = Arc::new(CountingWaker::default());
        let input: Arc<dyn ReadWaker> = waker.clone();
        keeper.add_input(ReceiverId(2), Arc::downgrade(&input));

        keeper.update_rcvr_list(triple(1, 5.0, 5)).unwrap();
        assert_eq!(keeper.evaluate(triple(2, 5.0, 10)).unwrap(), Turn::Ready);
        assert_eq!(keeper.reading_receiver(), Some(ReceiverId(2)));

        // a later sibling leaves receiver 2 at the head
        keeper.update_rcvr_list(triple(1, 6.0, 5)).unwrap();
        assert!(!keeper.wake_reader_after(ReceiverId(1)));
        assert_eq!(*waker.wakes.lock(), 0);

        keeper.update_rcvr_list(triple(3, 4.0, 0)).unwrap();
        assert!(keeper.wake_reader_after(ReceiverId(3)));
        assert_eq!(*waker.wakes.lock(), 1);
        assert_eq!(keeper.reading_receiver(), None);
        assert!(!keeper.wake_reader_after(ReceiverId(3)));
    }

    #[test]
    fn null_flush_skips_the_sending_output() {
        let keeper = TimeKeeper::new(ActorId(0));
        let a = Arc::new(RecordingSink {
            id: ReceiverId(1),
            nulls: PlMutex::new(Vec::new()),
        });
        let b = Arc::new(RecordingSink {
            id: ReceiverId(2),
            nulls: PlMutex::new(Vec::new()),
        });
        let a_sink: Arc<dyn NullSink> = a.clone();
        let b_sink: Arc<dyn NullSink> = b.clone();
        keeper.add_output(Arc::downgrade(&a_sink));
        keeper.add_output(Arc::downgrade(&b_sink));
        keeper.advance_current_time(Time::new(4.0));

        assert_eq!(keeper.send_out_null_tokens(Some(ReceiverId(1))), 1);
        assert!(a.nulls.lock().is_empty());
        assert_eq!(*b.nulls.lock(), vec![Time::new(4.0)]);
    }
}
