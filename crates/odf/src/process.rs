//! Actors and the threads that run them.
//!
//! Every actor runs on its own thread as a *process*: it is initialised,
//! fired and postfired until it declines to continue or is terminated, then
//! wound down. Actors see their inputs and outputs through a
//! [`ProcessContext`].

use core::fmt;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::director::Director;
use crate::error::{Error, Result};
use crate::receiver::RendezvousReceiver;
use crate::sync::{Arc, Weak};
use crate::time::Time;
use crate::time_keeper::{NullSink, TimeKeeper};
use crate::token::{TimedToken, Token};
use crate::trace::{records, PayloadBuilder};

/// Unique identifier for an actor within a network.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u16);

impl ActorId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Lifecycle implemented by application actors.
///
/// Returning [`Error::Terminated`] from any call (usually by propagating it
/// from a receiver with `?`) ends the process quietly.
pub trait Actor<T>: Send + 'static {
    fn initialize(&mut self, _ctx: &mut ProcessContext<T>) -> Result<()> {
        Ok(())
    }

    fn fire(&mut self, ctx: &mut ProcessContext<T>) -> Result<()>;

    /// Returns false to end the process after this iteration.
    fn postfire(&mut self, _ctx: &mut ProcessContext<T>) -> Result<bool> {
        Ok(true)
    }

    fn wrapup(&mut self, _ctx: &mut ProcessContext<T>) -> Result<()> {
        Ok(())
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// `postfire` returned false.
    Completed,
    /// The process observed a finish request.
    Terminated,
    Failed(Error),
    Panicked,
}

impl ProcessOutcome {
    /// True for the two ways a process ends normally.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

/// An actor's view of the network.
pub struct ProcessContext<T> {
    id: ActorId,
    name: String,
    inputs: Vec<Arc<RendezvousReceiver<T>>>,
    outputs: Vec<Arc<RendezvousReceiver<T>>>,
    keeper: Arc<TimeKeeper>,
    director: Arc<Director>,
}

impl<T: Send + 'static> ProcessContext<T> {
    pub fn new(
        id: ActorId,
        name: impl Into<String>,
        inputs: Vec<Arc<RendezvousReceiver<T>>>,
        outputs: Vec<Arc<RendezvousReceiver<T>>>,
        director: Arc<Director>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            inputs,
            outputs,
            keeper: Arc::new(TimeKeeper::new(id)),
            director,
        }
    }

    /// Resets and binds the input receivers to this actor's time keeper and
    /// registers the outputs for null flushing.
    ///
    /// Must run before any producer can write into the inputs.
    pub fn prepare(&self) -> Result<()> {
        for input in &self.inputs {
            input.reset();
            input.set_owner(self.id);
            input.bind(&self.keeper)?;
        }
        for output in &self.outputs {
            let weak = Arc::downgrade(output);
            let sink: Weak<dyn NullSink> = weak;
            self.keeper.add_output(sink);
        }
        Ok(())
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn director(&self) -> &Arc<Director> {
        &self.director
    }

    pub fn time_keeper(&self) -> &Arc<TimeKeeper> {
        &self.keeper
    }

    /// Time of the last token this actor consumed.
    pub fn current_time(&self) -> Time {
        self.keeper.current_time()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, index: usize) -> Result<&Arc<RendezvousReceiver<T>>> {
        self.inputs.get(index).ok_or_else(|| {
            Error::InvalidAction(format!("{}: no input {index}", self.name))
        })
    }

    pub fn output(&self, index: usize) -> Result<&Arc<RendezvousReceiver<T>>> {
        self.outputs.get(index).ok_or_else(|| {
            Error::InvalidAction(format!("{}: no output {index}", self.name))
        })
    }

    pub fn has_token(&self, index: usize) -> Result<bool> {
        self.input(index)?.has_token()
    }

    pub fn get(&self, index: usize) -> Result<TimedToken<T>> {
        self.input(index)?.get()
    }

    /// Takes the next token in time-stamp order across all inputs and
    /// returns it with the index of the input it came from.
    pub fn get_next(&self) -> Result<(usize, TimedToken<T>)> {
        loop {
            let next = self.keeper.highest_priority_receiver().ok_or_else(|| {
                Error::InvalidAction(format!("{}: actor has no inputs", self.name))
            })?;
            let index = self
                .inputs
                .iter()
                .position(|input| input.id() == next)
                .ok_or_else(|| {
                    Error::InvalidAction(format!("{}: receiver {next} is not an input", self.name))
                })?;
            let input = &self.inputs[index];
            if input.has_token()? {
                return Ok((index, input.get()?));
            }
        }
    }

    /// Sends `value` stamped with the actor's current time.
    pub fn send(&self, index: usize, value: T) -> Result<Time> {
        self.send_at(index, value, self.current_time())
    }

    /// Sends `value` stamped `delay` after the actor's current time. Fails
    /// with [`Error::InvalidTime`] when the delay is invalid or overflows.
    pub fn send_delayed(&self, index: usize, value: T, delay: f64) -> Result<Time> {
        self.send_at(index, value, self.current_time().delayed(delay)?)
    }

    /// Sends `value` stamped `time`, then flushes null tokens on the other
    /// outputs that lag the actor's current time.
    pub fn send_at(&self, index: usize, value: T, time: Time) -> Result<Time> {
        let output = self.output(index)?;
        let effective = output.put(Token::Data(value), time)?;
        self.keeper.send_out_null_tokens(Some(output.id()));
        Ok(effective)
    }

    fn finish_outputs(&self) {
        for output in &self.outputs {
            output.finish_producer();
        }
    }

    fn finish_inputs(&self) {
        for input in &self.inputs {
            input.request_finish();
        }
    }
}

/// An actor bound to its context, ready to run on a thread.
pub struct Process<T> {
    actor: Box<dyn Actor<T>>,
    ctx: ProcessContext<T>,
}

impl<T: Send + 'static> Process<T> {
    pub fn new(actor: Box<dyn Actor<T>>, ctx: ProcessContext<T>) -> Self {
        Self { actor, ctx }
    }

    pub fn context(&self) -> &ProcessContext<T> {
        &self.ctx
    }

    /// Runs the actor to completion and winds it down.
    ///
    /// The caller registers the process with the director before starting
    /// the thread; this deregisters it on exit.
    pub fn run(mut self) -> (ProcessOutcome, Time) {
        let director = Arc::clone(&self.ctx.director);
        let mut payload = PayloadBuilder::new();
        payload.push_u16(self.ctx.id.0);
        director.emit(records::process::START, payload);

        let executed = panic::catch_unwind(AssertUnwindSafe(|| self.execute()));
        let outcome = match executed {
            Ok(Ok(())) => ProcessOutcome::Completed,
            Ok(Err(Error::Terminated)) => {
                debug!("{}: terminated", self.ctx.name);
                ProcessOutcome::Terminated
            }
            Ok(Err(err)) => {
                error!("{}: {}", self.ctx.name, err);
                ProcessOutcome::Failed(err)
            }
            Err(_) => {
                error!("{}: panicked", self.ctx.name);
                ProcessOutcome::Panicked
            }
        };

        self.ctx.finish_outputs();
        match self.actor.wrapup(&mut self.ctx) {
            Ok(()) | Err(Error::Terminated) => {}
            Err(err) => error!("{}: wrapup failed: {}", self.ctx.name, err),
        }
        self.ctx.finish_inputs();

        let final_time = self.ctx.current_time();
        let mut payload = PayloadBuilder::new();
        payload.push_u16(self.ctx.id.0).push_time(final_time.to_wire());
        director.emit(records::process::END, payload);
        director.remove_active_process();
        (outcome, final_time)
    }

    fn execute(&mut self) -> Result<()> {
        self.actor.initialize(&mut self.ctx)?;
        loop {
            if self.ctx.director.is_stop_requested() {
                return Err(Error::Terminated);
            }
            self.actor.fire(&mut self.ctx)?;
            if !self.actor.postfire(&mut self.ctx)? {
                return Ok(());
            }
        }
    }
}
