//! Assembly and execution of a process network.

use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::branch::Branch;
use crate::branch_controller::BranchController;
use crate::director::{Director, DirectorConfig};
use crate::error::{Error, Result};
use crate::process::{Actor, ActorId, Process, ProcessContext, ProcessOutcome};
use crate::receiver::{ReceiverConfig, ReceiverConfigBuilder, RendezvousReceiver};
use crate::sync::Arc;
use crate::time::Time;
use crate::trace::TraceHook;

struct ActorSlot<T> {
    name: String,
    actor: Box<dyn Actor<T>>,
    inputs: Vec<Arc<RendezvousReceiver<T>>>,
    outputs: Vec<Arc<RendezvousReceiver<T>>>,
}

/// Per-actor summary of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorReport {
    pub id: ActorId,
    pub name: String,
    pub outcome: ProcessOutcome,
    pub final_time: Time,
}

/// Summary of [`Network::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Global time reached through deadlock resolution.
    pub final_time: Time,
    pub artificial_deadlocks: usize,
    pub real_deadlock: bool,
    pub actors: Vec<ActorReport>,
    pub failed_branches: usize,
}

impl RunReport {
    pub fn actor(&self, id: ActorId) -> Option<&ActorReport> {
        self.actors.iter().find(|report| report.id == id)
    }

    /// True when every actor ended without an error or panic.
    pub fn is_clean(&self) -> bool {
        self.failed_branches == 0 && self.actors.iter().all(|report| report.outcome.is_clean())
    }
}

/// Builder and runner for a network of actors connected by receivers.
pub struct Network<T> {
    director: Arc<Director>,
    controller: BranchController<T>,
    actors: Vec<ActorSlot<T>>,
    receivers: Vec<Arc<RendezvousReceiver<T>>>,
}

impl<T: Send + 'static> Network<T> {
    pub fn new(config: DirectorConfig) -> Self {
        Self::with_trace_hook(config, None)
    }

    pub fn with_trace_hook(config: DirectorConfig, trace: Option<TraceHook>) -> Self {
        let director = Director::with_trace_hook(config, trace);
        Self {
            controller: BranchController::new(&director),
            director,
            actors: Vec::new(),
            receivers: Vec::new(),
        }
    }

    pub fn director(&self) -> &Arc<Director> {
        &self.director
    }

    /// Adds an actor and returns its id. Fails with [`Error::InvalidAction`]
    /// once every 16-bit actor id is taken.
    pub fn add_actor(
        &mut self,
        name: impl Into<String>,
        actor: impl Actor<T>,
    ) -> Result<ActorId> {
        let id = u16::try_from(self.actors.len())
            .map(ActorId)
            .map_err(|_| Error::InvalidAction("actor ids exhausted".into()))?;
        self.actors.push(ActorSlot {
            name: name.into(),
            actor: Box::new(actor),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        Ok(id)
    }

    /// Connects the next output of `from` to the next input of `to` with a
    /// receiver built from the director's defaults. Inputs connected earlier
    /// win same-time ties.
    pub fn connect(&mut self, from: ActorId, to: ActorId) -> Result<Arc<RendezvousReceiver<T>>> {
        let priority = self.next_input_priority(to)?;
        let config = ReceiverConfigBuilder::from_config(self.director.config().receiver_config())
            .priority(priority)
            .build();
        self.connect_with(from, to, config)
    }

    /// Connects `from` to `to` with an explicit receiver configuration. The
    /// owner is always set to `to`.
    pub fn connect_with(
        &mut self,
        from: ActorId,
        to: ActorId,
        config: ReceiverConfig,
    ) -> Result<Arc<RendezvousReceiver<T>>> {
        self.slot(from)?;
        self.slot(to)?;
        let config = ReceiverConfigBuilder::from_config(config).owner(to).build();
        let receiver = RendezvousReceiver::new(&self.director, config);
        self.slot_mut(from)?.outputs.push(Arc::clone(&receiver));
        self.slot_mut(to)?.inputs.push(Arc::clone(&receiver));
        self.receivers.push(Arc::clone(&receiver));
        Ok(receiver)
    }

    /// Connects `from` to `to` across a boundary: `from` writes a producer
    /// receiver, a branch relays each token to a consumer receiver that `to`
    /// reads.
    pub fn connect_via_branch(&mut self, from: ActorId, to: ActorId) -> Result<Arc<Branch<T>>> {
        self.slot(from)?;
        let priority = self.next_input_priority(to)?;
        let defaults = self.director.config().receiver_config();

        let producer = RendezvousReceiver::new(
            &self.director,
            ReceiverConfigBuilder::from_config(defaults.clone())
                .producer_boundary()
                .build(),
        );
        let consumer = RendezvousReceiver::new(
            &self.director,
            ReceiverConfigBuilder::from_config(defaults)
                .consumer_boundary()
                .priority(priority)
                .owner(to)
                .build(),
        );
        let branch = self
            .controller
            .add_branch(Arc::clone(&producer), Arc::clone(&consumer))?;

        self.slot_mut(from)?.outputs.push(Arc::clone(&producer));
        self.slot_mut(to)?.inputs.push(Arc::clone(&consumer));
        self.receivers.push(producer);
        self.receivers.push(consumer);
        Ok(branch)
    }

    /// Runs every actor and branch on its own thread until all of them ended.
    pub fn run(self) -> Result<RunReport> {
        let Network {
            director,
            controller,
            actors,
            receivers,
        } = self;

        director.initialize();
        for receiver in &receivers {
            receiver.reset();
        }

        let mut processes = Vec::with_capacity(actors.len());
        for (index, slot) in actors.into_iter().enumerate() {
            let id = u16::try_from(index)
                .map(ActorId)
                .map_err(|_| Error::InvalidAction("actor ids exhausted".into()))?;
            let ctx = ProcessContext::new(
                id,
                slot.name.clone(),
                slot.inputs,
                slot.outputs,
                Arc::clone(&director),
            );
            ctx.prepare()?;
            processes.push((id, slot.name, Process::new(slot.actor, ctx)));
        }
        info!(
            "{}: running {} processes",
            director.config().name,
            processes.len()
        );

        let mut handles: Vec<(ActorId, String, JoinHandle<(ProcessOutcome, Time)>)> =
            Vec::with_capacity(processes.len());
        let mut spawn_error = None;
        for (id, name, process) in processes {
            director.add_active_process();
            let mut builder = thread::Builder::new().name(name.clone());
            if let Some(stack_size) = director.config().stack_size {
                builder = builder.stack_size(stack_size);
            }
            match builder.spawn(move || process.run()) {
                Ok(handle) => handles.push((id, name, handle)),
                Err(err) => {
                    director.remove_active_process();
                    spawn_error = Some(Error::Spawn(err.to_string()));
                    break;
                }
            }
        }
        if spawn_error.is_none() {
            if let Err(err) = controller.activate_branches() {
                spawn_error = Some(err);
            }
        }
        if let Some(err) = &spawn_error {
            error!("{}: {}", director.config().name, err);
            director.request_stop();
        }

        director.supervise();

        let actors: Vec<ActorReport> = handles
            .into_iter()
            .map(|(id, name, handle)| {
                let (outcome, final_time) = handle
                    .join()
                    .unwrap_or((ProcessOutcome::Panicked, Time::NotStarted));
                ActorReport {
                    id,
                    name,
                    outcome,
                    final_time,
                }
            })
            .collect();
        let failed_branches = controller.join();

        if let Some(err) = spawn_error {
            return Err(err);
        }
        director.wrapup()?;

        let report = RunReport {
            final_time: director.current_time(),
            artificial_deadlocks: director.artificial_deadlocks(),
            real_deadlock: director.is_real_deadlock(),
            actors,
            failed_branches,
        };
        info!(
            "{}: run finished at {} ({} artificial deadlocks, real deadlock: {})",
            director.config().name,
            report.final_time,
            report.artificial_deadlocks,
            report.real_deadlock
        );
        Ok(report)
    }

    fn next_input_priority(&self, to: ActorId) -> Result<i32> {
        Ok(-(self.slot(to)?.inputs.len() as i32))
    }

    fn slot(&self, id: ActorId) -> Result<&ActorSlot<T>> {
        self.actors
            .get(usize::from(id.0))
            .ok_or(Error::UnknownActor(id))
    }

    fn slot_mut(&mut self, id: ActorId) -> Result<&mut ActorSlot<T>> {
        self.actors
            .get_mut(usize::from(id.0))
            .ok_or(Error::UnknownActor(id))
    }
}
