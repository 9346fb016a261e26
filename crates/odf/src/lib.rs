//! # odf
//!
//! Execution core for time-stamped process networks: every actor runs on its
//! own thread and exchanges tokens with its neighbours only through blocking
//! receivers. Tokens carry time stamps, and an actor always consumes the
//! earliest pending token across its inputs, with per-receiver priorities
//! breaking same-time ties.
//!
//! ## Module Overview
//! - [`time`] and [`token`]: time stamps with their sentinels, tokens.
//! - [`timed_queue`]: the non-blocking queue discipline of a receiver.
//! - [`triple`] and [`time_keeper`]: per-actor ranking of input receivers.
//! - [`receiver`]: the blocking rendezvous receiver.
//! - [`branch`] and [`branch_controller`]: token relays across a boundary.
//! - [`director`]: block accounting, deadlock detection and resolution.
//! - [`process`] and [`network`]: actors, their threads, and the runner.
//!
//! Execution events are reported through an optional [`TraceHook`], usually
//! obtained from an [`odf_spy::TracerHandle`].

pub mod branch;
pub mod branch_controller;
pub mod director;
pub mod error;
pub mod network;
pub mod process;
pub mod receiver;
mod sync;
pub mod time;
pub mod time_keeper;
pub mod timed_queue;
pub mod token;
pub mod trace;
pub mod triple;

pub use branch::{Branch, BranchId, BranchLink};
pub use branch_controller::BranchController;
pub use director::{
    Block, BlockKind, BlockableReceiver, DeadlockResolution, Director, DirectorConfig,
    DirectorConfigBuilder,
};
pub use error::{Error, Result};
pub use network::{ActorReport, Network, RunReport};
pub use odf_spy::{
    decode_frame, MemoryBackend, SpyConfig, TraceBackend, TraceError, TraceHook, Tracer,
    TracerHandle,
};
pub use process::{Actor, ActorId, Process, ProcessContext, ProcessOutcome};
pub use receiver::{ReceiverConfig, ReceiverConfigBuilder, ReceiverId, RendezvousReceiver};
pub use time::Time;
pub use time_keeper::{NullSink, ReadWaker, TimeKeeper, Turn};
pub use timed_queue::TimedReceiver;
pub use token::{TimedToken, Token};
pub use triple::RcvrTimeTriple;

#[cfg(test)]
mod tests;
