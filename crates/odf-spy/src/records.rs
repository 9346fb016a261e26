//! Record identifiers shared between the execution core and trace consumers.

/// Process lifecycle records.
pub mod process {
    /// A process thread was started.
    pub const START: u8 = 1;
    /// A process thread left its fire loop.
    pub const END: u8 = 2;
}

/// Receiver blocking records.
pub mod block {
    /// A process or branch blocked reading an empty receiver.
    pub const READ: u8 = 16;
    /// A read block was retracted.
    pub const READ_RELEASE: u8 = 17;
    /// A process or branch blocked writing a full receiver.
    pub const WRITE: u8 = 18;
    /// A write block was retracted.
    pub const WRITE_RELEASE: u8 = 19;
}

/// Director (coordinator) records.
pub mod director {
    /// Every active process is blocked.
    pub const DEADLOCK: u8 = 32;
    /// An artificial deadlock was resolved by advancing time.
    pub const TIME_ADVANCE: u8 = 33;
    /// A real deadlock or a stop request terminated the model.
    pub const TERMINATE: u8 = 34;
    /// Block counters were reset at the start of a run.
    pub const INITIALIZE: u8 = 35;
}

/// Branch records.
pub mod branch {
    /// A branch became active.
    pub const ACTIVATED: u8 = 48;
    /// A branch reported one of its receivers blocked.
    pub const BLOCKED: u8 = 49;
    /// A branch reported its receiver unblocked.
    pub const UNBLOCKED: u8 = 50;
    /// A branch left its transfer loop.
    pub const DEACTIVATED: u8 = 51;
}
