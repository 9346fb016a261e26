//! Synchronization primitives used throughout the crate.
//!
//! Receivers, time keepers, branch controllers and the director are each
//! their own mutual-exclusion domain guarded by a `parking_lot` mutex; blocking
//! waits pair that mutex with a `Condvar`. The locks do not poison.

pub use parking_lot::{Condvar, Mutex, MutexGuard};
pub use std::sync::{Arc, Weak};
