//! The names most programs built on this crate need, re-exported flat so
//! `use fiber_rt::prelude::*;` covers spawning fibers, synchronizing them,
//! and passing values between them without hunting through the module
//! tree first.

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::future::{waitfor_all, waitfor_any, Future, FutureStatus, PackagedTask, Promise, SharedFuture};
pub use crate::scheduler::Scheduler;
pub use crate::spawn::{spawn, Builder, JoinHandle};
pub use crate::sync::channel::{BoundedChannel, UnboundedChannel};
pub use crate::sync::{Barrier, Condvar, Mutex, RecursiveMutex, TimedMutex};
pub use crate::this_fiber;
