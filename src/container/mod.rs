//! Allocation-free intrusive containers used to link fibers into the
//! scheduler's queues and into a synchronization primitive's wait list
//! without ever touching the heap on the hot path.

pub mod intrusive;
