//! Target resolution, bounded-parallel TCP-connect probing, and service
//! identification.

pub mod resolver;
pub mod service_id;
pub mod worker_pool;

pub use resolver::resolve;
pub use service_id::identify;
pub use worker_pool::{probe_ports, LiveParams, NullObserver, ProbeObserver};
