pub mod controller;

pub use controller::{Bulkmail, INTERRUPTED_BY_SHUTDOWN, SHUTDOWN_BROADCAST, Service, drain};
