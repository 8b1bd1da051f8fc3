pub mod clock;
pub mod probe;
pub mod resolver;
pub mod rotation;
pub mod scheduler;
pub mod ticker;
pub mod validator;
pub mod worker;

pub use scheduler::MonitorScheduler;
pub use worker::CheckWorker;

#[cfg(test)]
mod testing;
