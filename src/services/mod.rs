pub mod harvest;
pub mod startup;

pub use harvest::{StopSignalFailed, stop_and_harvest};
pub use startup::await_startup;
