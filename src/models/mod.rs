pub mod job;
pub mod kind;
pub mod output;
pub mod snapshot;
