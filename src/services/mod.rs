pub mod backend;
pub mod envelope;
pub mod poller;
pub mod result;
pub mod retry;
pub mod submitter;
pub mod tracker;
