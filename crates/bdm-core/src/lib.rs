pub mod config;
pub mod logging;

pub mod control;
pub mod job;
pub mod resume_record;
pub mod scheduler;
pub mod transfer;
pub mod url_model;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
