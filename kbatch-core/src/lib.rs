//! kbatch Core
//!
//! Core types shared by the kbatch adapter and CLI.
//!
//! This crate contains:
//! - Job descriptors: what a caller asks to run (script + typed native bag)
//! - Job info: the normalized, backend-independent view of a job's state

pub mod domain;

pub use domain::descriptor::JobDescriptor;
pub use domain::job::{ConnectionInfo, JobInfo, JobState};
