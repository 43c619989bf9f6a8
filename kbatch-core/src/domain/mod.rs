//! Core domain types
//!
//! These types describe jobs independently of how the adapter lays them out
//! as cluster objects. Descriptors flow in, job infos flow out.

pub mod descriptor;
pub mod job;
pub mod native;
