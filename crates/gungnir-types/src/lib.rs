//! Configuration and error types shared by the Gungnir engine and the
//! surfaces built around it.

pub mod config;
pub mod constants;
pub mod error;
