//! Domain types shared by every warehouse demo crate.
//!
//! This crate has zero internal dependencies so it can be used by the store,
//! the alert engine, the pipeline runner and the binary alike.

pub mod alert;
pub mod channels;
pub mod domain;
pub mod error;
pub mod pipeline_run;
pub mod schema;
pub mod statements;
pub mod types;
