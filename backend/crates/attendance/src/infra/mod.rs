//! Infrastructure layer

pub mod memory;
pub mod postgres;
