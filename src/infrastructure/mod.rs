//! Infrastructure layer - backend clients, connection management and logging

pub mod cache;
pub mod logging;
