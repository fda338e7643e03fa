//! HTTP request handlers, one module per resource.

pub mod channels;
pub mod credits;
pub mod cron;
pub mod health;
pub mod workflows;
