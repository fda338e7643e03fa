//! Database connection pool module.
//!
//! Provides async PostgreSQL connection pooling using diesel_async with bb8.

mod migrations;
mod pool;

pub use pool::{AsyncDbPool, DbConnection, MIGRATIONS, establish_async_connection_pool, get_connection};

pub use migrations::{pending_migrations, revert_migrations, run_pending_migrations};

#[cfg(test)]
pub use pool::lazy_pool;
