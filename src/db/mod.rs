//! SQLite persistence: schema/migrations and the repository implementing
//! the store traits.

mod migrations;
mod repo;

pub use migrations::init_db;
pub use repo::Repository;
