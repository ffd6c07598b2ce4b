pub mod memory;
pub mod postgres;
pub mod rows;

pub use memory::InMemoryChargeStore;
pub use postgres::PgChargeStore;
