pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod store;

pub use common::{MAX_QUANTITY, Money, ProductId, ReservationId, StockLine};
pub use error::{CatalogError, Result};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use product::{LineAvailability, Product, Release, ReleasedLine, Reservation, ReservedLine, StockCheck};
pub use store::{InventoryStore, merge_lines, validate_lines};
