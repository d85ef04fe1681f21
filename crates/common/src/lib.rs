//! Shared value types used by the catalog, ledger and saga crates.

pub mod ids;
pub mod money;
pub mod order_number;
pub mod stock;

pub use ids::{OrderId, ProductId, ReservationId};
pub use money::Money;
pub use order_number::OrderNumber;
pub use stock::{MAX_QUANTITY, ProductSnapshot, StockLine};
