//! Order ledger.
//!
//! Owns order and line-item records and the order status lifecycle:
//! - [`OrderLedger`] trait with in-memory and PostgreSQL implementations
//! - [`Order`], [`OrderItem`] and [`OrderStatus`]
//! - [`NewOrder`], the input of the atomic order + items insert

pub mod error;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod postgres;

pub use common::{MAX_QUANTITY, Money, OrderId, OrderNumber, ProductId, ProductSnapshot};
pub use error::{LedgerError, Result};
pub use ledger::OrderLedger;
pub use memory::InMemoryOrderLedger;
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use postgres::PostgresOrderLedger;
