//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p catalog --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use catalog::{
    CatalogError, InventoryStore, Money, PostgresInventoryStore, ProductId, ReservationId,
    StockLine,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/catalog/20260101000001_create_products.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresInventoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products, stock_releases RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryStore::new(pool)
}

async fn seed(store: &PostgresInventoryStore) -> (ProductId, ProductId) {
    let p1 = store
        .insert_product("PROD-001", "Laptop", Money::from_cents(1000), 10)
        .await
        .unwrap();
    let p2 = store
        .insert_product("PROD-002", "Mouse", Money::from_cents(500), 1)
        .await
        .unwrap();
    (p1.id, p2.id)
}

#[tokio::test]
async fn check_stock_reports_each_line() {
    let store = get_test_store().await;
    let (p1, p2) = seed(&store).await;

    let check = store
        .check_stock(&[
            StockLine::new(p1, 2),
            StockLine::new(p2, 2),
            StockLine::new(ProductId::new(999), 1),
        ])
        .await
        .unwrap();

    assert!(!check.all_available);
    assert!(check.items[0].available);
    assert_eq!(check.items[0].price, Some(Money::from_cents(1000)));
    assert!(!check.items[1].available);
    assert_eq!(check.items[2].reason.as_deref(), Some("Product not found"));
}

#[tokio::test]
async fn reserve_commits_all_lines() {
    let store = get_test_store().await;
    let (p1, p2) = seed(&store).await;

    let reservation = store
        .reserve_stock(
            ReservationId::new(),
            &[StockLine::new(p1, 2), StockLine::new(p2, 1)],
        )
        .await
        .unwrap();

    assert_eq!(reservation.products.len(), 2);
    let p1_after = store.get_product(p1).await.unwrap().unwrap();
    let p2_after = store.get_product(p2).await.unwrap().unwrap();
    assert_eq!(p1_after.stock_quantity, 8);
    assert_eq!(p2_after.stock_quantity, 0);
}

#[tokio::test]
async fn reserve_rolls_back_on_any_failing_line() {
    let store = get_test_store().await;
    let (p1, p2) = seed(&store).await;

    let err = store
        .reserve_stock(
            ReservationId::new(),
            &[StockLine::new(p1, 2), StockLine::new(p2, 5)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::InsufficientStock { product_id, .. } if product_id == p2));
    assert_eq!(store.get_product(p1).await.unwrap().unwrap().stock_quantity, 10);
    assert_eq!(store.get_product(p2).await.unwrap().unwrap().stock_quantity, 1);
}

#[tokio::test]
async fn reserve_reports_the_lowest_failing_product_id() {
    let store = get_test_store().await;
    let (_, p2) = seed(&store).await;

    // p2 is short and sorts before the unknown product
    let err = store
        .reserve_stock(
            ReservationId::new(),
            &[StockLine::new(ProductId::new(999), 1), StockLine::new(p2, 5)],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::InsufficientStock { product_id, requested: 5, available: 1 } if product_id == p2
    ));

    // The unknown product sorts before p2
    let err = store
        .reserve_stock(
            ReservationId::new(),
            &[StockLine::new(p2, 5), StockLine::new(ProductId::new(0), 1)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ProductNotFound(id) if id == ProductId::new(0)));
    assert_eq!(store.get_product(p2).await.unwrap().unwrap().stock_quantity, 1);
}

#[tokio::test]
async fn reserve_rejects_merged_quantity_past_the_bound() {
    let store = get_test_store().await;
    let big = store
        .insert_product("PROD-BIG", "Bulk", Money::from_cents(1), 5_000_000_000)
        .await
        .unwrap();

    let err = store
        .reserve_stock(
            ReservationId::new(),
            &[
                StockLine::new(big.id, 3_000_000_000),
                StockLine::new(big.id, 3_000_000_000),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::InvalidRequest(_)));
    assert_eq!(
        store.get_product(big.id).await.unwrap().unwrap().stock_quantity,
        5_000_000_000
    );
}

#[tokio::test]
async fn release_is_idempotent_per_reservation() {
    let store = get_test_store().await;
    let (p1, _) = seed(&store).await;
    let id = ReservationId::new();
    let lines = [StockLine::new(p1, 3)];

    store.reserve_stock(id, &lines).await.unwrap();
    let first = store.release_stock(Some(id), &lines).await.unwrap();
    let second = store.release_stock(Some(id), &lines).await.unwrap();

    assert!(!first.already_released);
    assert!(second.already_released);
    assert_eq!(store.get_product(p1).await.unwrap().unwrap().stock_quantity, 10);
}

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let (p1, _) = seed(&store).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve_stock(ReservationId::new(), &[StockLine::new(p1, 3)])
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(store.get_product(p1).await.unwrap().unwrap().stock_quantity, 1);
}

#[tokio::test]
async fn lookup_by_code_and_listing() {
    let store = get_test_store().await;
    let (p1, p2) = seed(&store).await;

    let mouse = store.get_product_by_code("PROD-002").await.unwrap().unwrap();
    assert_eq!(mouse.id, p2);

    let all = store.list_products().await.unwrap();
    assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![p1, p2]);
}
