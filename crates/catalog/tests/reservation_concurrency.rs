//! Concurrent reservation tests against the in-memory store.

use std::sync::Arc;

use catalog::{
    CatalogError, InMemoryInventoryStore, InventoryStore, Money, Product, ProductId,
    ReservationId, StockLine,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reservations_never_oversell() {
    let store = Arc::new(InMemoryInventoryStore::with_products([Product::new(
        ProductId::new(1),
        "PROD-001",
        "Laptop",
        Money::from_cents(1000),
        10,
    )]));

    // 25 requests of 2 units race for 10 units
    let mut handles = Vec::new();
    for _ in 0..25 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve_stock(ReservationId::new(), &[StockLine::new(ProductId::new(1), 2)])
                .await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CatalogError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(rejected, 20);
    assert_eq!(store.stock_of(ProductId::new(1)).await, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overlapping_product_sets_do_not_deadlock_or_oversell() {
    let store = Arc::new(InMemoryInventoryStore::with_products([
        Product::new(ProductId::new(1), "PROD-001", "Laptop", Money::from_cents(1000), 20),
        Product::new(ProductId::new(2), "PROD-002", "Mouse", Money::from_cents(500), 20),
        Product::new(ProductId::new(3), "PROD-003", "Keyboard", Money::from_cents(700), 20),
    ]));

    // Requests list the same products in different orders
    let orderings = [
        vec![StockLine::new(ProductId::new(1), 1), StockLine::new(ProductId::new(2), 1), StockLine::new(ProductId::new(3), 1)],
        vec![StockLine::new(ProductId::new(3), 1), StockLine::new(ProductId::new(2), 1), StockLine::new(ProductId::new(1), 1)],
        vec![StockLine::new(ProductId::new(2), 1), StockLine::new(ProductId::new(3), 1), StockLine::new(ProductId::new(1), 1)],
    ];

    let mut handles = Vec::new();
    for i in 0..60 {
        let store = store.clone();
        let lines = orderings[i % orderings.len()].clone();
        handles.push(tokio::spawn(async move {
            store.reserve_stock(ReservationId::new(), &lines).await
        }));
    }

    let results = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        ok
    })
    .await
    .expect("reservations deadlocked");

    assert_eq!(results, 20);
    for id in 1..=3 {
        assert_eq!(store.stock_of(ProductId::new(id)).await, Some(0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_batches_leave_every_line_untouched_under_contention() {
    let store = Arc::new(InMemoryInventoryStore::with_products([
        Product::new(ProductId::new(1), "PROD-001", "Laptop", Money::from_cents(1000), 100),
        Product::new(ProductId::new(2), "PROD-002", "Mouse", Money::from_cents(500), 3),
    ]));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve_stock(
                    ReservationId::new(),
                    &[StockLine::new(ProductId::new(1), 5), StockLine::new(ProductId::new(2), 1)],
                )
                .await
        }));
    }

    let mut succeeded = 0u32;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    // Product 1 only lost stock for the batches that committed
    assert_eq!(
        store.stock_of(ProductId::new(1)).await,
        Some(100 - 5 * i64::from(succeeded))
    );
    assert_eq!(store.stock_of(ProductId::new(2)).await, Some(0));
}
