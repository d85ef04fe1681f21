//! Order creation saga.

use catalog::CatalogError;
use ledger::{NewOrder, NewOrderItem, Order, OrderLedger};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, PublishWarning};
use crate::services::{CatalogGateway, InvoiceQueue};
use crate::state::SagaStage;
use crate::{InvoiceJob, MAX_QUANTITY, ProductId, ReservationId, StockLine};

/// One requested line of a new order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderItem {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub quantity: i64,
}

impl PlaceOrderItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id: Some(product_id),
            quantity: i64::from(quantity),
        }
    }
}

/// A request to place an order, as received from a client.
///
/// Fields are permissive so that malformed requests reach validation and
/// fail with a descriptive message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<PlaceOrderItem>,
}

impl PlaceOrder {
    pub fn new(
        customer_id: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<PlaceOrderItem>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            items,
        }
    }

    /// Checks the request and returns trimmed customer fields and the lines.
    pub fn validate(&self) -> Result<(String, String, Vec<StockLine>), OrderError> {
        let customer_id = self.customer_id.trim();
        if customer_id.is_empty() {
            return Err(OrderError::Validation("customer_id is required".into()));
        }
        let customer_name = self.customer_name.trim();
        if customer_name.is_empty() {
            return Err(OrderError::Validation("customer_name is required".into()));
        }
        if self.items.is_empty() {
            return Err(OrderError::Validation(
                "At least one item is required".into(),
            ));
        }

        let lines = self
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let product_id = item.product_id.ok_or_else(|| {
                    OrderError::Validation(format!("Item {index}: product_id is required"))
                })?;
                if item.quantity < 1 {
                    return Err(OrderError::Validation(format!(
                        "Item {index}: quantity must be at least 1"
                    )));
                }
                let quantity = u32::try_from(item.quantity)
                    .ok()
                    .filter(|q| *q <= MAX_QUANTITY)
                    .ok_or_else(|| {
                        OrderError::Validation(format!(
                            "Item {index}: quantity must be at most {MAX_QUANTITY}"
                        ))
                    })?;
                Ok(StockLine::new(product_id, quantity))
            })
            .collect::<Result<Vec<_>, OrderError>>()?;

        // Every line is reserved under its merged total
        if StockLine::merge(&lines).is_none() {
            return Err(OrderError::Validation(format!(
                "Combined quantity for a product must be at most {MAX_QUANTITY}"
            )));
        }

        Ok((customer_id.to_string(), customer_name.to_string(), lines))
    }
}

/// A created order plus any non-fatal problems after it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPlacement {
    pub order: Order,
    pub warnings: Vec<PublishWarning>,
}

/// An undo action registered once a saga step commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Give back exactly what was reserved, under the same reservation ID.
    ReleaseStock {
        reservation_id: ReservationId,
        lines: Vec<StockLine>,
    },
}

/// Coordinates the catalog, the order ledger and the invoice queue into
/// one logical order creation.
///
/// There is no shared transaction. Each committed step pushes its undo
/// action; if a later step fails the actions run in reverse.
pub struct OrderOrchestrator<G, L, Q>
where
    G: CatalogGateway,
    L: OrderLedger,
    Q: InvoiceQueue,
{
    gateway: G,
    ledger: L,
    queue: Q,
}

impl<G, L, Q> OrderOrchestrator<G, L, Q>
where
    G: CatalogGateway,
    L: OrderLedger,
    Q: InvoiceQueue,
{
    /// Creates a new orchestrator.
    pub fn new(gateway: G, ledger: L, queue: Q) -> Self {
        Self {
            gateway,
            ledger,
            queue,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Places an order: validate, check stock, reserve, persist, publish.
    ///
    /// On success the order is `pending` with no document URL. A failed
    /// publish does not undo the order; it is reported in `warnings`.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<OrderPlacement, OrderError> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let mut stage = SagaStage::default();
        let result = self.run(request, &mut stage).await;

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        match &result {
            Ok(placement) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %placement.order.id,
                    order_number = %placement.order.order_number,
                    warnings = placement.warnings.len(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("saga_failed_total", "stage" => stage.as_str()).increment(1);
                tracing::warn!(
                    %stage,
                    reservation_held = stage.holds_reservation(),
                    error = %e,
                    "order placement failed"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        request: PlaceOrder,
        stage: &mut SagaStage,
    ) -> Result<OrderPlacement, OrderError> {
        let (customer_id, customer_name, lines) = request.validate()?;

        *stage = SagaStage::Check;
        let check = self
            .gateway
            .check_stock(&lines)
            .await
            .map_err(|e| Self::catalog_failure(SagaStage::Check, e))?;
        if !check.all_available {
            return Err(OrderError::Availability {
                unavailable: check.unavailable(),
            });
        }

        // Price and name come from the check and are frozen on the order
        if check.items.len() != lines.len() {
            return Err(OrderError::upstream(
                "catalog",
                "stock check returned a different number of lines",
            ));
        }
        let items = check
            .items
            .iter()
            .zip(&lines)
            .map(|(item, line)| item.snapshot().map(|s| NewOrderItem::new(s, line.quantity)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                OrderError::upstream("catalog", "stock check returned incomplete product data")
            })?;

        *stage = SagaStage::Reserve;
        let reservation_id = ReservationId::new();
        let reservation = self
            .gateway
            .reserve_stock(reservation_id, &lines)
            .await
            .map_err(|e| Self::catalog_failure(SagaStage::Reserve, e))?;
        tracing::debug!(%reservation_id, lines = reservation.products.len(), "stock reserved");

        let mut compensations = vec![Compensation::ReleaseStock {
            reservation_id,
            lines: lines.clone(),
        }];

        *stage = SagaStage::Persist;
        let order = match self
            .ledger
            .create_order(NewOrder::new(customer_id, customer_name, items))
            .await
        {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "failed to persist order, releasing stock");
                let compensated = self.compensate(&mut compensations).await;
                return Err(OrderError::Persistence {
                    reason: e.to_string(),
                    compensated,
                });
            }
        };

        *stage = SagaStage::Publish;
        let warnings = match self.publish(&order).await {
            Ok(()) => Vec::new(),
            Err(warning) => vec![warning],
        };

        *stage = SagaStage::Done;
        Ok(OrderPlacement { order, warnings })
    }

    /// Runs the registered compensations in reverse order. Returns true if
    /// all of them succeeded.
    async fn compensate(&self, compensations: &mut Vec<Compensation>) -> bool {
        let mut all_succeeded = true;

        while let Some(compensation) = compensations.pop() {
            metrics::counter!("saga_compensations_total").increment(1);
            match compensation {
                Compensation::ReleaseStock {
                    reservation_id,
                    lines,
                } => match self
                    .gateway
                    .release_stock(Some(reservation_id), &lines)
                    .await
                {
                    Ok(release) => {
                        tracing::info!(
                            %reservation_id,
                            already_released = release.already_released,
                            "reservation released"
                        );
                    }
                    Err(e) => {
                        all_succeeded = false;
                        metrics::counter!("saga_compensation_failures_total").increment(1);
                        tracing::error!(
                            %reservation_id,
                            error = %e,
                            "failed to release reservation, stock remains held"
                        );
                    }
                },
            }
        }

        all_succeeded
    }

    async fn publish(&self, order: &Order) -> Result<(), PublishWarning> {
        let sent = match InvoiceJob::from(order).to_body() {
            Ok(body) => self.queue.send(body).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        sent.map(|message_id| {
            tracing::debug!(order_id = %order.id, message_id, "invoice job enqueued");
        })
        .map_err(|reason| {
            metrics::counter!("publish_failures_total").increment(1);
            tracing::warn!(
                order_id = %order.id,
                error = %reason,
                "failed to enqueue invoice job, order stays pending"
            );
            PublishWarning {
                order_id: order.id,
                message: format!("Invoice job not enqueued: {reason}"),
            }
        })
    }

    fn catalog_failure(stage: SagaStage, err: CatalogError) -> OrderError {
        if err.is_unavailable() {
            return OrderError::upstream("catalog", err);
        }
        match err {
            CatalogError::InvalidRequest(message) => OrderError::Validation(message),
            err if stage == SagaStage::Reserve => OrderError::Reservation(err),
            err => OrderError::upstream("catalog", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryInvoiceQueue, LocalCatalogGateway};
    use catalog::{InMemoryInventoryStore, Money, Product};
    use ledger::{InMemoryOrderLedger, OrderStatus};

    type TestOrchestrator = OrderOrchestrator<
        LocalCatalogGateway<InMemoryInventoryStore>,
        InMemoryOrderLedger,
        InMemoryInvoiceQueue,
    >;

    fn setup() -> (
        TestOrchestrator,
        InMemoryInventoryStore,
        InMemoryOrderLedger,
        InMemoryInvoiceQueue,
    ) {
        let store = InMemoryInventoryStore::with_products([
            Product::new(ProductId::new(1), "PROD-001", "Laptop", Money::from_cents(100_000), 5),
            Product::new(ProductId::new(2), "PROD-002", "Mouse", Money::from_cents(2_500), 10),
        ]);
        let ledger = InMemoryOrderLedger::new();
        let queue = InMemoryInvoiceQueue::new();
        let orchestrator = OrderOrchestrator::new(
            LocalCatalogGateway::new(store.clone()),
            ledger.clone(),
            queue.clone(),
        );
        (orchestrator, store, ledger, queue)
    }

    fn request(items: Vec<PlaceOrderItem>) -> PlaceOrder {
        PlaceOrder::new("cust-1", "Ada Lovelace", items)
    }

    #[test]
    fn test_validation_trims_and_rejects_blank_customer() {
        let err = PlaceOrder::new("  ", "Ada", vec![PlaceOrderItem::new(ProductId::new(1), 1)])
            .validate()
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(m) if m == "customer_id is required"));

        let (id, name, _) = PlaceOrder::new(" c1 ", " Ada ", vec![PlaceOrderItem::new(ProductId::new(1), 1)])
            .validate()
            .unwrap();
        assert_eq!((id.as_str(), name.as_str()), ("c1", "Ada"));
    }

    #[test]
    fn test_validation_rejects_bad_items() {
        assert!(matches!(request(vec![]).validate(), Err(OrderError::Validation(_))));

        let missing_product = request(vec![PlaceOrderItem {
            product_id: None,
            quantity: 1,
        }]);
        assert!(matches!(missing_product.validate(), Err(OrderError::Validation(_))));

        let zero = request(vec![PlaceOrderItem {
            product_id: Some(ProductId::new(1)),
            quantity: 0,
        }]);
        assert!(matches!(
            zero.validate(),
            Err(OrderError::Validation(m)) if m == "Item 0: quantity must be at least 1"
        ));

        let negative = request(vec![PlaceOrderItem {
            product_id: Some(ProductId::new(1)),
            quantity: -3,
        }]);
        assert!(matches!(negative.validate(), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_validation_bounds_quantities() {
        let at_bound = request(vec![PlaceOrderItem::new(ProductId::new(1), MAX_QUANTITY)]);
        assert!(at_bound.validate().is_ok());

        let past_bound = request(vec![PlaceOrderItem {
            product_id: Some(ProductId::new(1)),
            quantity: i64::from(MAX_QUANTITY) + 1,
        }]);
        assert!(matches!(
            past_bound.validate(),
            Err(OrderError::Validation(m)) if m.starts_with("Item 0: quantity must be at most")
        ));

        let merged_past_bound = request(vec![
            PlaceOrderItem::new(ProductId::new(1), MAX_QUANTITY),
            PlaceOrderItem::new(ProductId::new(2), 1),
            PlaceOrderItem::new(ProductId::new(1), 1),
        ]);
        assert!(matches!(
            merged_past_bound.validate(),
            Err(OrderError::Validation(m)) if m.starts_with("Combined quantity")
        ));
    }

    #[tokio::test]
    async fn test_huge_duplicate_lines_are_rejected_before_reserving() {
        let (orchestrator, store, ledger, queue) = setup();
        store
            .insert_product(Product::new(
                ProductId::new(3),
                "PROD-003",
                "Cable",
                Money::from_cents(1),
                5_000_000_000,
            ))
            .await;

        let err = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(3), 2_000_000_000),
                PlaceOrderItem::new(ProductId::new(3), 2_000_000_000),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(store.stock_of(ProductId::new(3)).await, Some(5_000_000_000));
        assert!(ledger.is_empty().await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_reserved_quantity_matches_ordered_quantity() {
        let (orchestrator, store, _, _) = setup();
        store
            .insert_product(Product::new(
                ProductId::new(3),
                "PROD-003",
                "Cable",
                Money::from_cents(1),
                5_000_000_000,
            ))
            .await;

        let placement = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(3), 1_500_000_000),
                PlaceOrderItem::new(ProductId::new(3), MAX_QUANTITY - 1_500_000_000),
            ]))
            .await
            .unwrap();

        let ordered: i64 = placement
            .order
            .items
            .iter()
            .map(|item| i64::from(item.quantity))
            .sum();
        assert_eq!(ordered, i64::from(MAX_QUANTITY));
        assert_eq!(
            store.stock_of(ProductId::new(3)).await,
            Some(5_000_000_000 - ordered)
        );
    }

    #[tokio::test]
    async fn test_reservation_names_first_failing_product() {
        let (orchestrator, store, _, _) = setup();
        // The check passes line by line; only the merged total is short
        let err = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(2), 6),
                PlaceOrderItem::new(ProductId::new(1), 4),
                PlaceOrderItem::new(ProductId::new(2), 6),
                PlaceOrderItem::new(ProductId::new(1), 4),
            ]))
            .await
            .unwrap_err();

        let OrderError::Reservation(e) = err else {
            panic!("expected reservation error, got {err:?}");
        };
        assert_eq!(e.product_id(), Some(ProductId::new(1)));
        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(5));
        assert_eq!(store.stock_of(ProductId::new(2)).await, Some(10));
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (orchestrator, store, ledger, queue) = setup();

        let placement = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(1), 2),
                PlaceOrderItem::new(ProductId::new(2), 3),
            ]))
            .await
            .unwrap();

        let order = placement.order;
        assert!(placement.warnings.is_empty());
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.pdf_url.is_none());
        assert_eq!(order.total_price, Money::from_cents(2 * 100_000 + 3 * 2_500));
        assert_eq!(order.total_price, order.items_total());
        assert!(order.order_number.is_well_formed());

        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(3));
        assert_eq!(store.stock_of(ProductId::new(2)).await, Some(7));
        assert_eq!(ledger.len().await, 1);

        let bodies = queue.bodies().await;
        assert_eq!(bodies.len(), 1);
        let job = InvoiceJob::from_body(&bodies[0]).unwrap();
        assert_eq!(job.order_id, order.id);
        assert_eq!(job.total_price, order.total_price);
    }

    #[tokio::test]
    async fn test_validation_failure_touches_nothing() {
        let (orchestrator, store, ledger, queue) = setup();

        let err = orchestrator
            .place_order(PlaceOrder::new("cust-1", "", vec![PlaceOrderItem::new(ProductId::new(1), 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(5));
        assert!(ledger.is_empty().await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable_lines_are_listed() {
        let (orchestrator, store, ledger, _) = setup();

        let err = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(1), 6),
                PlaceOrderItem::new(ProductId::new(2), 1),
                PlaceOrderItem::new(ProductId::new(99), 1),
            ]))
            .await
            .unwrap_err();

        let OrderError::Availability { unavailable } = err else {
            panic!("expected availability error, got {err:?}");
        };
        let ids: Vec<_> = unavailable.iter().map(|l| l.product_id).collect();
        assert_eq!(ids, vec![ProductId::new(1), ProductId::new(99)]);
        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(5));
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_persist_failure_releases_reserved_stock() {
        let (orchestrator, store, ledger, queue) = setup();
        ledger.set_fail_on_create(true);

        let err = orchestrator
            .place_order(request(vec![
                PlaceOrderItem::new(ProductId::new(1), 2),
                PlaceOrderItem::new(ProductId::new(2), 4),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Persistence { compensated: true, .. }));
        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(5));
        assert_eq!(store.stock_of(ProductId::new(2)).await, Some(10));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_reported() {
        let (orchestrator, store, ledger, _) = setup();
        ledger.set_fail_on_create(true);
        store.set_fail_on_release(true);

        let err = orchestrator
            .place_order(request(vec![PlaceOrderItem::new(ProductId::new(1), 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Persistence { compensated: false, .. }));
        // Stock stays held until someone retries the release
        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(3));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_the_order() {
        let (orchestrator, store, ledger, queue) = setup();
        queue.set_fail_on_send(true);

        let placement = orchestrator
            .place_order(request(vec![PlaceOrderItem::new(ProductId::new(2), 1)]))
            .await
            .unwrap();

        assert_eq!(placement.warnings.len(), 1);
        assert_eq!(placement.warnings[0].order_id, placement.order.id);
        assert_eq!(placement.order.status, OrderStatus::Pending);
        assert_eq!(ledger.len().await, 1);
        assert_eq!(store.stock_of(ProductId::new(2)).await, Some(9));
    }

    #[tokio::test]
    async fn test_catalog_outage_is_upstream_unavailable() {
        let (orchestrator, store, ledger, _) = setup();
        store.set_unavailable(true);

        let err = orchestrator
            .place_order(request(vec![PlaceOrderItem::new(ProductId::new(1), 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::UpstreamUnavailable { service: "catalog", .. }));
        assert!(ledger.is_empty().await);
    }
}
