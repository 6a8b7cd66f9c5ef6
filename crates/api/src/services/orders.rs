//! Order service.
//!
//! Every operation loads the order first and checks that the caller may see
//! it, so a missing or foreign order is reported as `NotFound` before any
//! input is validated or anything is written.

use chrono::Utc;
use thiserror::Error;

use koi_farm_core::{Capability, FishId, OrderId, authorize};

use crate::db::{FishStore, OrderStore, RepositoryError};
use crate::models::order::MAX_LINE_QUANTITY;
use crate::models::{CurrentUser, NewOrder, Order, OrderLine, OrderRuleError};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order doesn't exist or belongs to someone else.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// Referenced fish isn't in the catalog.
    #[error("fish {0} not found")]
    FishNotFound(FishId),

    /// Fish is listed but can't be ordered.
    #[error("fish {0} is not available")]
    FishUnavailable(FishId),

    /// Quantity outside `1..=max`.
    #[error("quantity must be between 1 and {max}")]
    InvalidQuantity { max: u32 },

    /// Business rule violated by the aggregate.
    #[error(transparent)]
    Rule(#[from] OrderRuleError),

    /// Caller's role can't place orders.
    #[error(transparent)]
    Forbidden(#[from] koi_farm_core::PermissionDenied),

    /// Someone else saved the order first.
    #[error("order {0} was modified concurrently, reload and retry")]
    Conflict(OrderId),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A requested line, as received from the client.
#[derive(Debug, Clone, Copy)]
pub struct OrderLineInput {
    pub fish_id: FishId,
    pub quantity: i64,
}

/// Order business logic over the order and fish stores.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    fish: &'a dyn FishStore,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore, fish: &'a dyn FishStore) -> Self {
        Self { orders, fish }
    }

    /// Fetch an order the caller may see.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order is missing or not visible to the caller.
    pub async fn get_order(&self, caller: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get_by_id(id)
            .await?
            .ok_or(OrderError::NotFound(id))?;

        let visible =
            order.is_owned_by(caller.id) || authorize(caller.role, Capability::ManageAnyOrder).is_ok();
        if !visible {
            tracing::debug!(order_id = %id, user_id = %caller.id, "Order hidden from non-owner");
            return Err(OrderError::NotFound(id));
        }
        Ok(order)
    }

    /// Orders visible to the caller, newest first.
    ///
    /// Customers see their own orders; staff and managers see all orders.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` on storage failure.
    pub async fn list_orders(&self, caller: &CurrentUser) -> Result<Vec<Order>, OrderError> {
        if authorize(caller.role, Capability::ManageAnyOrder).is_ok() {
            return Ok(self.orders.list_all().await?);
        }
        Ok(self.orders.list_by_customer(caller.id).await?)
    }

    /// Create a pending order owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns a validation `OrderError` if any line is invalid.
    pub async fn create_order(
        &self,
        caller: &CurrentUser,
        lines: Vec<OrderLineInput>,
    ) -> Result<Order, OrderError> {
        authorize(caller.role, Capability::PlaceOrder)?;

        let mut new_order = NewOrder::new(caller.id);
        for input in lines {
            new_order.add_line(self.priced_line(input).await?)?;
        }

        let order = self.orders.create(new_order).await?;
        tracing::info!(order_id = %order.id, user_id = %caller.id, lines = order.lines.len(), "Order created");
        Ok(order)
    }

    /// Add a fish to an order, merging with an existing line for that fish.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` first, then validation errors, then
    /// `OrderError::Rule(AlreadyPaid)` or `OrderError::Conflict`.
    pub async fn add_order_line(
        &self,
        caller: &CurrentUser,
        id: OrderId,
        input: OrderLineInput,
    ) -> Result<Order, OrderError> {
        let mut order = self.get_order(caller, id).await?;
        if order.status.is_paid() {
            return Err(OrderRuleError::AlreadyPaid.into());
        }

        let line = self.priced_line(input).await?;
        order.add_line(line)?;
        self.save(&order).await
    }

    /// Remove the line for `fish_id`. Missing lines are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `OrderError::Rule(AlreadyPaid)` or `OrderError::Conflict`.
    pub async fn remove_order_line(
        &self,
        caller: &CurrentUser,
        id: OrderId,
        fish_id: FishId,
    ) -> Result<(), OrderError> {
        let mut order = self.get_order(caller, id).await?;
        if !order.remove_line(fish_id)? {
            tracing::debug!(order_id = %id, fish_id = %fish_id, "No line to remove");
            return Ok(());
        }
        self.save(&order).await?;
        Ok(())
    }

    /// Mark an order as paid.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `OrderError::Rule(AlreadyPaid | EmptyOrder)`
    /// or `OrderError::Conflict`.
    pub async fn pay_for_order(&self, caller: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let mut order = self.get_order(caller, id).await?;
        order.mark_paid(Utc::now())?;
        let saved = self.save(&order).await?;
        tracing::info!(order_id = %id, total = %saved.total(), "Order paid");
        Ok(saved)
    }

    async fn priced_line(&self, input: OrderLineInput) -> Result<OrderLine, OrderError> {
        let quantity = u32::try_from(input.quantity)
            .ok()
            .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
            .ok_or(OrderError::InvalidQuantity {
                max: MAX_LINE_QUANTITY,
            })?;

        let fish = self
            .fish
            .get_by_id(input.fish_id)
            .await?
            .ok_or(OrderError::FishNotFound(input.fish_id))?;
        if !fish.available {
            return Err(OrderError::FishUnavailable(fish.id));
        }

        Ok(OrderLine {
            fish_id: fish.id,
            quantity,
            unit_price: fish.price,
        })
    }

    async fn save(&self, order: &Order) -> Result<Order, OrderError> {
        self.orders.save(order).await.map_err(|e| match e {
            RepositoryError::Conflict(reason) => {
                tracing::warn!(order_id = %order.id, %reason, "Stale order save rejected");
                OrderError::Conflict(order.id)
            }
            RepositoryError::NotFound => OrderError::NotFound(order.id),
            other => OrderError::Repository(other),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use koi_farm_core::{Price, Role, UserId, Username};

    use super::*;
    use crate::db::memory::{MemoryFishStore, MemoryOrderStore};
    use crate::models::NewFish;

    struct Fixture {
        orders: MemoryOrderStore,
        fish: MemoryFishStore,
    }

    impl Fixture {
        async fn new() -> Self {
            let fish = MemoryFishStore::default();
            for (name, price, available) in [
                ("Kohaku", 1200, true),
                ("Showa", 800, true),
                ("Tancho", 5000, false),
            ] {
                fish.upsert(NewFish {
                    name: name.to_owned(),
                    breed: name.to_owned(),
                    price: Price::new(Decimal::new(price, 0)).unwrap(),
                    image_url: None,
                    description: None,
                    available,
                })
                .await
                .unwrap();
            }
            Self {
                orders: MemoryOrderStore::default(),
                fish,
            }
        }

        fn service(&self) -> OrderService<'_> {
            OrderService::new(&self.orders, &self.fish)
        }
    }

    fn user(id: i32, role: Role) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            username: Username::parse(&format!("user{id}")).unwrap(),
            role,
        }
    }

    fn line(fish: i32, quantity: i64) -> OrderLineInput {
        OrderLineInput {
            fish_id: FishId::new(fish),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_add_then_remove_line() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);

        let order = svc.create_order(&alice, vec![]).await.unwrap();
        let updated = svc.add_order_line(&alice, order.id, line(1, 2)).await.unwrap();
        assert_eq!(updated.lines.len(), 1);
        assert_eq!(updated.lines[0].quantity, 2);
        assert_eq!(updated.total(), Price::new(Decimal::new(2400, 0)).unwrap());

        svc.remove_order_line(&alice, order.id, FishId::new(1)).await.unwrap();
        let fetched = svc.get_order(&alice, order.id).await.unwrap();
        assert!(fetched.lines.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found_without_writes() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);
        let missing = OrderId::new(404);

        assert!(matches!(svc.get_order(&alice, missing).await, Err(OrderError::NotFound(_))));
        assert!(matches!(
            svc.add_order_line(&alice, missing, line(1, 1)).await,
            Err(OrderError::NotFound(_))
        ));
        assert!(matches!(
            svc.add_order_line(&alice, missing, line(999, 0)).await,
            Err(OrderError::NotFound(_))
        ));
        assert!(matches!(
            svc.remove_order_line(&alice, missing, FishId::new(1)).await,
            Err(OrderError::NotFound(_))
        ));
        assert!(matches!(svc.pay_for_order(&alice, missing).await, Err(OrderError::NotFound(_))));
        assert!(fx.orders.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_order_hidden_from_customer_but_visible_to_staff() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);
        let bob = user(2, Role::Customer);
        let sam = user(3, Role::Staff);

        let order = svc.create_order(&alice, vec![line(2, 1)]).await.unwrap();
        assert!(matches!(svc.get_order(&bob, order.id).await, Err(OrderError::NotFound(_))));
        assert!(svc.get_order(&sam, order.id).await.is_ok());
        assert_eq!(svc.list_orders(&bob).await.unwrap().len(), 0);
        assert_eq!(svc.list_orders(&sam).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_line_validation() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);
        let order = svc.create_order(&alice, vec![]).await.unwrap();

        assert!(matches!(
            svc.add_order_line(&alice, order.id, line(1, 0)).await,
            Err(OrderError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            svc.add_order_line(&alice, order.id, line(1, -3)).await,
            Err(OrderError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            svc.add_order_line(&alice, order.id, line(77, 1)).await,
            Err(OrderError::FishNotFound(_))
        ));
        assert!(matches!(
            svc.add_order_line(&alice, order.id, line(3, 1)).await,
            Err(OrderError::FishUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_pay_rules() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);

        let empty = svc.create_order(&alice, vec![]).await.unwrap();
        assert!(matches!(
            svc.pay_for_order(&alice, empty.id).await,
            Err(OrderError::Rule(OrderRuleError::EmptyOrder))
        ));

        let order = svc.create_order(&alice, vec![line(1, 1), line(1, 2)]).await.unwrap();
        assert_eq!(order.lines.len(), 1);
        let paid = svc.pay_for_order(&alice, order.id).await.unwrap();
        assert!(paid.status.is_paid());

        assert!(matches!(
            svc.pay_for_order(&alice, order.id).await,
            Err(OrderError::Rule(OrderRuleError::AlreadyPaid))
        ));
        assert!(matches!(
            svc.add_order_line(&alice, order.id, line(2, 1)).await,
            Err(OrderError::Rule(OrderRuleError::AlreadyPaid))
        ));
        assert!(matches!(
            svc.remove_order_line(&alice, order.id, FishId::new(1)).await,
            Err(OrderError::Rule(OrderRuleError::AlreadyPaid))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_conflict() {
        let fx = Fixture::new().await;
        let svc = fx.service();
        let alice = user(1, Role::Customer);
        let order = svc.create_order(&alice, vec![line(1, 1)]).await.unwrap();

        let mut stale = fx.orders.get_by_id(order.id).await.unwrap().unwrap();
        svc.add_order_line(&alice, order.id, line(2, 1)).await.unwrap();

        stale.lines.clear();
        assert!(matches!(svc.save(&stale).await, Err(OrderError::Conflict(_))));
        assert_eq!(svc.get_order(&alice, order.id).await.unwrap().lines.len(), 2);
    }
}
