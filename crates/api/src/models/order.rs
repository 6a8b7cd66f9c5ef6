//! Order aggregate.
//!
//! An [`Order`] owns its [`OrderLine`]s. All line and payment mutations go
//! through methods on the aggregate so the rules (one line per fish, no edits
//! after payment) hold no matter which store persists it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use koi_farm_core::{FishId, OrderId, PaymentStatus, Price, UserId};

/// Largest quantity a single line may hold.
pub const MAX_LINE_QUANTITY: u32 = 9_999;

/// Business-rule violations raised by the order aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderRuleError {
    /// The order has been paid and can no longer change.
    #[error("order has already been paid")]
    AlreadyPaid,

    /// Payment was requested for an order with no lines.
    #[error("cannot pay for an order with no items")]
    EmptyOrder,

    /// Merging would push a line past [`MAX_LINE_QUANTITY`].
    #[error("quantity for a single fish cannot exceed {MAX_LINE_QUANTITY}")]
    QuantityTooLarge,
}

/// One catalog fish within an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub fish_id: FishId,
    /// Always in `1..=MAX_LINE_QUANTITY`.
    pub quantity: u32,
    /// Catalog price captured when the fish was first added.
    pub unit_price: Price,
}

impl OrderLine {
    /// `quantity * unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// A customer's order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub lines: Vec<OrderLine>,
    pub status: PaymentStatus,
    /// Optimistic concurrency token; stores reject saves carrying a stale value.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Data for inserting a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: UserId,
    pub lines: Vec<OrderLine>,
}

impl NewOrder {
    /// Start an empty order for `customer_id`.
    #[must_use]
    pub const fn new(customer_id: UserId) -> Self {
        Self {
            customer_id,
            lines: Vec::new(),
        }
    }

    /// Add a line, merging with an existing line for the same fish.
    ///
    /// # Errors
    ///
    /// Returns `OrderRuleError::QuantityTooLarge` if the merged quantity is too large.
    pub fn add_line(&mut self, line: OrderLine) -> Result<(), OrderRuleError> {
        merge_line(&mut self.lines, line)
    }
}

impl Order {
    /// Find the line for `fish_id`.
    #[must_use]
    pub fn line(&self, fish_id: FishId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.fish_id == fish_id)
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(OrderLine::line_total).sum()
    }

    /// Whether `user_id` placed this order.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.customer_id == user_id
    }

    /// Add a line, or add its quantity to the existing line for the same fish.
    ///
    /// An existing line keeps its original unit price.
    ///
    /// # Errors
    ///
    /// Returns `OrderRuleError::AlreadyPaid` if the order is paid, or
    /// `OrderRuleError::QuantityTooLarge` if the merged quantity is too large.
    pub fn add_line(&mut self, line: OrderLine) -> Result<(), OrderRuleError> {
        self.ensure_pending()?;
        merge_line(&mut self.lines, line)
    }

    /// Remove the line for `fish_id`.
    ///
    /// Returns `false` (and leaves the order untouched) when there is no such line.
    ///
    /// # Errors
    ///
    /// Returns `OrderRuleError::AlreadyPaid` if the order is paid.
    pub fn remove_line(&mut self, fish_id: FishId) -> Result<bool, OrderRuleError> {
        self.ensure_pending()?;
        let before = self.lines.len();
        self.lines.retain(|l| l.fish_id != fish_id);
        Ok(self.lines.len() != before)
    }

    /// Transition to `Paid`.
    ///
    /// # Errors
    ///
    /// Returns `OrderRuleError::AlreadyPaid` if already paid, or
    /// `OrderRuleError::EmptyOrder` if the order has no lines.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), OrderRuleError> {
        self.ensure_pending()?;
        if self.lines.is_empty() {
            return Err(OrderRuleError::EmptyOrder);
        }
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(at);
        Ok(())
    }

    const fn ensure_pending(&self) -> Result<(), OrderRuleError> {
        if self.status.is_paid() {
            return Err(OrderRuleError::AlreadyPaid);
        }
        Ok(())
    }
}

fn merge_line(lines: &mut Vec<OrderLine>, line: OrderLine) -> Result<(), OrderRuleError> {
    if let Some(existing) = lines.iter_mut().find(|l| l.fish_id == line.fish_id) {
        let merged = existing
            .quantity
            .checked_add(line.quantity)
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or(OrderRuleError::QuantityTooLarge)?;
        existing.quantity = merged;
        return Ok(());
    }

    if line.quantity > MAX_LINE_QUANTITY {
        return Err(OrderRuleError::QuantityTooLarge);
    }
    lines.push(line);
    Ok(())
}
