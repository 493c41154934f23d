//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ProductStock   │   │      Order      │   │   StockChange   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  product_id     │   │  id (UUID)      │   │  sequence       │       │
//! │  │  available      │   │  status         │   │  kind           │       │
//! │  │  reserved       │   │  total_cents    │   │  old → new      │       │
//! │  │  reorder_thresh │   │  items[]        │   │  reason         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  OrderStatus    │   │ PaymentMethod   │   │ReservationState │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Pending        │   │  CreditCard     │   │  Held           │       │
//! │  │  Paid           │   │  PayPal         │   │  Confirmed      │       │
//! │  │  Shipped        │   │  BankTransfer   │   │  Released       │       │
//! │  │  Delivered      │   └─────────────────┘   └─────────────────┘       │
//! │  │  Cancelled      │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product Stock
// =============================================================================

/// Per-product stock counters.
///
/// ## Conservation
/// ```text
/// available + reserved == total_stocked - total_confirmed
///
///   initialize(10)   available=10 reserved=0  stocked=10 confirmed=0
///   reserve(4)       available=6  reserved=4  stocked=10 confirmed=0
///   confirm(4)       available=6  reserved=0  stocked=10 confirmed=4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: String,

    /// Units that can be reserved right now.
    pub available: i64,

    /// Units held by in-flight checkouts.
    pub reserved: i64,

    /// `needs_reorder` fires when available drops to this level.
    pub reorder_threshold: i64,

    /// Units ever put on the shelf, net of administrative corrections.
    pub total_stocked: i64,

    /// Units permanently consumed by paid orders.
    pub total_confirmed: i64,

    pub updated_at: DateTime<Utc>,
}

impl ProductStock {
    /// A fresh record with all stock available.
    pub fn new(product_id: impl Into<String>, initial_stock: i64, reorder_threshold: i64) -> Self {
        let initial_stock = initial_stock.max(0);
        ProductStock {
            product_id: product_id.into(),
            available: initial_stock,
            reserved: 0,
            reorder_threshold,
            total_stocked: initial_stock,
            total_confirmed: 0,
            updated_at: Utc::now(),
        }
    }

    #[inline]
    pub fn needs_reorder(&self) -> bool {
        self.available <= self.reorder_threshold
    }

    #[inline]
    pub fn is_out_of_stock(&self) -> bool {
        self.available == 0
    }

    /// Units physically on hand (available plus held).
    #[inline]
    pub fn on_hand(&self) -> i64 {
        self.available + self.reserved
    }

    /// Checks the conservation invariant and non-negativity.
    pub fn is_consistent(&self) -> bool {
        self.available >= 0
            && self.reserved >= 0
            && self.on_hand() == self.total_stocked - self.total_confirmed
    }
}

// =============================================================================
// Stock Change (audit entry)
// =============================================================================

/// The ledger operation that produced a [`StockChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StockChangeKind {
    Initialize,
    Reserve,
    Confirm,
    Release,
    Adjust,
    Restock,
}

impl StockChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockChangeKind::Initialize => "initialize",
            StockChangeKind::Reserve => "reserve",
            StockChangeKind::Confirm => "confirm",
            StockChangeKind::Release => "release",
            StockChangeKind::Adjust => "adjust",
            StockChangeKind::Restock => "restock",
        }
    }
}

impl fmt::Display for StockChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the stock-change audit trail. Never mutated once recorded.
///
/// `old_quantity`/`new_quantity` track the available count; the reserved
/// columns make reserve/confirm pairs reconstructable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    /// Position in the trail, starting at 1.
    pub sequence: i64,
    pub product_id: String,
    pub kind: StockChangeKind,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub delta: i64,
    pub reserved_before: i64,
    pub reserved_after: i64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Reservation State
// =============================================================================

/// Lifecycle of a reservation. `Confirmed` and `Released` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Held,
    Confirmed,
    Released,
}

impl ReservationState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationState::Held)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// ## State Machine
/// ```text
///   PENDING ──► PAID ──► SHIPPED ──► DELIVERED
///      │          │
///      └──────────┴──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Stock held, payment not yet settled.
    Pending,
    /// Payment settled and stock consumed.
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (Paid, Shipped)
                | (Paid, Cancelled)
                | (Shipped, Delivered)
        )
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Orders whose payment has been collected and not refunded.
    #[inline]
    pub fn counts_as_revenue(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: OrderStatus::ALL.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    #[serde(rename = "paypal")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "paypal"))]
    PayPal,
    BankTransfer,
}

impl PaymentMethod {
    /// Prefix of settlement ids issued for this method.
    pub fn settlement_prefix(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "cc",
            PaymentMethod::PayPal => "pp",
            PaymentMethod::BankTransfer => "bt",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
        })
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit_card" | "card" | "credit" => Ok(PaymentMethod::CreditCard),
            "paypal" => Ok(PaymentMethod::PayPal),
            "bank_transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            _ => Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: vec![
                    "credit_card".to_string(),
                    "paypal".to_string(),
                    "bank_transfer".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Checkout Request
// =============================================================================

/// One requested line of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Price the client believes applies. Never used for the total.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
}

impl OrderLineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        OrderLineRequest {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
        }
    }
}

/// A checkout as received from the REST layer.
///
/// Optional fields are optional only so that validation can reject them
/// with a precise message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub items: Vec<OrderLineRequest>,
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub billing_address: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

// =============================================================================
// Order
// =============================================================================

/// A line of a placed order.
/// Name and price are frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl LineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Unit price times quantity, or `None` on overflow.
    #[inline]
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price().checked_mul_quantity(self.quantity)
    }
}

/// An order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<LineItem>,
    /// Computed from catalog prices when the order is placed.
    pub total_cents: i64,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub settlement_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Moves the order to `next`, stamping the matching timestamp.
    ///
    /// Callers check the edge first with [`OrderStatus::can_transition_to`].
    pub fn apply_status(&mut self, next: OrderStatus, reason: Option<&str>, at: DateTime<Utc>) {
        self.status = next;
        self.updated_at = at;
        match next {
            OrderStatus::Paid => self.paid_at = Some(at),
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Delivered => self.delivered_at = Some(at),
            OrderStatus::Cancelled => {
                self.cancelled_at = Some(at);
                self.cancellation_reason = reason.map(str::to_string);
            }
            OrderStatus::Pending => {}
        }
    }
}

// =============================================================================
// Inventory Summary
// =============================================================================

/// Aggregate view over every stock record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_products: usize,
    pub low_stock_products: usize,
    pub out_of_stock_products: usize,
    pub total_available: i64,
    pub total_reserved: i64,
}

// =============================================================================
// Order Statistics
// =============================================================================

/// Order counts per status and collected revenue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub paid_orders: i64,
    pub shipped_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    /// Sum of totals of paid, shipped and delivered orders.
    pub revenue_cents: i64,
}

impl OrderStatistics {
    /// Adds `count` orders in `status` whose totals sum to `total_cents`.
    pub fn record(&mut self, status: OrderStatus, count: i64, total_cents: i64) {
        self.total_orders += count;
        match status {
            OrderStatus::Pending => self.pending_orders += count,
            OrderStatus::Paid => self.paid_orders += count,
            OrderStatus::Shipped => self.shipped_orders += count,
            OrderStatus::Delivered => self.delivered_orders += count,
            OrderStatus::Cancelled => self.cancelled_orders += count,
        }
        if status.counts_as_revenue() {
            self.revenue_cents += total_cents;
        }
    }

    pub fn revenue(&self) -> Money {
        Money::from_cents(self.revenue_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_edges() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Paid));
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = OrderStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![&OrderStatus::Delivered, &OrderStatus::Cancelled]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert_eq!("canceled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!("refunded".parse::<OrderStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::CreditCard);
        assert_eq!("PayPal".parse::<PaymentMethod>().unwrap(), PaymentMethod::PayPal);
        assert!("cash".parse::<PaymentMethod>().is_err());
        assert_eq!(PaymentMethod::BankTransfer.settlement_prefix(), "bt");
    }

    #[test]
    fn test_line_total_is_checked() {
        let mut item = LineItem {
            product_id: "MUG-01".to_string(),
            product_name: "Mug".to_string(),
            quantity: 3,
            unit_price_cents: 1250,
        };
        assert_eq!(item.line_total(), Some(Money::from_cents(3750)));

        item.quantity = i64::MAX;
        assert_eq!(item.line_total(), None);
    }

    #[test]
    fn test_product_stock_reorder() {
        let stock = ProductStock::new("MUG-01", 10, 10);
        assert!(stock.needs_reorder());
        assert!(stock.is_consistent());

        let stock = ProductStock::new("MUG-02", 11, 10);
        assert!(!stock.needs_reorder());

        let stock = ProductStock::new("MUG-03", -5, 0);
        assert_eq!(stock.available, 0);
        assert!(stock.is_out_of_stock());
    }

    #[test]
    fn test_statistics_revenue_excludes_pending_and_cancelled() {
        let mut stats = OrderStatistics::default();
        stats.record(OrderStatus::Pending, 1, 500);
        stats.record(OrderStatus::Paid, 2, 3000);
        stats.record(OrderStatus::Delivered, 1, 1000);
        stats.record(OrderStatus::Cancelled, 3, 9000);

        assert_eq!(stats.total_orders, 7);
        assert_eq!(stats.cancelled_orders, 3);
        assert_eq!(stats.revenue(), Money::from_cents(4000));
    }

    #[test]
    fn test_apply_status_stamps_timestamps() {
        let now = Utc::now();
        let mut order = Order {
            id: "o-1".into(),
            user_id: "u-1".into(),
            items: vec![],
            total_cents: 0,
            status: OrderStatus::Paid,
            shipping_address: "1 Main St".into(),
            billing_address: None,
            payment_method: PaymentMethod::CreditCard,
            settlement_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        };

        order.apply_status(OrderStatus::Cancelled, Some("customer request"), now);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_at, Some(now));
        assert_eq!(order.cancellation_reason.as_deref(), Some("customer request"));
    }
}
