//! # Checkout Simulator
//!
//! Runs many concurrent checkouts against one ledger and prints what
//! happened to stock and orders.
//!
//! ## Usage
//! ```bash
//! # In-memory collaborators, 50 customers buying 2 units each
//! cargo run -p tally-settlement --bin checkout-sim -- --customers 50 --quantity 2
//!
//! # Against a seeded SQLite database
//! cargo run -p tally-db --bin seed -- --db ./tally_dev.db
//! TALLY_DB_PATH=./tally_dev.db cargo run -p tally-settlement --bin checkout-sim
//! ```
//!
//! Logging follows `RUST_LOG` (default `info,tally=debug,sqlx=warn`).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_core::{
    InventoryLedger, Money, OrderLineRequest, OrderRequest, OrderStatus, PaymentMethod,
};
use tally_db::{AuditFlusher, Database, DbConfig};
use tally_settlement::{
    InMemoryOrderStore, SettlementConfig, SettlementError, SettlementOrchestrator,
    SimulatedGateway, StaticCatalog, TracingObserver,
};

/// (id, name, price in cents) for runs without a database.
const DEMO_CATALOG: &[(&str, &str, i64)] = &[
    ("MUG-01", "Stoneware Mug", 1250),
    ("TEA-01", "Green Tea 50g", 899),
    ("PRS-01", "French Press", 3499),
];

const DEMO_OPENING_STOCK: i64 = 20;

const PAYMENT_METHODS: [PaymentMethod; 3] = [
    PaymentMethod::CreditCard,
    PaymentMethod::PayPal,
    PaymentMethod::BankTransfer,
];

#[derive(Debug, Default)]
struct RunTally {
    paid: usize,
    payment_failed: usize,
    out_of_stock: usize,
    other: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut customers: usize = 25;
    let mut quantity: i64 = 2;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--customers" | "-n" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(customers);
                    i += 1;
                }
            }
            "--quantity" | "-q" => {
                if i + 1 < args.len() {
                    quantity = args[i + 1].parse().unwrap_or(quantity);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Checkout Simulator");
                println!();
                println!("Usage: checkout-sim [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>    Settlement config file (TOML)");
                println!("  -n, --customers <N>    Concurrent checkouts (default: 25)");
                println!("  -q, --quantity <N>     Units per checkout (default: 2)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = SettlementConfig::load(config_path)?;
    let ledger = Arc::new(InventoryLedger::in_memory());
    let gateway = Arc::new(SimulatedGateway::from_settings(&config.gateway));

    let (orchestrator, database) = match &config.database.path {
        Some(path) => {
            let db = Database::new(DbConfig::new(path)).await?;
            let hydrated = db.products().hydrate_ledger(&ledger).await?;
            info!(path = %path.display(), products = hydrated, "Ledger hydrated from database");

            let orchestrator = SettlementOrchestrator::new(
                ledger.clone(),
                Arc::new(db.orders()),
                gateway.clone(),
                Arc::new(db.products()),
                &config,
            );
            (orchestrator, Some(db))
        }
        None => {
            let mut catalog = StaticCatalog::new();
            for (id, name, price_cents) in DEMO_CATALOG {
                catalog = catalog.with_product(*id, *name, Money::from_cents(*price_cents));
                ledger.initialize(
                    id,
                    DEMO_OPENING_STOCK,
                    config.inventory.default_reorder_threshold,
                )?;
            }

            let orchestrator = SettlementOrchestrator::new(
                ledger.clone(),
                Arc::new(InMemoryOrderStore::new()),
                gateway.clone(),
                Arc::new(catalog),
                &config,
            );
            (orchestrator, None)
        }
    };
    let orchestrator = Arc::new(orchestrator.with_observer(Arc::new(TracingObserver)));

    let products: Vec<String> = ledger.snapshots().into_iter().map(|s| s.product_id).collect();
    if products.is_empty() {
        println!("No products to sell. Seed the database first.");
        return Ok(());
    }

    println!("Tally Checkout Simulator");
    println!("========================");
    println!("Customers: {customers}, units each: {quantity}");
    println!("Products:  {}", products.join(", "));
    println!();

    let mut handles = Vec::with_capacity(customers);
    for n in 0..customers {
        let orchestrator = orchestrator.clone();
        let request = OrderRequest {
            user_id: format!("customer-{n:03}"),
            items: vec![OrderLineRequest::new(
                products[n % products.len()].clone(),
                quantity,
            )],
            shipping_address: Some(format!("{n} Market Street")),
            billing_address: None,
            payment_method: Some(PAYMENT_METHODS[n % PAYMENT_METHODS.len()]),
        };
        handles.push(tokio::spawn(
            async move { orchestrator.create_order(request).await },
        ));
    }

    let mut tally = RunTally::default();
    let mut revenue = Money::zero();
    for handle in handles {
        match handle.await? {
            Ok(order) => {
                debug_assert_eq!(order.status, OrderStatus::Paid);
                tally.paid += 1;
                revenue = revenue + order.total();
            }
            Err(SettlementError::PaymentFailed { .. }) => tally.payment_failed += 1,
            Err(SettlementError::InsufficientStock { .. }) => tally.out_of_stock += 1,
            Err(e) => {
                println!("  ✗ {e}");
                tally.other += 1;
            }
        }
    }

    let summary = orchestrator.inventory_summary();
    println!("Orders");
    println!("  Paid:           {}", tally.paid);
    println!("  Payment failed: {}", tally.payment_failed);
    println!("  Out of stock:   {}", tally.out_of_stock);
    println!("  Other errors:   {}", tally.other);
    println!("  Revenue:        {revenue}");
    println!("  Charge calls:   {}", gateway.attempts());
    println!();
    println!("Inventory");
    println!("  Available: {}", summary.total_available);
    println!("  Reserved:  {}", summary.total_reserved);
    println!("  Low stock: {}", summary.low_stock_products);
    for stock in orchestrator.low_stock() {
        println!(
            "    {} available {} (threshold {})",
            stock.product_id, stock.available, stock.reorder_threshold
        );
    }

    if let Some(db) = database {
        db.products().save_snapshots(&ledger.snapshots()).await?;
        let flusher = AuditFlusher::new(ledger.audit().clone(), db.stock_changes());
        let written = flusher.flush().await?;
        println!();
        println!("✓ Persisted stock records and {written} audit entries");
        db.close().await;
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
