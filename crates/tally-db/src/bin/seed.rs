//! # Seed Data Generator
//!
//! Populates a development database with a small catalog and stock records.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db with the default catalog
//! cargo run -p tally-db --bin seed
//!
//! # Custom path and opening stock per product
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --stock 25
//! ```
//!
//! Every product gets the same opening stock and the default reorder
//! threshold, so a short checkout run quickly shows low-stock records.

use std::env;

use tally_core::{InventoryLedger, DEFAULT_REORDER_THRESHOLD};
use tally_db::{CatalogProduct, Database, DbConfig};

/// (id, name, price in cents)
const CATALOG: &[(&str, &str, i64)] = &[
    ("MUG-01", "Stoneware Mug", 1250),
    ("MUG-02", "Travel Mug", 2199),
    ("TEA-01", "Green Tea 50g", 899),
    ("TEA-02", "Earl Grey 100g", 1149),
    ("COF-01", "House Blend 250g", 1499),
    ("COF-02", "Single Origin 250g", 1899),
    ("PRS-01", "French Press", 3499),
    ("KTL-01", "Gooseneck Kettle", 5999),
    ("FLT-01", "Paper Filters x100", 499),
    ("GRD-01", "Hand Grinder", 4499),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./tally_dev.db");
    let mut opening_stock: i64 = 50;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    opening_stock = args[i + 1].parse().unwrap_or(opening_stock);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./tally_dev.db)");
                println!("  -s, --stock <N>      Opening stock per product (default: 50)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tally Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!("Opening stock: {}", opening_stock);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products, skipping.", existing);
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let ledger = InventoryLedger::in_memory();
    for (id, name, price_cents) in CATALOG {
        db.products()
            .insert(&CatalogProduct::new(*id, *name, *price_cents))
            .await?;
        ledger.initialize(id, opening_stock, DEFAULT_REORDER_THRESHOLD)?;
    }

    db.products().save_snapshots(&ledger.snapshots()).await?;
    db.stock_changes().append(&ledger.audit().entries()).await?;

    let summary = ledger.summary();
    println!("✓ Seeded {} products", summary.total_products);
    println!("  Units available: {}", summary.total_available);
    println!("  Low stock:       {}", summary.low_stock_products);

    db.close().await;
    Ok(())
}
