//! Initialize the database and seed the level table.

use std::path::Path;

use anyhow::{Context, Result};

use cm_core::LevelTable;
use cm_db::Database;

/// Creates the schema (done on open) and seeds the default level rules.
pub fn run(db: &Database, database_path: &Path) -> Result<()> {
    db.seed_level_rules(&LevelTable::default_rules())
        .context("failed to seed level rules")?;
    let table = db.level_table().context("failed to load level table")?;

    println!("Initialized database at {}", database_path.display());
    println!("Level table: {} levels", table.thresholds().len());
    Ok(())
}
