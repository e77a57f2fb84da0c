use bpg_common::Secret;
use log::*;

use crate::{SecretVault, SqliteDatabase};

pub fn init_logging() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
}

/// A fully migrated in-memory database with a throwaway server secret.
pub async fn new_test_database() -> SqliteDatabase {
    let vault = SecretVault::new(Secret::new("test-server-secret".to_string()));
    let db = SqliteDatabase::new_in_memory(vault).await.expect("Error creating in-memory database");
    db.migrate().await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
    db
}
