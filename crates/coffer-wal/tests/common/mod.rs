// Common test utilities for WAL integration tests

use coffer_core::Entity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test fixture that owns a temporary container directory
pub struct WalTestFixture {
    #[allow(dead_code)]
    pub temp_dir: TempDir,
    pub wal_path: PathBuf,
}

impl WalTestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let wal_path = temp_dir.path().join("User").join(coffer_wal::WAL_FILE);

        Self { temp_dir, wal_path }
    }

    pub fn wal_path(&self) -> &PathBuf {
        &self.wal_path
    }
}

impl Default for WalTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl Entity for User {
    type Key = String;

    fn id(&self) -> String {
        self.name.clone()
    }
}

#[allow(dead_code)]
pub fn user(name: &str) -> User {
    User {
        name: name.to_string(),
    }
}
