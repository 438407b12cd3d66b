//! Repository layer for data access.

mod settings_repository;

pub use settings_repository::{ScopedRepository, SettingsRepository, SettingsStore};

#[cfg(any(test, feature = "test-utils"))]
pub use settings_repository::MockSettingsRepository;
