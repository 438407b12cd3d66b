//! Service layer - the settings API callers use.

mod settings;

pub use settings::{Scoped, Settings};
