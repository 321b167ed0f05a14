//! DaMeng driver.

mod catalog;
mod dialect;

pub use dialect::DamengDialect;
