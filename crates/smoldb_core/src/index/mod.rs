//! Primary and secondary indexes and their binary persistence.

mod manager;
mod persistence;
mod primary;
mod secondary;

pub use manager::{IndexManager, QueryPlan};
