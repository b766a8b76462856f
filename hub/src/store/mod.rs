pub mod cache;
pub mod client;
pub mod flux;
pub mod frame;
pub mod query;

pub use client::{InfluxClient, StoreGuard};
pub use query::{NoDataReason, QueryLayer, QueryResult};
