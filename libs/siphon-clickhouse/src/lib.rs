pub mod client;
pub mod ddl;
pub mod literal;
pub mod parse;

pub use client::{ClickHouseClient, ClickHouseConfig};
