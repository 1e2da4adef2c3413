pub mod aggs_response;
pub mod polygon_client;

pub use aggs_response::{AggBar, AggsResponse};
pub use polygon_client::{BarSpan, PolygonClient};
