//! Access to a live OData v4 service.

mod client;
mod service;

pub use client::HttpTransport;
pub use service::ODataService;
