//! HTTP API of the invoicing back office: services, routing and
//! request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;
