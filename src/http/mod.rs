//! HTTP surface: router and endpoints

pub mod routes;

pub use routes::build_router;
