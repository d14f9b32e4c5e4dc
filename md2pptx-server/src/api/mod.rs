//! HTTP API handlers for md2pptx-server

pub mod buildinfo;
pub mod health;
pub mod upload;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use upload::upload_routes;
