// Application layer - Use cases and ports
pub mod dashboard_repository;
pub mod dashboard_service;
pub mod errors;
pub mod fetch_cache;
pub mod json_source;
pub mod scheduler;
pub mod streaming_service;
pub mod widget_data_service;
pub mod widget_store;
