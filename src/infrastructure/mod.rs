pub mod config;
pub mod error;
pub mod event_mapper;
pub mod event_source;
pub mod google_calendar_client;
pub mod logging;
pub mod snapshot_repository;
pub mod storage;
