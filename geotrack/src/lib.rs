//! Background geolocation tracking engine: motion-aware position
//! acquisition, geofencing, trip recording, privacy filtering, adaptive
//! power management, and durable sync, wired together by
//! `coordinator::TrackingCoordinator`.

pub mod adaptive;
pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod error_recovery;
pub mod events;
pub mod geo;
pub mod geofence_engine;
pub mod model;
pub mod privacy_filter;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod trip_engine;

pub use config::Config;
pub use coordinator::TrackingCoordinator;
pub use error::GeoError;
