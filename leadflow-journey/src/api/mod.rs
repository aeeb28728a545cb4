//! HTTP API handlers for leadflow-journey

pub mod health;
pub mod journeys;
pub mod poller;

pub use health::health_routes;
pub use journeys::journey_routes;
pub use poller::poller_routes;
