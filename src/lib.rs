pub mod complexity;
pub mod confidence;
pub mod config;
pub mod db;
pub mod fill;
pub mod filters;
pub mod friction;
pub mod hygiene;
pub mod models;
pub mod overview;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod stats;
pub mod velocity;

pub use complexity::compute_complexity;
pub use config::EngineConfig;
pub use filters::{DateRange, Filters};
pub use friction::compute_hm_friction;
pub use hygiene::compute_hygiene;
pub use models::Dataset;
pub use overview::compute_overview;
pub use pipeline::{run_pipeline, MetricsReport};
pub use stages::normalize_stages;
pub use velocity::compute_velocity;
