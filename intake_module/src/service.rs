mod config;
mod handlers;
mod server;
mod state;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{
    load_directory, ExtractorConfig, ExtractorKind, IntakeConfig, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_PORT, DEFAULT_SHEET_NAME, DEFAULT_UTC_OFFSET_HOURS,
};
pub use handlers::LIVENESS_MESSAGE;
pub use server::{build_pipeline, build_router, run_server};
pub use state::IntakeState;
