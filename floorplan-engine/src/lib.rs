pub mod bounds;
pub mod command;
pub mod editor;
pub mod ingest;
pub mod overlay;
pub mod scene;
pub mod tool;
pub mod viewport;

pub mod errors {
    use floorplan_core::transform::TransformError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("item {0} not found in floor document")]
        ItemNotFound(String),
        #[error("{kind} needs at least {required} distinct vertices, got {actual}")]
        DegenerateShape {
            kind: &'static str,
            required: usize,
            actual: usize,
        },
        #[error("invalid coordinate transform: {0}")]
        InvalidTransform(#[from] TransformError),
        #[error("percentiles must satisfy 0 <= low <= high <= 1 (low = {low}, high = {high})")]
        InvalidPercentiles { low: f64, high: f64 },
    }
}
