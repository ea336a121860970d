pub mod engine;
pub mod projection;

pub use engine::{StageEvent, StageProgressEngine, StageTransition};
pub use projection::{ordered_logs, overall_status, project_progress};
