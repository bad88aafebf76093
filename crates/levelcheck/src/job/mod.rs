pub mod assessment;
pub mod record;
pub mod status;

pub use assessment::{Assessment, Dimension, DimensionScore, ProficiencyLevel};
pub use record::{JobId, JobRecord, NewJobRecord};
pub use status::{JobStatus, Stage};
