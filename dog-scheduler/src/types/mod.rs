pub mod ids;
pub mod payload;
pub mod job;
pub mod events;

pub use ids::JobId;
pub use payload::EmailPayload;
pub use job::{Applied, Job, JobStatus, Transition};
pub use events::JobEvent;
