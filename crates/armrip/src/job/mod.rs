pub mod model;
pub mod state;
pub mod track;

pub use model::{DiscType, Identification, Job};
pub use state::{transition, JobEvent, JobStatus, TransitionError};
pub use track::{classify_tracks, Track};
