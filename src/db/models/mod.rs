pub mod step_session;

pub use step_session::{NewStepSession, StepSession};
