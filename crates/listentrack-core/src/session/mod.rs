mod machine;

pub use machine::{SessionMachine, SessionPhase, SessionState, SessionThresholds};
