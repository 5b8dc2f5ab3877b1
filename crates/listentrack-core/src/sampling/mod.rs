mod http_probe;
mod orchestrator;
mod probe;
mod scheduler;

pub use http_probe::{extract_listener_count, page_text, HttpProbe};
pub use orchestrator::{Orchestrator, SESSION_KEY};
pub use probe::{Probe, Reading, Readiness};
pub use scheduler::{Scheduler, TickGuard};
