pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod executor;
pub mod gate;
pub mod instrument;
pub mod parser;
pub mod quiescence;
pub mod runner;

// Re-export main types
pub use config::Config;
pub use errors::{adapt_error, RunError};
pub use events::ListenerId;
pub use gate::{GateDestroyed, StepGate};
pub use instrument::instrument;
pub use quiescence::QuiescenceDetector;
pub use runner::{start_run, Bindings, HostFunction, Interpreter, RunHandle, RunOptions};
