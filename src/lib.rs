#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for diagnostics/display
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. SinkError in sink module
    clippy::must_use_candidate        // Annotated selectively on critical APIs
)]

pub mod app;
pub mod backup;
pub mod batch;
pub mod encode;
pub mod event;
pub mod fallback;
pub mod pipeline;
pub mod sender;
pub mod sink;

// Re-export main types for easy access
pub use app::{App, Config};
pub use pipeline::Pipeline;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
