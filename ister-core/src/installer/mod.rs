pub mod pipeline;

pub use pipeline::{install_os, run_pipeline, InstallState, STAGES};
