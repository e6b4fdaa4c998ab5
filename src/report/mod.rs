//! Report rendering.

mod generator;

pub use generator::{
    generate_analysis_json, generate_analysis_markdown, generate_run_json, generate_run_markdown,
    write_report,
};
