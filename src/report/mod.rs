//! Report generation for finished reviews.

pub mod generator;

pub use generator::{
    generate_json_report, generate_markdown_report, group_by_file, FindingSummary,
};
