//! Reporting utilities: EoS refinement blocks, strategy and peak tables.

pub mod format;

pub use format::{
    format_cycle, format_eos_report, format_eos_summary, format_peak_table, format_strategy_table,
    CycleBlock,
};
