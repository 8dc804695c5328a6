//! Report assembly: summary statistics and a qualitative verdict derived from a
//! completed session.

pub mod assembler;
pub mod model;

pub use assembler::ReportAssembler;
pub use model::{NoiseBand, Report, Trend, Verdict};
