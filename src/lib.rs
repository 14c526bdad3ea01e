//! Score-phi: Credit Scorecard Report Library
//!
//! Builds a scorecard model report from labeled datasets: WoE binning,
//! logistic regression, points scaling, performance and stability
//! evaluation, gains tables and a laid-out multi-sheet report document.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;
