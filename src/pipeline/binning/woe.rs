//! Weight of Evidence and Information Value

/// Smoothing constant to avoid log(0) in WoE calculation (Laplace smoothing)
const SMOOTHING: f64 = 0.5;

/// Calculate WoE and IV contribution for a bin
///
/// Uses the ln(%bad/%good) convention where:
/// - WoE > 0 indicates higher risk (more events/defaults)
/// - WoE < 0 indicates lower risk (fewer events/defaults)
pub fn calculate_woe_iv(
    events: f64,
    non_events: f64,
    total_events: f64,
    total_non_events: f64,
) -> (f64, f64) {
    let dist_events = (events + SMOOTHING) / (total_events + SMOOTHING);
    let dist_non_events = (non_events + SMOOTHING) / (total_non_events + SMOOTHING);

    let woe = (dist_events / dist_non_events).ln();
    let iv_contrib = (dist_events - dist_non_events) * woe;

    (woe, iv_contrib)
}
