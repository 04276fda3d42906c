//! Fuzz target: weather snapshot parsing and evaluation
//!
//! Feeds arbitrary bytes to the snapshot JSON decoder and, when they decode,
//! runs the evaluator on the result for both enclosure states, verifying:
//! - No panics on any snapshot content (NaN, infinities, huge timestamps)
//! - `ok` implies `ok_ignoring_sun`
//! - A decision is never `ok` while listing reasons
//!
//! cargo fuzz run fuzz_weather_snapshot

#![no_main]

use domewatch::app::ports::OverrideFlags;
use domewatch::config::SiteConfig;
use domewatch::safety::{Conditions, WeatherEvaluator};
use domewatch::weather::WeatherSnapshot;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = serde_json::from_slice::<WeatherSnapshot>(data) else {
        return;
    };

    let site = SiteConfig::default();
    for dome_open in [false, true] {
        let mut eval = WeatherEvaluator::new(&site);
        let cond = Conditions {
            dome_open,
            weather: Some(&snapshot),
            overrides: OverrideFlags::default(),
            manual_gate: None,
            now: snapshot.timestamp,
        };
        let decision = eval.evaluate(&cond, false).decision;

        assert!(!decision.ok || decision.ok_ignoring_sun);
        assert_eq!(decision.ok, decision.reasons.is_empty());
    }
});
