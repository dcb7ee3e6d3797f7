use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

/// Asian handicap vocabulary as quoted by the odds site.
///
/// Negative values: the home side gives goals. Positive values (`受让` prefix): the home
/// side receives goals. The table is closed; anything outside it is unrecognized.
pub const HANDICAP_TABLE: &[(&str, f64)] = &[
    ("平手", 0.0),
    ("平手/半球", -0.25),
    ("半球", -0.5),
    ("半球/一球", -0.75),
    ("一球", -1.0),
    ("一球/球半", -1.25),
    ("球半", -1.5),
    ("球半/两球", -1.75),
    ("两球", -2.0),
    ("两球/两球半", -2.25),
    ("两球半", -2.5),
    ("两球半/三球", -2.75),
    ("三球", -3.0),
    ("三球/三球半", -3.25),
    ("三球半", -3.5),
    ("三球半/四球", -3.75),
    ("四球", -4.0),
    ("四球/四球半", -4.25),
    ("四球半", -4.5),
    ("四球半/五球", -4.75),
    ("五球", -5.0),
    ("受让平手/半球", 0.25),
    ("受让半球", 0.5),
    ("受让半球/一球", 0.75),
    ("受让一球", 1.0),
    ("受让一球/球半", 1.25),
    ("受让球半", 1.5),
    ("受让球半/两球", 1.75),
    ("受让两球", 2.0),
    ("受让两球/两球半", 2.25),
    ("受让两球半", 2.5),
    ("受让两球半/三球", 2.75),
    ("受让三球", 3.0),
    ("受让三球/三球半", 3.25),
    ("受让三球半", 3.5),
    ("受让三球半/四球", 3.75),
    ("受让四球", 4.0),
    ("受让四球/四球半", 4.25),
    ("受让四球半", 4.5),
    ("受让四球半/五球", 4.75),
    ("受让五球", 5.0),
];

// Short form the site uses for a level line.
const LEVEL_SHORT: &str = "平";

static BY_TEXT: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, f64> = HANDICAP_TABLE.iter().copied().collect();
    map.insert(LEVEL_SHORT, 0.0);
    map
});

// Keyed by quarter steps so float keys never enter a map.
static BY_QUARTERS: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    HANDICAP_TABLE
        .iter()
        .map(|(text, value)| (quarter_steps(*value), *text))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized handicap text {text:?}")]
pub struct UnrecognizedHandicap {
    pub text: String,
}

/// Convert handicap vocabulary into a signed goal line.
///
/// Whitespace (including non-breaking and ideographic spaces) is removed first. An
/// unknown string is an error, never `0.0`: a level line and a missing line are different.
pub fn normalize_handicap(text: &str) -> Result<f64, UnrecognizedHandicap> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BY_TEXT
        .get(compact.as_str())
        .copied()
        .ok_or(UnrecognizedHandicap { text: compact })
}

pub fn handicap_label(value: f64) -> Option<&'static str> {
    if !value.is_finite() || value.abs() > 5.0 {
        return None;
    }
    let steps = value * 4.0;
    if (steps - steps.round()).abs() > 1e-9 {
        return None;
    }
    BY_QUARTERS.get(&quarter_steps(value)).copied()
}

fn quarter_steps(value: f64) -> i32 {
    (value * 4.0).round() as i32
}
