use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotFields;

pub const KELLY_SPREAD_ALERT: f64 = 0.10;
// 0.96 - 0.86 evaluates to 0.0999..; two-decimal quotes at the threshold still alert.
pub const KELLY_SPREAD_TOLERANCE: f64 = 1e-9;
pub const COLD_ODDS_FLOOR: f64 = 3.0;
pub const COLD_KELLY_FLOOR: f64 = 0.95;
pub const DEEP_LINE: f64 = 1.5;
pub const SHALLOW_LINE: f64 = 0.25;
pub const DRAW_GUARD_ODDS: f64 = 3.5;

pub const UNAVAILABLE: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyClass {
    DeepLineHeatUp,
    ShallowLineColdGuard,
    Balanced,
}

impl StrategyClass {
    pub fn label(self) -> &'static str {
        match self {
            StrategyClass::DeepLineHeatUp => "深盘造热",
            StrategyClass::ShallowLineColdGuard => "低盘防冷",
            StrategyClass::Balanced => "中庸博弈",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BettingLean {
    GuardDraw,
    GuardUpset,
    FavorHome,
    FavorAway,
}

impl BettingLean {
    pub fn label(self) -> &'static str {
        match self {
            BettingLean::GuardDraw => "防平局",
            BettingLean::GuardUpset => "防冷门",
            BettingLean::FavorHome => "支持主胜",
            BettingLean::FavorAway => "倾向客胜",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeanTieBreak {
    Home,
    #[default]
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub volatility_score: f64,
    pub kelly_anomaly: bool,
    pub cold_signal: bool,
    pub strategy_class: StrategyClass,
    pub betting_lean: BettingLean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Analytics {
    Available(AnalyticsResult),
    Unavailable,
}

impl Analytics {
    pub fn result(&self) -> Option<&AnalyticsResult> {
        match self {
            Analytics::Available(r) => Some(r),
            Analytics::Unavailable => None,
        }
    }

    pub fn cells(&self) -> [String; 5] {
        match self {
            Analytics::Available(r) => [
                format!("{:.2}", r.volatility_score),
                if r.kelly_anomaly { "⚠️ 是" } else { "正常" }.to_string(),
                if r.cold_signal { "🔴 有" } else { "无" }.to_string(),
                r.strategy_class.label().to_string(),
                r.betting_lean.label().to_string(),
            ],
            Analytics::Unavailable => std::array::from_fn(|_| UNAVAILABLE.to_string()),
        }
    }
}

pub const ANALYTICS_HEADERS: [&str; 5] = ["冷热评分", "凯利异常", "冷门信号", "庄家策略", "投注倾向"];

/// Compute the opening-snapshot signals. Any unset input makes the whole result
/// unavailable; partial results are never produced.
pub fn analyze(opening: &SnapshotFields, tie: LeanTieBreak) -> Analytics {
    let inputs = opening.slots();
    if inputs.iter().any(|v| !v.is_some_and(f64::is_finite)) {
        return Analytics::Unavailable;
    }
    let [Some(h), Some(home), Some(draw), Some(away), Some(kh), Some(kd), Some(ka)] = inputs
    else {
        return Analytics::Unavailable;
    };

    let volatility_score = round2((home + draw + away) * 5.0);

    let k_max = kh.max(kd).max(ka);
    let k_min = kh.min(kd).min(ka);
    // Tolerance for two-decimal Kelly text, e.g. 0.96 - 0.86.
    let kelly_anomaly = k_max - k_min >= KELLY_SPREAD_ALERT - KELLY_SPREAD_TOLERANCE;

    // Draw side is not part of the trigger.
    let cold_signal = (home > COLD_ODDS_FLOOR && kh > COLD_KELLY_FLOOR)
        || (away > COLD_ODDS_FLOOR && ka > COLD_KELLY_FLOOR);

    let line = h.abs();
    let strategy_class = if line >= DEEP_LINE {
        StrategyClass::DeepLineHeatUp
    } else if line <= SHALLOW_LINE {
        StrategyClass::ShallowLineColdGuard
    } else {
        StrategyClass::Balanced
    };

    let betting_lean = if cold_signal {
        if draw < DRAW_GUARD_ODDS {
            BettingLean::GuardDraw
        } else {
            BettingLean::GuardUpset
        }
    } else if home < away {
        BettingLean::FavorHome
    } else if home > away {
        BettingLean::FavorAway
    } else {
        match tie {
            LeanTieBreak::Home => BettingLean::FavorHome,
            LeanTieBreak::Away => BettingLean::FavorAway,
        }
    };

    Analytics::Available(AnalyticsResult {
        volatility_score,
        kelly_anomaly,
        cold_signal,
        strategy_class,
        betting_lean,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
