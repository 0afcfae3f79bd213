//! Outcome analytics over the trade-history log.
//!
//! Produces the confidence-calibration context consumed by the decision
//! collaborator. This path must never block trading: any read or parse
//! problem degrades to neutral defaults.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;

use crate::history::read_trade_log;

/// Streak influence per consecutive outcome, clamped to ±MAX.
const STREAK_STEP: f64 = 0.02;
const STREAK_MAX: f64 = 0.10;
/// Influence of the last five outcomes.
const RECENT_WINDOW: usize = 5;
const RECENT_STEP: f64 = 0.05;

/// Recent-performance snapshot for confidence calibration.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    /// Win rate over the analyzed window, in [0, 1].
    pub win_rate: f64,
    pub wins: u32,
    pub total: u32,
    /// Consecutive outcomes at the end of the window: positive for wins,
    /// negative for losses, zero when empty.
    pub current_streak: i32,
    pub symbol_win_rates: HashMap<String, f64>,
    /// Confidence adjustment from the current streak, clamped to ±0.10.
    pub streak_modifier: f64,
    /// Confidence adjustment from the last five outcomes, in ±0.05.
    pub recent_modifier: f64,
}

/// Build the calibration context from the last `last_n` closed trades.
///
/// Infallible: an absent or unreadable log yields the neutral default
/// context (zero modifiers, no history).
pub fn decision_context(trade_log_path: &Path, last_n: usize) -> DecisionContext {
    let rows = read_trade_log(trade_log_path);

    let mut outcomes: Vec<(String, bool)> = Vec::new();
    for row in &rows {
        if row.get("status").map(String::as_str) != Some("CLOSED") {
            continue;
        }
        let Some(pnl) = row
            .get("pnl_amount")
            .and_then(|v| v.trim().parse::<Decimal>().ok())
        else {
            continue;
        };
        let symbol = row.get("symbol").cloned().unwrap_or_default();
        outcomes.push((symbol, pnl > Decimal::ZERO));
    }

    let mut symbol_totals: HashMap<String, (u32, u32)> = HashMap::new();
    for (symbol, is_win) in &outcomes {
        let entry = symbol_totals.entry(symbol.clone()).or_default();
        entry.1 += 1;
        if *is_win {
            entry.0 += 1;
        }
    }
    let symbol_win_rates = symbol_totals
        .into_iter()
        .map(|(symbol, (wins, total))| (symbol, f64::from(wins) / f64::from(total)))
        .collect();

    let start = outcomes.len().saturating_sub(last_n);
    let window: Vec<bool> = outcomes[start..].iter().map(|(_, w)| *w).collect();

    let wins = window.iter().filter(|w| **w).count() as u32;
    let total = window.len() as u32;
    let win_rate = if total > 0 {
        f64::from(wins) / f64::from(total)
    } else {
        0.0
    };

    let current_streak = streak(&window);
    let streak_modifier =
        (f64::from(current_streak) * STREAK_STEP).clamp(-STREAK_MAX, STREAK_MAX);

    let recent_start = window.len().saturating_sub(RECENT_WINDOW);
    let recent = &window[recent_start..];
    let recent_wins = recent.iter().filter(|w| **w).count() as i32;
    let recent_losses = recent.len() as i32 - recent_wins;
    let recent_modifier =
        f64::from(recent_wins - recent_losses) / RECENT_WINDOW as f64 * RECENT_STEP;

    DecisionContext {
        win_rate,
        wins,
        total,
        current_streak,
        symbol_win_rates,
        streak_modifier,
        recent_modifier,
    }
}

fn streak(window: &[bool]) -> i32 {
    let Some(last) = window.last() else {
        return 0;
    };
    let run = window.iter().rev().take_while(|w| *w == last).count() as i32;
    if *last {
        run
    } else {
        -run
    }
}

/// Win rate over the rolling outcome window kept in the ledger.
pub fn win_rate(win_history: &[bool]) -> Option<Decimal> {
    if win_history.is_empty() {
        return None;
    }
    let wins = win_history.iter().filter(|w| **w).count();
    Decimal::from(wins as u64)
        .checked_div(Decimal::from(win_history.len() as u64))
        .map(|r| r * Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, rows: &[(&str, &str, &str)]) -> std::path::PathBuf {
        let path = dir.path().join("trade_history.csv");
        let mut content = String::from("timestamp,symbol,decision,status,pnl_amount\n");
        for (symbol, status, pnl) in rows {
            content.push_str(&format!("2025-01-02T10:00:00Z,{symbol},CLOSE_CALL,{status},{pnl}\n"));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_log_yields_neutral_context() {
        let dir = TempDir::new().unwrap();
        let ctx = decision_context(&dir.path().join("absent.csv"), 20);
        assert_eq!(ctx.total, 0);
        assert_eq!(ctx.current_streak, 0);
        assert_eq!(ctx.streak_modifier, 0.0);
        assert_eq!(ctx.recent_modifier, 0.0);
    }

    #[test]
    fn test_streak_and_modifiers() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            &[
                ("SPY", "CLOSED", "-10"),
                ("SPY", "CLOSED", "41"),
                ("SPY", "CLOSED", "12"),
                ("QQQ", "CLOSED", "5"),
            ],
        );
        let ctx = decision_context(&path, 20);
        assert_eq!(ctx.total, 4);
        assert_eq!(ctx.wins, 3);
        assert_eq!(ctx.current_streak, 3);
        assert!((ctx.streak_modifier - 0.06).abs() < 1e-9);
        // Last five outcomes: 3 wins, 1 loss -> (3-1)/5 * 0.05 = 0.02
        assert!((ctx.recent_modifier - 0.02).abs() < 1e-9);
        assert!((ctx.symbol_win_rates["SPY"] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(ctx.symbol_win_rates["QQQ"], 1.0);
    }

    #[test]
    fn test_streak_modifier_is_clamped() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<(&str, &str, &str)> = (0..8).map(|_| ("SPY", "CLOSED", "10")).collect();
        let path = write_log(&dir, &rows);
        let ctx = decision_context(&path, 20);
        assert_eq!(ctx.current_streak, 8);
        assert!((ctx.streak_modifier - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_non_closed_rows_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            &[
                ("SPY", "SUBMITTED", ""),
                ("SPY", "CANCELLED", ""),
                ("SPY", "CLOSED", "-10"),
            ],
        );
        let ctx = decision_context(&path, 20);
        assert_eq!(ctx.total, 1);
        assert_eq!(ctx.current_streak, -1);
        assert!((ctx.streak_modifier + 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_win_rate_helper() {
        assert_eq!(win_rate(&[]), None);
        let rate = win_rate(&[true, true, false, true]).unwrap();
        assert_eq!(rate, Decimal::from(75));
    }
}
