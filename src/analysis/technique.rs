use serde::{Deserialize, Serialize};

use crate::score::Hand;
use crate::scoring::{HitGrade, HitResult};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Timing,
    Dynamics,
    Articulation,
    Evenness,
}

/// One observation about why a passage went wrong.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TechniqueInsight {
    pub category: InsightCategory,
    /// 0.0 (minor) to 1.0 (critical).
    pub severity: f64,
    pub message: String,
    pub bar_range: Option<(u32, u32)>,
    pub hand: Option<Hand>,
}

impl TechniqueInsight {
    fn new(category: InsightCategory, severity: f64, message: String) -> Self {
        TechniqueInsight {
            category,
            severity: severity.min(1.0),
            message,
            bar_range: None,
            hand: None,
        }
    }

    fn for_hand(mut self, hand: Hand) -> Self {
        self.hand = Some(hand);
        self
    }
}

/// Diagnose a chronological result log. Insights come back most severe first.
pub fn analyze(results: &[HitResult]) -> Vec<TechniqueInsight> {
    if results.is_empty() {
        return Vec::new();
    }

    let mut insights = Vec::new();

    let (left, right) = split_by_hand(results);
    for (hand, hand_results) in [(Hand::Left, left), (Hand::Right, right)] {
        if hand_results.is_empty() {
            continue;
        }
        insights.extend(timing_drift(&hand_results, hand));
        insights.extend(timing_variance(&hand_results, hand));
        insights.extend(uneven_runs(&hand_results, hand));
    }

    let all: Vec<&HitResult> = results.iter().collect();
    insights.extend(rush_or_drag(&all));
    insights.extend(dynamic_mismatch(&all));
    insights.extend(articulation_errors(&all));

    insights.sort_by(|a, b| b.severity.total_cmp(&a.severity));
    insights
}

/// BOTH-tagged results count for each hand.
fn split_by_hand(results: &[HitResult]) -> (Vec<&HitResult>, Vec<&HitResult>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for r in results {
        match r.expected.hand {
            Hand::Left => left.push(r),
            Hand::Right => right.push(r),
            Hand::Both => {
                left.push(r);
                right.push(r);
            }
        }
    }
    (left, right)
}

fn played_hits<'a>(results: &[&'a HitResult]) -> Vec<&'a HitResult> {
    results.iter().copied().filter(|r| r.was_played_hit()).collect()
}

fn hand_name(hand: Hand) -> &'static str {
    if hand == Hand::Left {
        "Left hand"
    } else {
        "Right hand"
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// A hand that is consistently early or late by 15ms or more over 10+ hits.
fn timing_drift(results: &[&HitResult], hand: Hand) -> Option<TechniqueInsight> {
    let hits = played_hits(results);
    if hits.len() < 10 {
        return None;
    }
    let offset = mean(hits.iter().map(|r| r.timing_offset_ms));
    if offset.abs() < 15.0 {
        return None;
    }
    let direction = if offset < 0.0 { "early" } else { "late" };
    Some(
        TechniqueInsight::new(
            InsightCategory::Timing,
            offset.abs() / 80.0,
            format!(
                "{} is consistently {:.0}ms {}",
                hand_name(hand),
                offset.abs(),
                direction
            ),
        )
        .for_hand(hand),
    )
}

/// Unsteady timing: population standard deviation of 30ms or more.
fn timing_variance(results: &[&HitResult], hand: Hand) -> Option<TechniqueInsight> {
    let hits = played_hits(results);
    if hits.len() < 10 {
        return None;
    }
    let center = mean(hits.iter().map(|r| r.timing_offset_ms));
    let variance = mean(hits.iter().map(|r| (r.timing_offset_ms - center).powi(2)));
    let std_dev = variance.sqrt();
    if std_dev < 30.0 {
        return None;
    }
    Some(
        TechniqueInsight::new(
            InsightCategory::Timing,
            std_dev / 100.0,
            format!(
                "{} timing is unsteady (±{:.0}ms variance)",
                hand_name(hand),
                std_dev
            ),
        )
        .for_hand(hand),
    )
}

/// Second half of the session 20ms or more earlier (rushing) or later
/// (dragging) than the first half, over 20+ hits.
fn rush_or_drag(results: &[&HitResult]) -> Option<TechniqueInsight> {
    let hits = played_hits(results);
    if hits.len() < 20 {
        return None;
    }
    let mid = hits.len() / 2;
    let first = mean(hits[..mid].iter().map(|r| r.timing_offset_ms));
    let second = mean(hits[mid..].iter().map(|r| r.timing_offset_ms));
    let drift = second - first;
    if drift.abs() < 20.0 {
        return None;
    }
    let message = if drift < 0.0 {
        format!("Rushing: timing drifts {:.0}ms earlier by end of passage", drift.abs())
    } else {
        format!("Dragging: timing drifts {:.0}ms later by end of passage", drift.abs())
    };
    Some(TechniqueInsight::new(
        InsightCategory::Timing,
        drift.abs() / 80.0,
        message,
    ))
}

/// Weak grades concentrated in soft (velocity < 60) or loud (> 100) passages.
fn dynamic_mismatch(results: &[&HitResult]) -> Vec<TechniqueInsight> {
    let hits = played_hits(results);
    if hits.len() < 5 {
        return Vec::new();
    }

    let soft: Vec<&HitResult> = hits.iter().copied().filter(|r| r.expected.velocity < 60).collect();
    let loud: Vec<&HitResult> = hits.iter().copied().filter(|r| r.expected.velocity > 100).collect();

    let mut insights = Vec::new();
    if soft.len() >= 5 {
        let rate = weak_rate(&soft);
        if rate > 0.3 {
            insights.push(TechniqueInsight::new(
                InsightCategory::Dynamics,
                rate,
                "Struggling in piano (soft) passages — try lighter touch".to_string(),
            ));
        }
    }
    if loud.len() >= 5 {
        let rate = weak_rate(&loud);
        if rate > 0.3 {
            insights.push(TechniqueInsight::new(
                InsightCategory::Dynamics,
                rate,
                "Struggling in forte (loud) passages — need more confident attack".to_string(),
            ));
        }
    }
    insights
}

fn weak_rate(notes: &[&HitResult]) -> f64 {
    let weak = notes
        .iter()
        .filter(|r| matches!(r.grade, HitGrade::Ok | HitGrade::Miss))
        .count();
    weak as f64 / notes.len() as f64
}

/// Runs of 5+ stepwise notes (at most 2 semitones apart) with a mean
/// absolute timing error above 40ms.
fn uneven_runs(results: &[&HitResult], hand: Hand) -> Option<TechniqueInsight> {
    let hits = played_hits(results);
    if hits.len() < 8 {
        return None;
    }

    let mut runs: Vec<&[&HitResult]> = Vec::new();
    let mut run_start = 0;
    for i in 1..hits.len() {
        if hits[i].expected.pitch.abs_diff(hits[i - 1].expected.pitch) > 2 {
            if i - run_start >= 5 {
                runs.push(&hits[run_start..i]);
            }
            run_start = i;
        }
    }
    if hits.len() - run_start >= 5 {
        runs.push(&hits[run_start..]);
    }

    for run in runs {
        if run.iter().all(|r| r.expected.velocity == 0) {
            continue;
        }
        let error = mean(run.iter().map(|r| r.timing_offset_ms.abs()));
        if error > 40.0 {
            return Some(
                TechniqueInsight::new(
                    InsightCategory::Evenness,
                    error / 100.0,
                    format!(
                        "{} runs are uneven — average {:.0}ms timing error in scale passages",
                        hand_name(hand),
                        error
                    ),
                )
                .for_hand(hand),
            );
        }
    }
    None
}

/// Short notes (under 0.2s) missed more than 40% of the time, over 5+ notes.
fn articulation_errors(results: &[&HitResult]) -> Option<TechniqueInsight> {
    let short: Vec<&HitResult> = results
        .iter()
        .copied()
        .filter(|r| r.expected.duration < 0.2)
        .collect();
    if short.len() < 5 {
        return None;
    }
    let missed = short.iter().filter(|r| r.grade == HitGrade::Miss).count();
    let rate = missed as f64 / short.len() as f64;
    if rate <= 0.4 {
        return None;
    }
    Some(TechniqueInsight::new(
        InsightCategory::Articulation,
        rate,
        "Staccato passages need crisper release — notes are held too long".to_string(),
    ))
}
