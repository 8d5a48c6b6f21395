//! Component F, the Queue Generator: the three-phase (Q1/Q2/Q3) candidate selection algorithm.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::model::{PracticeListRow, TuneId};
use crate::window::Windows;

/// One selected candidate, carrying the bucket it was classified into and the full joined row
/// so the caller can snapshot or serialize it without a second lookup.
#[derive(Clone, Debug)]
pub struct QueueCandidate {
    pub tune_ref: TuneId,
    pub bucket: u8,
    pub ts: DateTime<Utc>,
    pub row: PracticeListRow,
}

/// Robust timestamp parsing: ISO-8601 with `T` or space separator, with or without a zone
/// suffix, falling back to `%Y-%m-%d %H:%M:%S`/`%Y-%m-%dT%H:%M:%S` assumed-UTC. Returns `None`
/// on total parse failure (the caller applies the "bucket 1" lenient default).
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if raw.contains(' ') && !raw.contains('T') {
        let alt = raw.replacen(' ', "T", 1);
        if let Ok(dt) = DateTime::parse_from_rfc3339(&alt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Classifies an already-parsed timestamp against the window boundaries.
pub fn classify_bucket(ts: DateTime<Utc>, windows: &Windows) -> u8 {
    if ts >= windows.start_of_day_utc && ts < windows.end_of_day_utc {
        1
    } else if ts >= windows.window_floor_utc && ts < windows.start_of_day_utc {
        2
    } else {
        3
    }
}

/// Resolves a coalesced timestamp string into a `(dt, bucket)` pair, or `None` when there is no
/// timestamp at all (candidate has neither a `scheduled` override nor any practice history — it
/// cannot satisfy any phase's range filter and so never surfaces). A *present but unparseable*
/// string still gets a row — defaulted to `(window start, bucket 1)`, the lenient default the
/// bucket-annotation rule calls for.
pub fn resolve_bucket(raw: Option<&str>, windows: &Windows) -> Option<(DateTime<Utc>, u8)> {
    let raw = raw?;
    Some(match parse_ts(raw) {
        Some(dt) => (dt, classify_bucket(dt, windows)),
        None => (windows.start_of_day_utc, 1),
    })
}

/// Runs the three-phase selection over the candidate universe. `max_reviews_per_day == 0` means
/// uncapped; `min_reviews_per_day == 0` means Q3 is never triggered even when `enable_backfill`.
pub fn generate_queue(
    candidates: &[PracticeListRow],
    windows: &Windows,
    min_reviews_per_day: i64,
    max_reviews_per_day: i64,
    enable_backfill: bool,
) -> Vec<QueueCandidate> {
    let max = (max_reviews_per_day > 0).then_some(max_reviews_per_day);
    let min = min_reviews_per_day.max(0);

    let annotated: Vec<(TuneId, DateTime<Utc>, u8, &PracticeListRow)> = candidates
        .iter()
        .filter_map(|row| {
            let (ts, bucket) = resolve_bucket(row.coalesced_ts(), windows)?;
            Some((row.id, ts, bucket, row))
        })
        .collect();

    let mut seen: HashSet<TuneId> = HashSet::new();
    let mut collected: Vec<QueueCandidate> = Vec::new();
    let at_max = |collected: &[QueueCandidate]| max.is_some_and(|m| collected.len() as i64 >= m);

    let mut q1: Vec<_> = annotated.iter().filter(|(_, _, b, _)| *b == 1).collect();
    q1.sort_by_key(|(_, ts, _, _)| *ts);
    for (tune_ref, ts, bucket, row) in q1 {
        if at_max(&collected) {
            break;
        }
        if seen.insert(*tune_ref) {
            collected.push(QueueCandidate {
                tune_ref: *tune_ref,
                bucket: *bucket,
                ts: *ts,
                row: (*row).clone(),
            });
        }
    }
    if at_max(&collected) {
        return collected;
    }

    let mut q2: Vec<_> = annotated.iter().filter(|(_, _, b, _)| *b == 2).collect();
    q2.sort_by_key(|(_, ts, _, _)| std::cmp::Reverse(*ts));
    for (tune_ref, ts, bucket, row) in q2 {
        if at_max(&collected) {
            break;
        }
        if seen.insert(*tune_ref) {
            collected.push(QueueCandidate {
                tune_ref: *tune_ref,
                bucket: *bucket,
                ts: *ts,
                row: (*row).clone(),
            });
        }
    }
    if at_max(&collected) || (collected.len() as i64) >= min {
        return collected;
    }
    if !enable_backfill {
        return collected;
    }

    let mut remaining_for_min = min - collected.len() as i64;
    if let Some(m) = max {
        remaining_for_min = remaining_for_min.min(m - collected.len() as i64);
    }
    if remaining_for_min <= 0 {
        return collected;
    }

    let mut q3: Vec<_> = annotated.iter().filter(|(_, _, b, _)| *b == 3).collect();
    q3.sort_by_key(|(_, ts, _, _)| std::cmp::Reverse(*ts));
    let mut added = 0i64;
    for (tune_ref, ts, bucket, row) in q3 {
        if added >= remaining_for_min {
            break;
        }
        if seen.insert(*tune_ref) {
            collected.push(QueueCandidate {
                tune_ref: *tune_ref,
                bucket: *bucket,
                ts: *ts,
                row: (*row).clone(),
            });
            added += 1;
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(id: TuneId, scheduled: Option<&str>, latest_review_date: Option<&str>) -> PracticeListRow {
        PracticeListRow {
            id,
            title: format!("tune-{id}"),
            r#type: None,
            structure: None,
            mode: None,
            incipit: None,
            genre: None,
            deleted: false,
            private_for: None,
            learned: None,
            scheduled: scheduled.map(str::to_string),
            latest_practiced: None,
            latest_quality: None,
            latest_easiness: None,
            latest_difficulty: None,
            latest_interval: None,
            latest_step: None,
            latest_repetitions: None,
            latest_review_date: latest_review_date.map(str::to_string),
            latest_goal: None,
            latest_technique: None,
            tags: String::new(),
            playlist_ref: 1,
            user_ref: 1,
            playlist_deleted: false,
            notes: String::new(),
            favorite_url: String::new(),
            has_override: scheduled.is_some(),
            recall_eval: None,
            has_staged: false,
        }
    }

    fn windows() -> Windows {
        crate::window::compute_windows(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), None, 7)
    }

    #[test]
    fn q1_ordered_ascending_and_capacity_respected() {
        let windows = windows();
        let candidates = vec![
            row(1, Some("2025-01-01 08:00:00"), None),
            row(2, Some("2025-01-01 02:00:00"), None),
        ];
        let result = generate_queue(&candidates, &windows, 3, 5, false);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].tune_ref, 2);
        assert_eq!(result[1].tune_ref, 1);
    }

    #[test]
    fn scenario_capacity_min3_max5() {
        let windows = windows();
        let mut candidates = vec![
            row(1, Some("2025-01-01 08:00:00"), None),
            row(2, Some("2025-01-01 02:00:00"), None),
            row(3, Some("2024-12-30 00:00:00"), None), // 2 days lapsed
        ];
        for i in 10..20 {
            candidates.push(row(i, Some("2024-12-01 00:00:00"), None)); // older backlog
        }
        let result = generate_queue(&candidates, &windows, 3, 5, false);
        assert_eq!(result.len(), 3);
        assert_eq!(result.iter().filter(|c| c.bucket == 1).count(), 2);
        assert_eq!(result.iter().filter(|c| c.bucket == 2).count(), 1);
        assert!(result.iter().all(|c| c.bucket != 3));
    }

    #[test]
    fn max_zero_never_caps() {
        let windows = windows();
        let candidates: Vec<_> = (0..20)
            .map(|i| row(i, Some("2025-01-01 08:00:00"), None))
            .collect();
        let result = generate_queue(&candidates, &windows, 0, 0, false);
        assert_eq!(result.len(), 20);
    }

    #[test]
    fn min_zero_never_triggers_q3() {
        let windows = windows();
        let candidates = vec![row(1, Some("2024-01-01 00:00:00"), None)];
        let result = generate_queue(&candidates, &windows, 0, 10, true);
        assert!(result.is_empty());
    }

    #[test]
    fn dedup_across_phases() {
        let windows = windows();
        // Same tune scheduled in window but with two candidate rows sharing the id should
        // collapse to one selection.
        let candidates = vec![
            row(1, Some("2025-01-01 08:00:00"), None),
            row(1, Some("2025-01-01 08:00:00"), None),
        ];
        let result = generate_queue(&candidates, &windows, 3, 5, false);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn unparseable_timestamp_defaults_to_bucket_one() {
        let windows = windows();
        let candidates = vec![row(1, Some("not-a-timestamp"), None)];
        let result = generate_queue(&candidates, &windows, 3, 5, false);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].bucket, 1);
    }

    #[test]
    fn missing_timestamp_is_not_selected() {
        let windows = windows();
        let candidates = vec![row(1, None, None)];
        let result = generate_queue(&candidates, &windows, 0, 0, true);
        assert!(result.is_empty());
    }
}
