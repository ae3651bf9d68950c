//! Chained-coalesce + last-writer-wins merge engine.
//!
//! Reconciles accumulated local and remote updates against a baseline
//! line vector:
//!
//! 1. union local and remote updates
//! 2. coalesce chained same-user edits (`A→B→C` collapses to `A→C`)
//! 3. resolve overlapping survivors via LWW (timestamp, then uid)
//! 4. group survivors per line, sort by column then timestamp
//! 5. apply left-to-right with running offset tracking
//! 6. extend the line vector for survivors past its end
//!
//! The comparator is a strict total order (nanosecond timestamp with a
//! lexicographic uid tie-break), so any two peers holding the same
//! update set converge on identical line vectors regardless of input
//! order.
//!
//! Reference: Kleppmann — Designing Data-Intensive Applications,
//! Chapter 5 (Last Write Wins).

use std::collections::BTreeMap;

use crate::update::{UpdateExt, MAX_LINES};

/// Whether two updates conflict.
///
/// Updates overlap when they target the same line and either both are
/// pure insertions at the same column, or their column ranges
/// `[cs, cs + |old_text|)` intersect (half-open).
pub fn overlaps(a: &UpdateExt, b: &UpdateExt) -> bool {
    if a.line != b.line {
        return false;
    }

    // Two inserts at the same position conflict.
    if a.old_text.is_empty() && b.old_text.is_empty() && a.cs == b.cs {
        return true;
    }

    let a_end = a.cs + a.old_text.chars().count() as i32;
    let b_end = b.cs + b.old_text.chars().count() as i32;
    !(a_end <= b.cs || b_end <= a.cs)
}

/// LWW comparator: newer timestamp wins, tie-break by smaller uid.
pub fn newer_wins(a: &UpdateExt, b: &UpdateExt) -> bool {
    if a.ts != b.ts {
        return a.ts > b.ts;
    }
    a.uid < b.uid
}

/// Apply a single update to one line, without offset tracking.
///
/// Out-of-range columns are clamped; malformed ranges are a no-op
/// rather than an error. An empty line becomes the update's `new_text`.
pub fn apply_update_to_line(cur: &str, u: &UpdateExt) -> String {
    if cur.is_empty() {
        return u.new_text.clone();
    }
    let chars: Vec<char> = cur.chars().collect();
    match splice(&chars, u, 0) {
        Some((next, _)) => next.into_iter().collect(),
        None => cur.to_string(),
    }
}

/// Splice one update into a char buffer at `offset`-adjusted columns.
///
/// Returns the new buffer and the length delta this update contributed,
/// or `None` when the adjusted range has collapsed and nothing applies.
/// Pure insertions consume a zero-length span at the insertion point.
fn splice(chars: &[char], u: &UpdateExt, offset: i32) -> Option<(Vec<char>, i32)> {
    let cur_len = chars.len() as i32;
    let is_insert = u.old_text.is_empty();

    let adj_cs = (u.cs + offset).clamp(0, cur_len);
    let adj_ce = (u.ce + offset).min(cur_len - 1);
    if adj_cs > adj_ce && !is_insert {
        return None;
    }

    // Insertions replace nothing; deletes/replaces consume the span.
    let (span, tail_start) = if is_insert {
        (0, adj_cs)
    } else {
        (adj_ce - adj_cs + 1, adj_ce + 1)
    };

    let mut next: Vec<char> = chars[..adj_cs as usize].to_vec();
    next.extend(u.new_text.chars());
    if (tail_start as usize) < chars.len() {
        next.extend_from_slice(&chars[tail_start as usize..]);
    }

    Some((next, u.new_text.chars().count() as i32 - span))
}

/// Merge accumulated updates into `lines`.
///
/// Returns `true` iff any survivor was applied; the caller decides
/// whether to adopt the result and is responsible for clearing both
/// input lists afterwards.
pub fn merge_apply(
    lines: &mut Vec<String>,
    local: &[UpdateExt],
    remote: &[UpdateExt],
    _self_uid: &str,
) -> bool {
    if local.is_empty() && remote.is_empty() {
        return false;
    }

    // Step 1: union, local first.
    let mut all: Vec<UpdateExt> = Vec::with_capacity(local.len() + remote.len());
    all.extend_from_slice(local);
    all.extend_from_slice(remote);

    // Step 2: coalesce chained same-user edits. When one user extends a
    // span incrementally (B's old_text equals A's new_text at the same
    // position), fold the chain into A so LWW sees a single update.
    // Liveness is tracked out of band; no sentinel values in payloads.
    let mut alive = vec![true; all.len()];
    for i in 0..all.len() {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..all.len() {
            if !alive[j] {
                continue;
            }
            if all[i].line == all[j].line
                && all[i].uid == all[j].uid
                && all[i].cs == all[j].cs
                && all[i].new_text == all[j].old_text
            {
                all[i].new_text = all[j].new_text.clone();
                all[i].ts = all[j].ts;
                alive[j] = false;
            }
        }
    }

    // Step 3: LWW conflict resolution over live pairs.
    for i in 0..all.len() {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..all.len() {
            if !alive[j] {
                continue;
            }
            if overlaps(&all[i], &all[j]) {
                if newer_wins(&all[i], &all[j]) {
                    alive[j] = false;
                } else {
                    alive[i] = false;
                    break;
                }
            }
        }
    }

    // Step 4: group survivors per line, ordered by line index.
    let mut per_line: BTreeMap<u32, Vec<UpdateExt>> = BTreeMap::new();
    let mut any = false;
    for (u, live) in all.into_iter().zip(alive) {
        if live {
            any = true;
            per_line.entry(u.line).or_default().push(u);
        }
    }
    if !any {
        return false;
    }

    // Steps 5 & 6: apply each line's group with offset tracking,
    // extending the line vector where survivors reference lines past
    // its end.
    for (line_num, mut group) in per_line {
        if line_num >= MAX_LINES {
            log::warn!("discarding update group beyond line cap: line {line_num}");
            continue;
        }
        while lines.len() <= line_num as usize {
            lines.push(String::new());
        }

        group.sort_by(|a, b| a.cs.cmp(&b.cs).then(b.ts.cmp(&a.ts)));

        let mut chars: Vec<char> = lines[line_num as usize].chars().collect();
        let mut offset: i32 = 0;
        for u in &group {
            if chars.is_empty() {
                // An empty baseline line takes the update's new_text
                // wholesale; nothing was replaced.
                chars = u.new_text.chars().collect();
                offset += u.new_text.chars().count() as i32;
                continue;
            }
            if let Some((next, delta)) = splice(&chars, u, offset) {
                chars = next;
                offset += delta;
            }
        }
        lines[line_num as usize] = chars.into_iter().collect();
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::OpKind;

    fn upd(
        ts: u64,
        uid: &str,
        line: u32,
        cs: i32,
        old_text: &str,
        new_text: &str,
    ) -> UpdateExt {
        let op = if old_text.is_empty() {
            OpKind::Insert
        } else if new_text.is_empty() {
            OpKind::Delete
        } else {
            OpKind::Replace
        };
        let ce = if old_text.is_empty() {
            cs
        } else {
            cs + old_text.chars().count() as i32 - 1
        };
        UpdateExt {
            ts,
            uid: uid.to_string(),
            line,
            cs,
            ce,
            op,
            old_text: old_text.to_string(),
            new_text: new_text.to_string(),
        }
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_overlap_same_position_inserts() {
        let a = upd(1, "a", 0, 3, "", "x");
        let b = upd(2, "b", 0, 3, "", "y");
        assert!(overlaps(&a, &b));
    }

    #[test]
    fn test_no_overlap_different_insert_points() {
        let a = upd(1, "a", 0, 3, "", "x");
        let b = upd(2, "b", 0, 4, "", "y");
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_overlap_intersecting_ranges() {
        let a = upd(1, "a", 0, 0, "hello", "H");
        let b = upd(2, "b", 0, 4, "o w", "O W");
        assert!(overlaps(&a, &b));
    }

    #[test]
    fn test_no_overlap_disjoint_ranges() {
        let a = upd(1, "a", 0, 0, "hello", "HELLO");
        let b = upd(2, "b", 0, 6, "world", "WORLD");
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_no_overlap_different_lines() {
        let a = upd(1, "a", 0, 0, "x", "y");
        let b = upd(2, "b", 1, 0, "x", "y");
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_newer_wins_by_timestamp_then_uid() {
        let a = upd(100, "a", 0, 0, "x", "y");
        let b = upd(200, "b", 0, 0, "x", "z");
        assert!(!newer_wins(&a, &b));
        assert!(newer_wins(&b, &a));

        let tie_a = upd(300, "a", 0, 0, "x", "y");
        let tie_b = upd(300, "b", 0, 0, "x", "z");
        assert!(newer_wins(&tie_a, &tie_b));
        assert!(!newer_wins(&tie_b, &tie_a));
    }

    #[test]
    fn test_apply_update_to_line_replace() {
        let u = upd(1, "a", 0, 0, "cat", "dog");
        assert_eq!(apply_update_to_line("cat", &u), "dog");
    }

    #[test]
    fn test_apply_update_to_line_empty_baseline() {
        let u = upd(1, "a", 0, 4, "missing", "text");
        assert_eq!(apply_update_to_line("", &u), "text");
    }

    #[test]
    fn test_apply_update_to_line_clamps_range() {
        let u = upd(1, "a", 0, 1, "bcdefg", "X");
        assert_eq!(apply_update_to_line("abc", &u), "aX");
    }

    #[test]
    fn test_merge_empty_inputs_no_change() {
        let mut l = lines(&["abc"]);
        assert!(!merge_apply(&mut l, &[], &[], "u1"));
        assert_eq!(l, lines(&["abc"]));
    }

    #[test]
    fn test_merge_single_insert() {
        let mut l = lines(&["abc"]);
        let local = vec![upd(100, "u1", 0, 1, "", "X")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["aXbc"]));
    }

    #[test]
    fn test_merge_concurrent_disjoint_edits() {
        let mut l = lines(&["hello world"]);
        let local = vec![upd(200, "a", 0, 0, "hello", "HELLO")];
        let remote = vec![upd(210, "b", 0, 6, "world", "WORLD")];
        assert!(merge_apply(&mut l, &local, &remote, "a"));
        assert_eq!(l, lines(&["HELLO WORLD"]));
    }

    #[test]
    fn test_merge_lww_timestamp_wins() {
        let mut l = lines(&["cat"]);
        let local = vec![upd(100, "a", 0, 0, "cat", "dog")];
        let remote = vec![upd(200, "b", 0, 0, "cat", "bat")];
        assert!(merge_apply(&mut l, &local, &remote, "a"));
        assert_eq!(l, lines(&["bat"]));
    }

    #[test]
    fn test_merge_lww_tie_uid_breaks() {
        let mut l = lines(&["cat"]);
        let local = vec![upd(300, "a", 0, 0, "cat", "dog")];
        let remote = vec![upd(300, "b", 0, 0, "cat", "bat")];
        assert!(merge_apply(&mut l, &local, &remote, "a"));
        assert_eq!(l, lines(&["dog"]));
    }

    #[test]
    fn test_merge_chained_coalesce() {
        let mut l = lines(&["ab"]);
        let local = vec![
            upd(10, "u1", 0, 2, "", "c"),
            upd(20, "u1", 0, 2, "c", "cd"),
        ];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["abcd"]));
    }

    #[test]
    fn test_coalesce_three_link_chain() {
        // A→B→C collapses to one update carrying A.old and C.new.
        let mut l = lines(&["xy"]);
        let local = vec![
            upd(10, "u1", 0, 2, "", "a"),
            upd(20, "u1", 0, 2, "a", "ab"),
            upd(30, "u1", 0, 2, "ab", "abc"),
        ];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["xyabc"]));
    }

    #[test]
    fn test_merge_line_append_extends() {
        let mut l = lines(&["x", "y"]);
        let local = vec![upd(5, "u1", 2, 0, "", "z")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["x", "y", "z"]));
    }

    #[test]
    fn test_merge_line_extension_with_gap() {
        let mut l = lines(&["a"]);
        let local = vec![upd(5, "u1", 3, 0, "", "d")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["a", "", "", "d"]));
    }

    #[test]
    fn test_merge_discards_beyond_line_cap() {
        let mut l = lines(&["a"]);
        let local = vec![upd(5, "u1", MAX_LINES, 0, "", "z")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["a"]));
    }

    #[test]
    fn test_merge_convergence_swapped_inputs() {
        // LWW determinism: swapping which side is "local" must not
        // change the result.
        let base = lines(&["hello world", "second"]);
        let u1 = vec![
            upd(100, "a", 0, 0, "hello", "HOWDY"),
            upd(150, "a", 1, 0, "", "> "),
        ];
        let u2 = vec![
            upd(200, "b", 0, 0, "hello", "SALUT"),
            upd(90, "b", 1, 6, "", "!"),
        ];

        let mut one = base.clone();
        merge_apply(&mut one, &u1, &u2, "a");
        let mut two = base.clone();
        merge_apply(&mut two, &u2, &u1, "b");
        assert_eq!(one, two);
    }

    #[test]
    fn test_merge_non_conflict_commutativity() {
        let base = lines(&["hello world"]);
        let a = vec![upd(200, "a", 0, 0, "hello", "HELLO")];
        let b = vec![upd(210, "b", 0, 6, "world", "WORLD")];

        let mut as_local = base.clone();
        merge_apply(&mut as_local, &a, &b, "a");
        let mut as_remote = base.clone();
        merge_apply(&mut as_remote, &b, &a, "b");
        assert_eq!(as_local, as_remote);
        assert_eq!(as_local, lines(&["HELLO WORLD"]));
    }

    #[test]
    fn test_insert_at_end_of_line_collapsed_range() {
        // cs == ce == |line| makes the clamped adj_ce smaller than
        // adj_cs; the insert must still land at the line's end.
        let mut l = lines(&["ab"]);
        let local = vec![upd(7, "u1", 0, 2, "", "X")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["abX"]));
    }

    #[test]
    fn test_collapsed_range_replace_skipped() {
        // A replace whose adjusted range has collapsed applies nothing.
        let mut l = lines(&["ab"]);
        let local = vec![upd(7, "u1", 0, 10, "zz", "XX")];
        assert!(merge_apply(&mut l, &local, &[], "u1"));
        assert_eq!(l, lines(&["ab"]));
    }

    #[test]
    fn test_losers_do_not_apply() {
        // The overlap loser is retired entirely, not partially applied.
        let mut l = lines(&["abcdef"]);
        let local = vec![upd(100, "a", 0, 0, "abc", "111")];
        let remote = vec![upd(200, "b", 0, 2, "cde", "222")];
        assert!(merge_apply(&mut l, &local, &remote, "a"));
        assert_eq!(l, lines(&["ab222f"]));
    }

    #[test]
    fn test_delete_whole_line_leaves_empty_line() {
        let mut l = lines(&["keep", "drop"]);
        let local = vec![upd(100, "a", 1, 0, "drop", "")];
        assert!(merge_apply(&mut l, &local, &[], "a"));
        assert_eq!(l, lines(&["keep", ""]));
    }
}
