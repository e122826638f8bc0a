//! Local duplicate detection on key columns.
//!
//! Runs before any network call. Rows sharing the same values on every key
//! column are reported and their key cells tagged `DuplicateLocal`. Purely
//! advisory: nothing is removed and nothing is blocked.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::grid::{CellTag, Grid};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// One row that matches other rows on the composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    /// Grid row index.
    pub row: usize,
    /// Other rows sharing the key, ascending.
    pub others: Vec<usize>,
    /// Matching key, e.g. `"value=evil.com; type=domain"`.
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Finds rows that share values on every column in `key_columns`.
///
/// Key columns are resolved with [`Grid::column_index`]; unknown columns are
/// skipped. Text compares case-insensitively and blank key cells never match.
///
/// The result is sorted by description descending, then row descending, so
/// rows with the same key stay adjacent regardless of their positions.
pub fn find_duplicates(grid: &Grid, key_columns: &[String]) -> Vec<DuplicateMatch> {
    let columns = resolve_columns(grid, key_columns);
    let Some(((first_col, first_label), rest)) = columns.split_first() else {
        return Vec::new();
    };

    // First key: group rows by value.
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..grid.row_count() {
        if grid.is_row_empty(row) {
            continue;
        }
        if let Some(key) = key_at(grid, row, *first_col) {
            groups.entry(key).or_default().push(row);
        }
    }

    let mut candidates: BTreeMap<usize, (Vec<usize>, String)> = BTreeMap::new();
    for (key, members) in &groups {
        if members.len() < 2 {
            continue;
        }
        for &row in members {
            let others: Vec<usize> = members.iter().copied().filter(|&o| o != row).collect();
            candidates.insert(row, (others, format!("{}={}", first_label, key)));
        }
    }

    // Further keys: narrow each row's candidates.
    for (col, label) in rest {
        candidates.retain(|&row, (others, description)| {
            let Some(key) = key_at(grid, row, *col) else {
                return false;
            };
            others.retain(|&other| key_at(grid, other, *col).as_deref() == Some(key.as_str()));
            if others.is_empty() {
                return false;
            }
            description.push_str(&format!("; {}={}", label, key));
            true
        });
    }

    let mut matches: Vec<DuplicateMatch> = candidates
        .into_iter()
        .map(|(row, (mut others, description))| {
            others.sort_unstable();
            DuplicateMatch {
                row,
                others,
                description,
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.description
            .cmp(&a.description)
            .then_with(|| b.row.cmp(&a.row))
    });

    if !matches.is_empty() {
        info!(
            "[DEDUPE] {} row(s) share keys on {:?}",
            matches.len(),
            key_columns
        );
    }

    matches
}

/// Tags the key cells of every matched row as local duplicates.
pub fn annotate_duplicates(grid: &mut Grid, matches: &[DuplicateMatch], key_columns: &[String]) {
    let columns = resolve_columns(grid, key_columns);
    for m in matches {
        let message = duplicate_message(m);
        for (col, _) in &columns {
            grid.annotate_cell(m.row, *col, CellTag::DuplicateLocal, &message);
        }
    }
}

/// Human-readable warning for one match. Row numbers are 1-based.
pub fn duplicate_message(m: &DuplicateMatch) -> String {
    let rows: Vec<String> = m.others.iter().map(|r| (r + 1).to_string()).collect();
    format!(
        "Row {} may duplicate row(s) {} ({})",
        m.row + 1,
        rows.join(", "),
        m.description
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn resolve_columns(grid: &Grid, key_columns: &[String]) -> Vec<(usize, String)> {
    key_columns
        .iter()
        .filter_map(|name| match grid.column_index(name) {
            Some(col) => Some((col, grid.header_label(col).unwrap_or_else(|| name.clone()))),
            None => {
                warn!("[DEDUPE] Key column {:?} not found, skipping", name);
                None
            }
        })
        .collect()
}

fn key_at(grid: &Grid, row: usize, col: usize) -> Option<String> {
    grid.cell(row, col).and_then(|v| v.match_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;

    fn grid(headers: &[&str], rows: &[&[&str]]) -> Grid {
        Grid::from_rows(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|c| {
                            if c.is_empty() {
                                CellValue::Null
                            } else {
                                CellValue::from(*c)
                            }
                        })
                        .collect()
                })
                .collect(),
        )
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn single_key_pairs_rows_both_ways() {
        let grid = grid(&["id"], &[&["a"], &["b"], &["a"]]);

        let matches = find_duplicates(&grid, &keys(&["id"]));

        assert_eq!(
            matches,
            vec![
                DuplicateMatch {
                    row: 2,
                    others: vec![0],
                    description: "id=a".into()
                },
                DuplicateMatch {
                    row: 0,
                    others: vec![2],
                    description: "id=a".into()
                },
            ]
        );
        assert!(matches.iter().all(|m| m.row != 1));
    }

    #[test]
    fn text_compares_case_insensitively() {
        let grid = grid(&["value"], &[&["Evil.com"], &["evil.COM"]]);
        let matches = find_duplicates(&grid, &keys(&["value"]));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].description, "value=evil.com");
    }

    #[test]
    fn blank_keys_and_empty_rows_never_match() {
        let grid = grid(&["id", "note"], &[&["", "x"], &["", "y"], &["", ""], &["", ""]]);
        assert!(find_duplicates(&grid, &keys(&["id"])).is_empty());
    }

    #[test]
    fn composite_key_narrows_candidates() {
        let grid = grid(
            &["value", "type"],
            &[
                &["1.2.3.4", "IPv4"],
                &["1.2.3.4", "IPv4"],
                &["1.2.3.4", "Domain"],
                &["evil.com", "Domain"],
            ],
        );

        let wide = find_duplicates(&grid, &keys(&["value"]));
        let narrow = find_duplicates(&grid, &keys(&["value", "type"]));

        assert_eq!(wide.len(), 3);
        assert_eq!(narrow.len(), 2);
        for m in &narrow {
            let before = wide.iter().find(|w| w.row == m.row).expect("subset");
            assert!(m.others.iter().all(|o| before.others.contains(o)));
            assert_eq!(m.description, "value=1.2.3.4; type=ipv4");
        }
    }

    #[test]
    fn detection_is_idempotent() {
        let grid = grid(&["id"], &[&["a"], &["b"], &["a"], &["b"], &["c"]]);
        let first = find_duplicates(&grid, &keys(&["id"]));
        let second = find_duplicates(&grid, &keys(&["id"]));
        assert_eq!(first, second);
    }

    #[test]
    fn sorted_by_description_then_row_descending() {
        let grid = grid(&["id"], &[&["a"], &["b"], &["a"], &["b"]]);
        let order: Vec<(usize, String)> = find_duplicates(&grid, &keys(&["id"]))
            .into_iter()
            .map(|m| (m.row, m.description))
            .collect();
        assert_eq!(
            order,
            vec![
                (3, "id=b".to_string()),
                (1, "id=b".to_string()),
                (2, "id=a".to_string()),
                (0, "id=a".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_key_column_is_skipped() {
        let grid = grid(&["id"], &[&["a"], &["a"]]);
        assert_eq!(find_duplicates(&grid, &keys(&["missing", "id"])).len(), 2);
        assert!(find_duplicates(&grid, &keys(&["missing"])).is_empty());
    }

    #[test]
    fn annotation_tags_key_cells_only() {
        let mut grid = grid(&["id", "note"], &[&["a", "x"], &["b", "y"], &["a", "z"]]);
        let key_columns = keys(&["id"]);
        let matches = find_duplicates(&grid, &key_columns);

        annotate_duplicates(&mut grid, &matches, &key_columns);

        assert!(grid.tags(0, 0).has(CellTag::DuplicateLocal));
        assert!(grid.tags(2, 0).has(CellTag::DuplicateLocal));
        assert!(grid.tags(0, 1).is_empty());
        assert!(grid.tags(1, 0).is_empty());
        assert_eq!(
            grid.message(0, 0),
            Some("Row 1 may duplicate row(s) 3 (id=a)")
        );
    }
}
