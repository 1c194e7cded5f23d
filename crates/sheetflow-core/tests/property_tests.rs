//! Property-based tests for cleaning, inference, merging and text truncation.
//!
//! ```bash
//! PROPTEST_CASES=10000 cargo test -p sheetflow-core --test property_tests
//! ```

use proptest::prelude::*;

use std::collections::HashMap;

use sheetflow_core::coerce::truncate_chars;
use sheetflow_core::{
    CleanConfig, Cleaner, Column, DedupPolicy, MergeEngine, MergeSpec, MergeStep, NullPolicy,
    SchemaConfig, SchemaInferencer, SemanticType, Table, TextCapacity, Value, WidthPolicy,
};

// =============================================================================
// Test Strategies
// =============================================================================

/// Cells that mix integers, decimals, words and blanks
fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        "-?[0-9]{1,6}",
        "-?[0-9]{1,4}\\.[0-9]{1,3}",
        "[a-zA-Z ]{1,12}",
        Just(String::new()),
    ]
}

/// A three-column sheet of up to 30 rows
fn sheet() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(cell(), 3), 0..30)
}

fn table(rows: &[Vec<String>]) -> Table {
    let rows: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    Table::from_text_rows("sheet", &["a", "b", "c"], &rows).unwrap()
}

fn cleaner(null_policy: NullPolicy) -> Cleaner {
    cleaner_with(null_policy, DedupPolicy::ExactRow)
}

fn cleaner_with(null_policy: NullPolicy, dedup: DedupPolicy) -> Cleaner {
    Cleaner::new(CleanConfig {
        null_policy,
        dedup,
        coerce_datetimes: false,
    })
}

/// Small key space so joins see repeats and misses
fn keys() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..6, 0..20)
}

fn keyed(name: &str, value_column: &str, keys: &[i64]) -> Table {
    let columns = vec![
        Column::new("k", SemanticType::Integer),
        Column::new(value_column, SemanticType::unbounded_text()),
    ];
    let rows = keys
        .iter()
        .enumerate()
        .map(|(i, k)| vec![Value::Integer(*k), Value::from(format!("{}{}", name, i))])
        .collect();
    Table::new(name, columns, rows).unwrap()
}

fn counts(keys: &[i64]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for k in keys {
        *counts.entry(*k).or_insert(0) += 1;
    }
    counts
}

fn inferencer(width: WidthPolicy) -> SchemaInferencer {
    SchemaInferencer::new(SchemaConfig {
        width,
        strict_typing: false,
    })
}

// =============================================================================
// Cleaner
// =============================================================================

proptest! {
    #[test]
    fn prop_clean_is_idempotent(rows in sheet()) {
        for policy in [NullPolicy::DropAnyNull, NullPolicy::DropAllNull] {
            for dedup in [DedupPolicy::ExactRow, DedupPolicy::Columns(vec!["a".into()])] {
                let cleaner = cleaner_with(policy, dedup);
                let once = cleaner.clean(table(&rows));
                let twice = cleaner.clean(once.clone());
                prop_assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn prop_clean_never_adds_rows(rows in sheet()) {
        let cleaned = cleaner(NullPolicy::DropAllNull).clean(table(&rows));
        prop_assert!(cleaned.row_count() <= rows.len());
        prop_assert_eq!(cleaned.columns().len(), 3);
    }
}

// =============================================================================
// Schema inference
// =============================================================================

proptest! {
    #[test]
    fn prop_inference_is_deterministic(rows in sheet()) {
        let cleaned = cleaner(NullPolicy::DropAllNull).clean(table(&rows));
        let inferencer = inferencer(WidthPolicy::Capped(8));
        let first = inferencer.infer(&cleaned).unwrap();
        let second = inferencer.infer(&cleaned).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_capped_width_within_bounds(rows in sheet(), cap in 1usize..64) {
        let schema = inferencer(WidthPolicy::Capped(cap)).infer(&table(&rows)).unwrap();
        for column in &schema.columns {
            if let SemanticType::Text(TextCapacity::Bounded(n)) = column.semantic_type {
                prop_assert!(n >= 1 && n <= cap, "width {} outside 1..={}", n, cap);
            }
        }
    }
}

// =============================================================================
// Merge
// =============================================================================

proptest! {
    #[test]
    fn prop_inner_join_pairs_every_matching_key(left in keys(), right in keys()) {
        let tables: HashMap<String, Table> = [keyed("left", "lv", &left), keyed("right", "rv", &right)]
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        let spec = MergeSpec::new(vec![MergeStep::new("left", "right", "k")]);
        let merged = MergeEngine::new().merge(&tables, &spec, "merged").unwrap();

        let left_counts = counts(&left);
        let right_counts = counts(&right);
        for row in merged.rows() {
            let Value::Integer(k) = row[0] else {
                return Err(TestCaseError::fail("merged key is not an integer"));
            };
            prop_assert!(left_counts.contains_key(&k) && right_counts.contains_key(&k));
        }

        let expected: usize = left_counts
            .iter()
            .map(|(k, n)| n * right_counts.get(k).copied().unwrap_or(0))
            .sum();
        prop_assert_eq!(merged.row_count(), expected);
    }
}

// =============================================================================
// Truncation
// =============================================================================

proptest! {
    #[test]
    fn prop_truncation_is_bounded_prefix(text in "\\PC{0,200}", capacity in 1usize..120) {
        let truncated = truncate_chars(&text, capacity);
        prop_assert!(truncated.chars().count() <= capacity);
        prop_assert!(text.starts_with(truncated.as_str()));
        if text.chars().count() <= capacity {
            prop_assert_eq!(truncated, text);
        }
    }
}
