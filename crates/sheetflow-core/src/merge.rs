//! Chained inner joins over extracted tables
//!
//! The chain is left-deep: the accumulator starts as the root table and each
//! step joins it with one more table on a shared key. Rows without a partner
//! on either side are dropped, so the result favours completeness of each row
//! over coverage of the inputs. The number of dropped rows is logged per step.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::table::{Column, Row, Table, Value};

pub const DEFAULT_MERGE_DESTINATION: &str = "final_merged_table";

/// One join of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStep {
    /// Table already in the accumulator that carries `on_key`, or a label
    /// naming the accumulator itself
    pub from_table: String,
    /// Extracted table joined into the accumulator
    pub to_table: String,
    pub on_key: String,
}

impl MergeStep {
    pub fn new(
        from_table: impl Into<String>,
        to_table: impl Into<String>,
        on_key: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            to_table: to_table.into(),
            on_key: on_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    /// Starting table; defaults to the first step's `from_table`
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub steps: Vec<MergeStep>,
    #[serde(default = "default_destination")]
    pub destination: String,
}

fn default_destination() -> String {
    DEFAULT_MERGE_DESTINATION.to_string()
}

impl MergeSpec {
    pub fn new(steps: Vec<MergeStep>) -> Self {
        Self {
            root: None,
            steps,
            destination: default_destination(),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn root_table(&self) -> Option<&str> {
        self.root
            .as_deref()
            .or_else(|| self.steps.first().map(|s| s.from_table.as_str()))
    }

    /// Every extracted table the chain reads, root first, without repeats
    pub fn dependencies(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.root_table()
            .into_iter()
            .chain(self.steps.iter().map(|s| s.to_table.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

/// Where each output column of one join comes from
#[derive(Debug, Clone)]
struct JoinLayout {
    left_key: usize,
    right_key: usize,
    /// Indices of the right columns appended after the left ones
    right_kept: Vec<usize>,
    columns: Vec<Column>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Check dependencies and join keys without touching any row
    pub fn validate(&self, tables: &HashMap<String, Table>, spec: &MergeSpec) -> Result<()> {
        let root = spec.root_table().ok_or_else(|| {
            PipelineError::InvalidMergeSpec("a merge needs a root table or at least one step".to_string())
        })?;

        for dependency in spec.dependencies() {
            if !tables.contains_key(dependency) {
                return Err(PipelineError::upstream_missing(dependency));
            }
        }

        let mut joined: HashSet<&str> = HashSet::from([root]);
        let mut columns = tables[root].columns().to_vec();
        for step in &spec.steps {
            // Names that are not extracted tables label the running accumulator
            let extracted = tables.contains_key(step.from_table.as_str());
            if extracted && !joined.contains(step.from_table.as_str()) {
                return Err(PipelineError::InvalidMergeSpec(format!(
                    "step joining '{}' starts from '{}', which is not part of the merge yet",
                    step.to_table, step.from_table
                )));
            }
            let right = &tables[step.to_table.as_str()];
            columns = layout(&columns, &step.from_table, right.columns(), &step.to_table, &step.on_key)?.columns;
            joined.insert(step.to_table.as_str());
        }

        Ok(())
    }

    #[instrument(skip(self, tables, spec), fields(steps = spec.steps.len()))]
    pub fn merge(
        &self,
        tables: &HashMap<String, Table>,
        spec: &MergeSpec,
        result_name: &str,
    ) -> Result<Table> {
        self.validate(tables, spec)?;

        let root = spec.root_table().unwrap_or_default();
        let root_table = &tables[root];
        let mut columns = root_table.columns().to_vec();
        let mut rows = root_table.rows().to_vec();

        for step in &spec.steps {
            let right = &tables[step.to_table.as_str()];
            let plan = layout(&columns, &step.from_table, right.columns(), &step.to_table, &step.on_key)?;
            let outcome = hash_join(&rows, right.rows(), &plan);

            let dropped_left = rows.len() - outcome.left_matched;
            let dropped_right = right.row_count() - outcome.right_matched;
            if dropped_left > 0 || dropped_right > 0 {
                warn!(
                    table = %step.to_table,
                    key = %step.on_key,
                    dropped_left,
                    dropped_right,
                    "Inner join dropped rows without a partner"
                );
            }
            debug!(table = %step.to_table, key = %step.on_key, rows = outcome.rows.len(), "Join step complete");

            columns = plan.columns;
            rows = outcome.rows;
        }

        let merged = Table::new(result_name, columns, rows)?;
        info!(table = %result_name, rows = merged.row_count(), columns = merged.columns().len(), "Merge complete");
        Ok(merged)
    }
}

/// Output columns of joining `left` with `right` on `key`: left columns first,
/// the key once, then right non-key columns. Clashing names get `_x` on the
/// left and `_y` on the right.
fn layout(
    left: &[Column],
    left_name: &str,
    right: &[Column],
    right_name: &str,
    key: &str,
) -> Result<JoinLayout> {
    let left_key = left
        .iter()
        .position(|c| c.name == key)
        .ok_or_else(|| PipelineError::missing_join_key(left_name, key))?;
    let right_key = right
        .iter()
        .position(|c| c.name == key)
        .ok_or_else(|| PipelineError::missing_join_key(right_name, key))?;

    let right_kept: Vec<usize> = (0..right.len()).filter(|&i| i != right_key).collect();
    let right_names: HashSet<&str> = right_kept.iter().map(|&i| right[i].name.as_str()).collect();
    let left_names: HashSet<&str> = left.iter().map(|c| c.name.as_str()).collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(left.len() + right_kept.len());

    for (index, column) in left.iter().enumerate() {
        let mut column = column.clone();
        if index != left_key && right_names.contains(column.name.as_str()) {
            column.name = unique_name(&format!("{}_x", column.name), &taken, &left_names);
        }
        taken.insert(column.name.clone());
        columns.push(column);
    }

    for &index in &right_kept {
        let mut column = right[index].clone();
        if left_names.contains(column.name.as_str()) || taken.contains(&column.name) {
            column.name = unique_name(&format!("{}_y", column.name), &taken, &left_names);
        }
        taken.insert(column.name.clone());
        columns.push(column);
    }

    Ok(JoinLayout {
        left_key,
        right_key,
        right_kept,
        columns,
    })
}

fn unique_name(base: &str, taken: &HashSet<String>, reserved: &HashSet<&str>) -> String {
    let free = |name: &str| !taken.contains(name) && !reserved.contains(name);
    if free(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| free(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Hashable join key; integral floats collapse onto integers, nulls never match
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Integer(i64),
    Float(u64),
    Text(String),
    DateTime(chrono::NaiveDateTime),
}

fn join_key(value: &Value) -> Option<JoinKey> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(JoinKey::Integer(*i)),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some(JoinKey::Integer(*f as i64))
        },
        Value::Float(f) => Some(JoinKey::Float(f.to_bits())),
        Value::Text(s) => Some(JoinKey::Text(s.clone())),
        Value::DateTime(dt) => Some(JoinKey::DateTime(*dt)),
    }
}

fn index_right(right: &[Row], key: usize) -> HashMap<JoinKey, Vec<usize>> {
    let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (position, row) in right.iter().enumerate() {
        if let Some(k) = join_key(&row[key]) {
            index.entry(k).or_default().push(position);
        }
    }
    index
}

struct JoinOutcome {
    rows: Vec<Row>,
    left_matched: usize,
    right_matched: usize,
}

/// Inner join preserving left row order, then right row order within a key
fn hash_join(left: &[Row], right: &[Row], plan: &JoinLayout) -> JoinOutcome {
    let index = index_right(right, plan.right_key);
    let mut matched_right = vec![false; right.len()];
    let mut left_matched = 0;
    let mut output = Vec::new();

    for left_row in left {
        let Some(key) = join_key(&left_row[plan.left_key]) else {
            continue;
        };
        let Some(partners) = index.get(&key) else {
            continue;
        };
        left_matched += 1;
        for &position in partners {
            matched_right[position] = true;
            let mut row = Vec::with_capacity(plan.columns.len());
            row.extend(left_row.iter().cloned());
            row.extend(plan.right_kept.iter().map(|&i| right[position][i].clone()));
            output.push(row);
        }
    }

    JoinOutcome {
        rows: output,
        left_matched,
        right_matched: matched_right.iter().filter(|m| **m).count(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::SemanticType;

    fn typed(name: &str, headers: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let columns = headers
            .iter()
            .map(|h| Column::new(*h, SemanticType::unbounded_text()))
            .collect();
        Table::new(name, columns, rows).unwrap()
    }

    fn tables(list: Vec<Table>) -> HashMap<String, Table> {
        list.into_iter().map(|t| (t.name().to_string(), t)).collect()
    }

    fn categories() -> Table {
        typed(
            "categories",
            &["categoryId", "name"],
            vec![vec![Value::Integer(1), Value::from("Drinks")]],
        )
    }

    fn products() -> Table {
        typed(
            "products",
            &["productId", "name", "categoryId"],
            vec![
                vec![Value::Integer(10), Value::from("Cola"), Value::Integer(1)],
                vec![Value::Integer(11), Value::from("Widget"), Value::Integer(2)],
            ],
        )
    }

    #[test]
    fn test_orphans_are_dropped() {
        let spec = MergeSpec::new(vec![MergeStep::new("categories", "products", "categoryId")]);
        let merged = MergeEngine::new()
            .merge(&tables(vec![categories(), products()]), &spec, "merged")
            .unwrap();

        assert_eq!(merged.row_count(), 1);
        let names: Vec<&str> = merged.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["categoryId", "name_x", "productId", "name_y"]);
        assert_eq!(merged.rows()[0][3], Value::from("Cola"));
    }

    #[test]
    fn test_missing_key_fails_before_joining() {
        let spec = MergeSpec::new(vec![MergeStep::new("categories", "products", "supplierId")]);
        let err = MergeEngine::new()
            .merge(&tables(vec![categories(), products()]), &spec, "merged")
            .unwrap_err();
        match err {
            PipelineError::MissingJoinKey { table, key } => {
                assert_eq!(table, "categories");
                assert_eq!(key, "supplierId");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_upstream_missing() {
        let spec = MergeSpec::new(vec![MergeStep::new("categories", "products", "categoryId")]);
        let err = MergeEngine::new()
            .merge(&tables(vec![categories()]), &spec, "merged")
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamMissing { table } if table == "products"));
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = typed("l", &["k"], vec![vec![Value::Null], vec![Value::Integer(1)]]);
        let right = typed("r", &["k", "v"], vec![vec![Value::Null, Value::from("a")], vec![Value::Float(1.0), Value::from("b")]]);
        let spec = MergeSpec::new(vec![MergeStep::new("l", "r", "k")]);
        let merged = MergeEngine::new().merge(&tables(vec![left, right]), &spec, "m").unwrap();
        assert_eq!(merged.row_count(), 1);
        assert_eq!(merged.rows()[0][1], Value::from("b"));
    }

    #[test]
    fn test_chain_uses_columns_from_earlier_steps() {
        let suppliers = typed(
            "suppliers",
            &["supplierId", "company"],
            vec![vec![Value::Integer(7), Value::from("Exotic Liquids")]],
        );
        let products = typed(
            "products",
            &["productId", "categoryId", "supplierId"],
            vec![vec![Value::Integer(10), Value::Integer(1), Value::Integer(7)]],
        );
        let spec = MergeSpec::new(vec![
            MergeStep::new("categories", "products", "categoryId"),
            MergeStep::new("products", "suppliers", "supplierId"),
        ]);
        let merged = MergeEngine::new()
            .merge(&tables(vec![categories(), products, suppliers]), &spec, "final")
            .unwrap();

        assert_eq!(merged.name(), "final");
        assert_eq!(merged.row_count(), 1);
        assert!(merged.has_column("company"));
    }

    #[test]
    fn test_step_from_unjoined_table_rejected() {
        let suppliers = typed("suppliers", &["supplierId", "productId"], vec![]);
        let spec = MergeSpec::new(vec![
            MergeStep::new("categories", "products", "categoryId"),
            MergeStep::new("suppliers", "products", "productId"),
        ]);
        let err = MergeEngine::new()
            .validate(&tables(vec![categories(), products(), suppliers]), &spec)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMergeSpec(_)));
    }

    #[test]
    fn test_accumulator_labels_join_the_running_result() {
        let int = |v: i64| Value::Integer(v);
        let text = |v: &str| Value::from(v);
        let list = vec![
            typed("categories", &["categoryID", "categoryName"], vec![vec![int(1), text("Beverages")]]),
            typed(
                "products",
                &["productID", "categoryID", "supplierID"],
                vec![vec![int(10), int(1), int(7)]],
            ),
            typed("suppliers", &["supplierID", "companyName"], vec![vec![int(7), text("Exotic Liquids")]]),
            typed("order_details", &["orderID", "productID"], vec![vec![int(100), int(10)]]),
            typed(
                "orders",
                &["orderID", "customerID", "employeeID"],
                vec![vec![int(100), text("ALFKI"), int(5)]],
            ),
            typed("customers", &["customerID", "contactName"], vec![vec![text("ALFKI"), text("Maria")]]),
            typed("employees", &["employeeID", "lastName"], vec![vec![int(5), text("Buchanan")]]),
            typed("employee_territories", &["employeeID", "territoryID"], vec![vec![int(5), int(2116)]]),
            typed("territories", &["territoryID", "regionID"], vec![vec![int(2116), int(1)]]),
            typed("regions", &["regionID", "regionDescription"], vec![vec![int(1), text("Eastern")]]),
        ];
        let spec = MergeSpec::new(vec![
            MergeStep::new("categories", "products", "categoryID"),
            MergeStep::new("cate_prd", "suppliers", "supplierID"),
            MergeStep::new("cate_prd_supp", "order_details", "productID"),
            MergeStep::new("cate_prd_supp_order_details", "orders", "orderID"),
            MergeStep::new("cate_prd_supp_order_details_ord", "customers", "customerID"),
            MergeStep::new("cate_prd_supp_order_details_ord_cus", "employees", "employeeID"),
            MergeStep::new("cate_prd_supp_order_details_ord_cus_empl", "employee_territories", "employeeID"),
            MergeStep::new("cate_prd_supp_order_details_ord_cus_empl_emplt", "territories", "territoryID"),
            MergeStep::new("cate_prd_supp_order_details_ord_cus_empl_emplt_teri", "regions", "regionID"),
        ]);

        let merged = MergeEngine::new()
            .merge(&tables(list), &spec, DEFAULT_MERGE_DESTINATION)
            .unwrap();

        assert_eq!(merged.row_count(), 1);
        assert_eq!(merged.columns().len(), 13);
        assert!(merged.has_column("companyName"));
        assert!(merged.has_column("regionDescription"));
    }

    #[test]
    fn test_root_only_merge_returns_root() {
        let spec = MergeSpec::new(vec![]).with_root("categories");
        let merged = MergeEngine::new()
            .merge(&tables(vec![categories()]), &spec, "copy")
            .unwrap();
        assert_eq!(merged.rows(), categories().rows());
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let spec = MergeSpec::new(vec![
            MergeStep::new("a", "b", "k"),
            MergeStep::new("b", "a", "k"),
        ]);
        assert_eq!(spec.dependencies(), vec!["a", "b"]);
    }
}
