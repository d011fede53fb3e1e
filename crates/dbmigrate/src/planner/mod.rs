//! Dependency planning: order tables so every table follows the tables it
//! references.
//!
//! The order is computed with Kahn's algorithm over the foreign-key graph.
//! When several tables are ready at once, the one listed earliest by the
//! caller goes first, so a graph with no edges keeps the input order.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::ForeignKey;
use crate::error::{MigrateError, Result};

/// Where a plan's order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Derived from the foreign-key graph.
    Computed,
    /// Supplied by configuration and taken as-is.
    Explicit,
}

/// Ordered list of tables to migrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Tables in load order.
    pub tables: Vec<String>,

    /// Origin of the order.
    pub source: PlanSource,
}

impl MigrationPlan {
    /// Wrap a configured order without checking it against the foreign keys.
    ///
    /// A wrong order surfaces later as a load failure on the destination.
    pub fn explicit(order: Vec<String>) -> Self {
        warn!(
            "Using explicit table order ({} tables); foreign-key order is not checked",
            order.len()
        );
        Self {
            tables: order,
            source: PlanSource::Explicit,
        }
    }

    /// Order in which destination tables are emptied: children before parents.
    pub fn clear_order(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().rev().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Compute a load order for `table_names` honoring `foreign_keys`.
///
/// Self-references and keys pointing outside `table_names` impose no order.
/// Fails with [`MigrateError::CyclicDependency`] listing the tables that could
/// not be ordered.
pub fn plan(table_names: &[String], foreign_keys: &[ForeignKey]) -> Result<MigrationPlan> {
    // Position of each table in the caller's order; duplicates keep the first.
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(table_names.len());
    let mut names: Vec<&str> = Vec::with_capacity(table_names.len());
    for name in table_names {
        if !index.contains_key(name.as_str()) {
            index.insert(name.as_str(), names.len());
            names.push(name.as_str());
        }
    }

    // Edge parent -> child: parent must be loaded before child.
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for fk in foreign_keys {
        if fk.is_self_reference() {
            continue;
        }
        if let (Some(&child), Some(&parent)) = (
            index.get(fk.from_table.as_str()),
            index.get(fk.to_table.as_str()),
        ) {
            edges.insert((parent, child));
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    let mut in_degree = vec![0usize; names.len()];
    for &(parent, child) in &edges {
        dependents[parent].push(child);
        in_degree[child] += 1;
    }

    // Ready set keyed by caller position for a deterministic tie-break.
    let mut ready: BTreeSet<usize> = (0..names.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<String> = Vec::with_capacity(names.len());

    while let Some(current) = ready.pop_first() {
        order.push(names[current].to_string());
        for &child in &dependents[current] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < names.len() {
        let remaining: Vec<String> = (0..names.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| names[i].to_string())
            .collect();
        return Err(MigrateError::CyclicDependency { tables: remaining });
    }

    debug!("Computed load order: {}", order.join(", "));
    Ok(MigrationPlan {
        tables: order,
        source: PlanSource::Computed,
    })
}
