// Grouped counts and proportions shared by every view.
//
// A view hands over its rows plus two key extractors. An extractor returning
// `None` excludes the row: that is how unmapped codes and per-view editorial
// filters are applied, and every exclusion is counted.
use std::collections::BTreeMap;
use tracing::debug;

/// Row counts per `(category, value)` cell, ordered by category then value.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<K: Ord, V: Ord> {
    pub cells: BTreeMap<(K, V), usize>,
    pub excluded: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell<K, V> {
    pub category: K,
    pub value: V,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proportion<K, V> {
    pub category: K,
    pub value: V,
    pub count: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rescaled<K, V> {
    pub category: K,
    pub value: V,
    pub count: usize,
    pub population_share: f64,
    pub rescaled: f64,
}

/// Group `rows` by `(category(row), value(row))` and count.
pub fn grouped_counts<T, K, V, FK, FV>(
    rows: impl IntoIterator<Item = T>,
    category: FK,
    value: FV,
) -> Tally<K, V>
where
    K: Ord,
    V: Ord,
    FK: Fn(&T) -> Option<K>,
    FV: Fn(&T) -> Option<V>,
{
    let mut cells = BTreeMap::new();
    let mut excluded = 0usize;
    for row in rows {
        match (category(&row), value(&row)) {
            (Some(k), Some(v)) => *cells.entry((k, v)).or_insert(0) += 1,
            _ => excluded += 1,
        }
    }
    if excluded > 0 {
        debug!(excluded, "rows excluded before grouping");
    }
    Tally { cells, excluded }
}

impl<K: Ord + Clone, V: Ord + Clone> Tally<K, V> {
    /// Raw distribution, for absolute or log-scale histograms.
    pub fn counts(&self) -> Vec<Cell<K, V>> {
        self.cells
            .iter()
            .map(|((k, v), c)| Cell {
                category: k.clone(),
                value: v.clone(),
                count: *c,
            })
            .collect()
    }

    /// Total row count of every category.
    pub fn category_totals(&self) -> BTreeMap<K, usize> {
        let mut totals = BTreeMap::new();
        for ((k, _), c) in &self.cells {
            *totals.entry(k.clone()).or_insert(0) += c;
        }
        totals
    }

    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    /// Normalized distribution: each count divided by its category total, so
    /// the values of one category sum to 1.
    pub fn proportions(&self) -> Vec<Proportion<K, V>> {
        let totals = self.category_totals();
        self.cells
            .iter()
            .map(|((k, v), c)| {
                let total = totals.get(k).copied().unwrap_or(0);
                Proportion {
                    category: k.clone(),
                    value: v.clone(),
                    count: *c,
                    proportion: if total == 0 { 0.0 } else { *c as f64 / total as f64 },
                }
            })
            .collect()
    }

    /// Counts rescaled by each category's population share, relative to an
    /// even split: `count / (share * n_categories)`. Shares come from the
    /// tallied rows themselves. Under-represented categories are scaled up,
    /// over-represented ones down. The ratio between two categories is the
    /// same as with a plain `count / share`; only the common factor differs.
    pub fn rescale_by_share(&self) -> Vec<Rescaled<K, V>> {
        let totals = self.category_totals();
        let population = self.total();
        let n = totals.len();
        self.cells
            .iter()
            .map(|((k, v), c)| {
                let share = if population == 0 {
                    0.0
                } else {
                    totals.get(k).copied().unwrap_or(0) as f64 / population as f64
                };
                let rescaled = if share > 0.0 {
                    *c as f64 / (share * n as f64)
                } else {
                    0.0
                };
                Rescaled {
                    category: k.clone(),
                    value: v.clone(),
                    count: *c,
                    population_share: share,
                    rescaled,
                }
            })
            .collect()
    }
}

/// Single-key counts, for pie charts.
#[derive(Debug, Clone, PartialEq)]
pub struct Counts<K: Ord> {
    pub cells: BTreeMap<K, usize>,
    pub excluded: usize,
}

pub fn count_by<T, K, F>(rows: impl IntoIterator<Item = T>, key: F) -> Counts<K>
where
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut cells = BTreeMap::new();
    let mut excluded = 0usize;
    for row in rows {
        match key(&row) {
            Some(k) => *cells.entry(k).or_insert(0) += 1,
            None => excluded += 1,
        }
    }
    Counts { cells, excluded }
}

impl<K: Ord + Clone> Counts<K> {
    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    /// `(key, count, percent of total)`, largest first like a pie legend.
    pub fn shares(&self) -> Vec<(K, usize, f64)> {
        let total = self.total();
        let mut out: Vec<(K, usize, f64)> = self
            .cells
            .iter()
            .map(|(k, c)| {
                let pct = if total == 0 {
                    0.0
                } else {
                    *c as f64 * 100.0 / total as f64
                };
                (k.clone(), *c, pct)
            })
            .collect();
        // Stable sort keeps key order among equal counts.
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}
