// Inner joins on the accident id (`Num_Acc`).
//
// Characteristics and Locations hold one row per accident, Users and
// Vehicles many, so a join is a one-to-many (or many-to-many) expansion.
// Rows without a partner are dropped, but never silently: every join counts
// them and logs a warning.
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Anything that carries an accident id.
pub trait Keyed {
    fn accident_id(&self) -> &str;
}

impl<T: Keyed + ?Sized> Keyed for &T {
    fn accident_id(&self) -> &str {
        (**self).accident_id()
    }
}

// A joined pair keeps the key of its left side, so joins chain.
impl<'a, 'b, L: Keyed, R> Keyed for (&'a L, &'b R) {
    fn accident_id(&self) -> &str {
        self.0.accident_id()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub left_rows: usize,
    pub right_rows: usize,
    pub joined_rows: usize,
    pub unmatched_left: usize,
    pub unmatched_right: usize,
}

impl JoinStats {
    /// Fraction of input rows (both sides) that found no partner.
    pub fn drop_rate(&self) -> f64 {
        let total = self.left_rows + self.right_rows;
        if total == 0 {
            return 0.0;
        }
        (self.unmatched_left + self.unmatched_right) as f64 / total as f64
    }
}

#[derive(Debug)]
pub struct Joined<'a, L, R> {
    pub rows: Vec<(&'a L, &'a R)>,
    pub stats: JoinStats,
}

/// Pair every left row with every right row sharing its accident id.
/// Output follows left order, then right order within one id.
pub fn inner_join<'a, L, R>(left: &'a [L], right: &'a [R], label: &str) -> Joined<'a, L, R>
where
    L: Keyed,
    R: Keyed,
{
    let mut index: HashMap<&str, Vec<&R>> = HashMap::new();
    for r in right {
        index.entry(r.accident_id()).or_default().push(r);
    }

    let mut rows = Vec::new();
    let mut unmatched_left = 0usize;
    let mut seen: HashSet<&str> = HashSet::new();
    for l in left {
        let id = l.accident_id();
        match index.get(id) {
            Some(partners) => {
                seen.insert(id);
                rows.extend(partners.iter().map(|r| (l, *r)));
            }
            None => unmatched_left += 1,
        }
    }
    let unmatched_right = right
        .iter()
        .filter(|r| !seen.contains(r.accident_id()))
        .count();

    let stats = JoinStats {
        left_rows: left.len(),
        right_rows: right.len(),
        joined_rows: rows.len(),
        unmatched_left,
        unmatched_right,
    };
    if unmatched_left > 0 || unmatched_right > 0 {
        warn!(
            join = label,
            unmatched_left,
            unmatched_right,
            drop_rate = stats.drop_rate(),
            "rows dropped by join on Num_Acc"
        );
    }
    Joined { rows, stats }
}

/// Number of distinct accident ids among `rows`.
pub fn unique_accidents<'a, T, I>(rows: I) -> usize
where
    T: Keyed + 'a,
    I: IntoIterator<Item = &'a T>,
{
    rows.into_iter()
        .map(|r| r.accident_id())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row(&'static str, u32);

    impl Keyed for Row {
        fn accident_id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn one_to_many_expansion() {
        let accidents = vec![Row("a", 0), Row("b", 0)];
        let users = vec![Row("a", 1), Row("a", 2), Row("a", 3), Row("b", 1)];
        let joined = inner_join(&accidents, &users, "test");
        assert_eq!(joined.rows.len(), 4);
        assert_eq!(joined.rows[0].1, &Row("a", 1));
        assert_eq!(joined.rows[3].1, &Row("b", 1));
        assert_eq!(joined.stats.unmatched_left, 0);
        assert_eq!(joined.stats.unmatched_right, 0);
    }

    #[test]
    fn unmatched_rows_are_counted() {
        let accidents = vec![Row("a", 0), Row("orphan", 0)];
        let users = vec![Row("a", 1), Row("ghost", 1), Row("ghost", 2)];
        let joined = inner_join(&accidents, &users, "test");
        assert_eq!(joined.rows.len(), 1);
        assert_eq!(joined.stats.unmatched_left, 1);
        assert_eq!(joined.stats.unmatched_right, 2);
        assert!((joined.stats.drop_rate() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn many_to_many_within_one_accident() {
        let users = vec![Row("a", 1), Row("a", 2)];
        let vehicles = vec![Row("a", 10), Row("a", 11), Row("a", 12)];
        let joined = inner_join(&users, &vehicles, "test");
        assert_eq!(joined.rows.len(), 6);
    }

    #[test]
    fn joins_chain_and_dedupe_by_id() {
        let accidents = vec![Row("a", 0)];
        let users = vec![Row("a", 1), Row("a", 2), Row("a", 3)];
        let locations = vec![Row("a", 9)];
        let first = inner_join(&accidents, &users, "first");
        let second = inner_join(&first.rows, &locations, "second");
        assert_eq!(second.rows.len(), 3);
        assert_eq!(unique_accidents(&second.rows), 1);
    }
}
