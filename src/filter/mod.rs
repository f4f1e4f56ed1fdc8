//! Filter algebra
//!
//! A query's filter is a tree of AND/OR nodes over leaf predicates.
//! Negation applies De Morgan down to the leaves at once, so the runtime
//! tree never contains a NOT node. The tree also answers the three
//! optimiser questions the scan planner asks before iterating.

mod leaf;

pub use leaf::{LeafFilter, RelOp};

use crate::column::RowCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Leaf(LeafFilter),
}

impl Filter {
    /// An AND node with no children, the neutral root of every query.
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }

    pub fn accepts(&self, ctx: &RowCtx<'_>) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|f| f.accepts(ctx)),
            Filter::Or(children) => children.iter().any(|f| f.accepts(ctx)),
            Filter::Leaf(leaf) => leaf.accepts(ctx),
        }
    }

    /// De Morgan negation: swaps AND/OR and flips each leaf's operator.
    pub fn negate(&self) -> Filter {
        match self {
            Filter::And(children) => Filter::Or(children.iter().map(Filter::negate).collect()),
            Filter::Or(children) => Filter::And(children.iter().map(Filter::negate).collect()),
            Filter::Leaf(leaf) => Filter::Leaf(leaf.negated()),
        }
    }

    /// The unique value `column` must have for the filter to pass, if the
    /// tree pins it to one.
    pub fn string_value_restriction_for(&self, column: &str) -> Option<&str> {
        match self {
            // The first restricting child wins, the others only tighten.
            Filter::And(children) => children
                .iter()
                .find_map(|f| f.string_value_restriction_for(column)),
            // All branches must agree, otherwise nothing is pinned.
            Filter::Or(children) => {
                let mut restriction = None;
                for child in children {
                    match child.string_value_restriction_for(column) {
                        None => return None,
                        Some(value) => match restriction {
                            None => restriction = Some(value),
                            Some(seen) if seen != value => return None,
                            Some(_) => {}
                        },
                    }
                }
                restriction
            }
            Filter::Leaf(leaf) => {
                if leaf.column_name() == column {
                    leaf.string_restriction()
                } else {
                    None
                }
            }
        }
    }

    /// Narrow the half-open interval `[lower, upper)` of values `column`
    /// can take on accepted rows. AND intersects in place; OR runs each
    /// branch on a fresh copy and merges the results.
    pub fn find_int_limits(&self, column: &str, lower: &mut i64, upper: &mut i64, tz_offset: i64) {
        match self {
            Filter::And(children) => {
                for child in children {
                    child.find_int_limits(column, lower, upper, tz_offset);
                }
            }
            Filter::Or(children) => {
                if children.is_empty() {
                    *upper = *lower;
                    return;
                }
                let mut merged: Option<(i64, i64)> = None;
                for child in children {
                    let (mut lo, mut hi) = (*lower, *upper);
                    child.find_int_limits(column, &mut lo, &mut hi, tz_offset);
                    merged = Some(match merged {
                        None => (lo, hi),
                        Some((mlo, mhi)) => (mlo.min(lo), mhi.max(hi)),
                    });
                }
                if let Some((lo, hi)) = merged {
                    *lower = lo;
                    *upper = hi;
                }
            }
            Filter::Leaf(leaf) => {
                if leaf.column_name() == column {
                    leaf.find_int_limits(lower, upper, tz_offset);
                }
            }
        }
    }

    /// AND the set of feasible values of `column` (as bits 0..32) into
    /// `mask`. Returns false when the tree cannot take part, in which case
    /// `mask` keeps its caller-visible value for AND nodes and the whole
    /// optimisation is abandoned for OR nodes.
    pub fn optimize_bitmask(&self, column: &str, mask: &mut u32, tz_offset: i64) -> bool {
        match self {
            Filter::And(children) => {
                let mut optimized = false;
                for child in children {
                    if child.optimize_bitmask(column, mask, tz_offset) {
                        optimized = true;
                    }
                }
                optimized
            }
            Filter::Or(children) => {
                // Only sound if every branch constrains the same column.
                let mut union = 0u32;
                for child in children {
                    let mut branch = u32::MAX;
                    if !child.optimize_bitmask(column, &mut branch, tz_offset) {
                        return false;
                    }
                    union |= branch;
                }
                *mask &= union;
                true
            }
            Filter::Leaf(leaf) => {
                if leaf.column_name() == column {
                    leaf.optimize_bitmask(mask, tz_offset)
                } else {
                    false
                }
            }
        }
    }
}

/// Wrap the `count` most recent filters of `stack` into a composite, the
/// way `And:`/`Or:` headers compose. `count == 0` is a no-op.
pub fn combine_tail(stack: &mut Vec<Filter>, op: LogicOp, count: usize) -> Result<(), String> {
    if count == 0 {
        return Ok(());
    }
    if stack.len() < count {
        return Err(format!(
            "cannot combine {} filters, only {} on stack",
            count,
            stack.len()
        ));
    }
    let tail = stack.split_off(stack.len() - count);
    stack.push(match op {
        LogicOp::And => Filter::And(tail),
        LogicOp::Or => Filter::Or(tail),
    });
    Ok(())
}

/// Replace the most recent filter with its negation, the `Negate:` header.
pub fn negate_top(stack: &mut Vec<Filter>) -> Result<(), String> {
    let top = stack
        .pop()
        .ok_or_else(|| "cannot negate, no filter on stack".to_string())?;
    stack.push(top.negate());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, Row, RowCtx};
    use crate::world::{DaemonView, Host, StaticWorld};
    use std::borrow::Cow;
    use std::sync::Arc;

    fn state_col() -> Arc<Column> {
        Column::int("state", "Current state", |ctx| {
            ctx.row.as_host().map(|h| h.state).unwrap_or(0)
        })
    }

    fn name_col() -> Arc<Column> {
        Column::string("name", "Host name", |ctx| {
            ctx.row
                .as_host()
                .map(|h| Cow::Borrowed(h.name.as_str()))
                .unwrap_or_default()
        })
    }

    fn groups_col() -> Arc<Column> {
        Column::list("groups", "Group membership", |ctx| {
            ctx.row
                .as_host()
                .map(|h| h.groups.iter().map(|g| Cow::Borrowed(g.as_str())).collect())
                .unwrap_or_default()
        })
    }

    fn leaf(col: Arc<Column>, op: RelOp, value: &str) -> Filter {
        Filter::Leaf(LeafFilter::new(col, op, value).unwrap())
    }

    fn world() -> StaticWorld {
        let mut world = StaticWorld::default();
        for (name, state, groups) in [
            ("h1", 0, vec!["linux"]),
            ("h2", 1, vec![]),
            ("h3", 2, vec!["linux", "web"]),
        ] {
            world.hosts.push(Host {
                name: name.into(),
                state,
                groups: groups.into_iter().map(String::from).collect(),
                ..Host::default()
            });
        }
        world.finish().unwrap()
    }

    fn accepted_hosts(filter: &Filter, world: &StaticWorld) -> Vec<String> {
        world
            .hosts()
            .iter()
            .filter(|h| {
                filter.accepts(&RowCtx {
                    world,
                    row: Row::Host(h),
                    auth_user: None,
                    timezone_offset: 0,
                    now: 0,
                })
            })
            .map(|h| h.name.clone())
            .collect()
    }

    #[test]
    fn test_empty_and_accepts_all_empty_or_rejects_all() {
        let world = world();
        assert_eq!(accepted_hosts(&Filter::all(), &world).len(), 3);
        assert_eq!(accepted_hosts(&Filter::Or(Vec::new()), &world).len(), 0);
    }

    #[test]
    fn test_de_morgan_negation() {
        let world = world();
        let filter = Filter::Or(vec![
            leaf(state_col(), RelOp::Equal, "0"),
            Filter::And(vec![
                leaf(state_col(), RelOp::Greater, "1"),
                leaf(name_col(), RelOp::Matches, "^h"),
            ]),
        ]);
        let negated = filter.negate();
        for h in world.hosts() {
            let ctx = RowCtx {
                world: &world,
                row: Row::Host(h),
                auth_user: None,
                timezone_offset: 0,
                now: 0,
            };
            assert_ne!(filter.accepts(&ctx), negated.accepts(&ctx), "host {}", h.name);
            assert_eq!(
                filter.accepts(&ctx),
                negated.negate().accepts(&ctx),
                "double negation on {}",
                h.name
            );
        }
    }

    #[test]
    fn test_copy_accepts_same_rows() {
        let world = world();
        let filter = Filter::And(vec![
            leaf(state_col(), RelOp::GreaterOrEqual, "1"),
            leaf(name_col(), RelOp::NotEqual, "h2"),
        ]);
        let copy = filter.clone();
        assert_eq!(accepted_hosts(&filter, &world), accepted_hosts(&copy, &world));
    }

    #[test]
    fn test_string_restriction_and_takes_first() {
        let filter = Filter::And(vec![
            leaf(state_col(), RelOp::Equal, "0"),
            leaf(name_col(), RelOp::Equal, "h1"),
        ]);
        assert_eq!(filter.string_value_restriction_for("name"), Some("h1"));
        assert_eq!(filter.string_value_restriction_for("alias"), None);
    }

    #[test]
    fn test_string_restriction_or_needs_agreement() {
        let agreeing = Filter::Or(vec![
            leaf(name_col(), RelOp::Equal, "h1"),
            Filter::And(vec![
                leaf(name_col(), RelOp::Equal, "h1"),
                leaf(state_col(), RelOp::Equal, "2"),
            ]),
        ]);
        assert_eq!(agreeing.string_value_restriction_for("name"), Some("h1"));

        let disagreeing = Filter::Or(vec![
            leaf(name_col(), RelOp::Equal, "h1"),
            leaf(name_col(), RelOp::Equal, "h2"),
        ]);
        assert_eq!(disagreeing.string_value_restriction_for("name"), None);
    }

    #[test]
    fn test_list_membership_pins_restriction() {
        let filter = leaf(groups_col(), RelOp::GreaterOrEqual, "linux");
        assert_eq!(filter.string_value_restriction_for("groups"), Some("linux"));
        let world = world();
        assert_eq!(accepted_hosts(&filter, &world), vec!["h1", "h3"]);
    }

    #[test]
    fn test_find_int_limits_and_intersects() {
        let filter = Filter::And(vec![
            leaf(state_col(), RelOp::GreaterOrEqual, "10"),
            leaf(state_col(), RelOp::Less, "20"),
        ]);
        let (mut lo, mut hi) = (0i64, 100i64);
        filter.find_int_limits("state", &mut lo, &mut hi, 0);
        assert_eq!((lo, hi), (10, 20));
    }

    #[test]
    fn test_find_int_limits_or_unions() {
        let filter = Filter::Or(vec![
            leaf(state_col(), RelOp::Equal, "5"),
            leaf(state_col(), RelOp::Equal, "15"),
        ]);
        let (mut lo, mut hi) = (0i64, 100i64);
        filter.find_int_limits("state", &mut lo, &mut hi, 0);
        assert_eq!((lo, hi), (5, 16));
    }

    #[test]
    fn test_optimize_bitmask_or_union() {
        let filter = Filter::Or(vec![
            leaf(state_col(), RelOp::Equal, "0"),
            leaf(state_col(), RelOp::Equal, "2"),
        ]);
        let mut mask = u32::MAX;
        assert!(filter.optimize_bitmask("state", &mut mask, 0));
        assert_eq!(mask, 0b101);
    }

    #[test]
    fn test_optimize_bitmask_or_mixed_columns_aborts() {
        let filter = Filter::Or(vec![
            leaf(state_col(), RelOp::Equal, "0"),
            leaf(name_col(), RelOp::Equal, "h1"),
        ]);
        let mut mask = u32::MAX;
        assert!(!filter.optimize_bitmask("state", &mut mask, 0));
    }

    #[test]
    fn test_optimizer_soundness_on_world() {
        let world = world();
        let filter = Filter::And(vec![leaf(state_col(), RelOp::Equal, "1")]);
        let mut mask = u32::MAX;
        assert!(filter.optimize_bitmask("state", &mut mask, 0));
        for h in world.hosts() {
            let ctx = RowCtx {
                world: &world,
                row: Row::Host(h),
                auth_user: None,
                timezone_offset: 0,
                now: 0,
            };
            if filter.accepts(&ctx) {
                assert_eq!(h.state as u32 & !mask, 0);
            }
        }
    }

    #[test]
    fn test_combine_tail() {
        let mut stack = vec![
            leaf(state_col(), RelOp::Equal, "0"),
            leaf(state_col(), RelOp::Equal, "1"),
        ];
        combine_tail(&mut stack, LogicOp::Or, 2).unwrap();
        assert_eq!(stack.len(), 1);
        let world = world();
        assert_eq!(accepted_hosts(&stack[0], &world), vec!["h1", "h2"]);

        assert!(combine_tail(&mut stack, LogicOp::And, 5).is_err());
        combine_tail(&mut stack, LogicOp::And, 0).unwrap();
        assert_eq!(stack.len(), 1);
    }
}
