//! Stats aggregation
//!
//! A `Stats:` header is either a counting predicate (a filter whose matches
//! are counted) or a numeric operation bound to an int/double/time column.
//! One [`Aggregator`] instance runs per stats column per group; groups are
//! created lazily by the query when their key first appears.

use std::sync::Arc;

use crate::column::{Column, ColumnData, RowCtx};
use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsOperation {
    Sum,
    Min,
    Max,
    Avg,
    Std,
    SumInv,
    AvgInv,
}

impl StatsOperation {
    pub fn parse(token: &str) -> Option<StatsOperation> {
        Some(match token {
            "sum" => StatsOperation::Sum,
            "min" => StatsOperation::Min,
            "max" => StatsOperation::Max,
            "avg" => StatsOperation::Avg,
            "std" => StatsOperation::Std,
            "suminv" => StatsOperation::SumInv,
            "avginv" => StatsOperation::AvgInv,
            _ => return None,
        })
    }
}

/// One parsed `Stats:` line.
pub enum StatsColumn {
    /// Count the rows matching a filter.
    Count(Filter),
    /// Fold a numeric column.
    Operation {
        op: StatsOperation,
        column: Arc<Column>,
    },
}

impl StatsColumn {
    pub fn create_aggregator(&self) -> Aggregator {
        match self {
            StatsColumn::Count(filter) => Aggregator::Count {
                filter: filter.clone(),
                count: 0,
            },
            StatsColumn::Operation { op, column } => Aggregator::Numeric {
                op: *op,
                column: Arc::clone(column),
                count: 0,
                aggr: 0.0,
                sumq: 0.0,
            },
        }
    }

    /// Counting stats carry their own filter; take it back out for
    /// `StatsAnd:`/`StatsOr:` composition.
    pub fn into_filter(self) -> Option<Filter> {
        match self {
            StatsColumn::Count(filter) => Some(filter),
            StatsColumn::Operation { .. } => None,
        }
    }
}

/// Running state for one stats column within one group.
pub enum Aggregator {
    Count { filter: Filter, count: u64 },
    Numeric {
        op: StatsOperation,
        column: Arc<Column>,
        count: u64,
        aggr: f64,
        sumq: f64,
    },
}

impl Aggregator {
    pub fn consume(&mut self, ctx: &RowCtx<'_>) {
        match self {
            Aggregator::Count { filter, count } => {
                if filter.accepts(ctx) {
                    *count += 1;
                }
            }
            Aggregator::Numeric {
                op,
                column,
                count,
                aggr,
                sumq,
            } => {
                let value = column.double_value(ctx);
                *count += 1;
                match op {
                    StatsOperation::Sum | StatsOperation::Avg => *aggr += value,
                    StatsOperation::Min => {
                        if *count == 1 || value < *aggr {
                            *aggr = value;
                        }
                    }
                    StatsOperation::Max => {
                        if *count == 1 || value > *aggr {
                            *aggr = value;
                        }
                    }
                    StatsOperation::Std => {
                        *aggr += value;
                        *sumq += value * value;
                    }
                    StatsOperation::SumInv | StatsOperation::AvgInv => *aggr += 1.0 / value,
                }
            }
        }
    }

    pub fn output(&self) -> ColumnData<'static> {
        match self {
            Aggregator::Count { count, .. } => ColumnData::Int(*count as i64),
            Aggregator::Numeric {
                op,
                count,
                aggr,
                sumq,
                ..
            } => {
                let n = *count as f64;
                let value = match op {
                    StatsOperation::Sum
                    | StatsOperation::Min
                    | StatsOperation::Max
                    | StatsOperation::SumInv => *aggr,
                    StatsOperation::Avg | StatsOperation::AvgInv => {
                        if *count == 0 {
                            0.0
                        } else {
                            *aggr / n
                        }
                    }
                    StatsOperation::Std => {
                        if *count == 0 {
                            0.0
                        } else {
                            let mean = *aggr / n;
                            (*sumq / n - mean * mean).max(0.0).sqrt()
                        }
                    }
                };
                ColumnData::Double(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Row, RowCtx};
    use crate::world::{DaemonView, Host, StaticWorld};

    fn latency_col() -> Arc<Column> {
        Column::double("latency", "Check latency", |ctx| {
            ctx.row.as_host().map(|h| h.latency).unwrap_or(0.0)
        })
    }

    fn world_with_latencies(values: &[f64]) -> StaticWorld {
        let mut world = StaticWorld::default();
        for (i, &latency) in values.iter().enumerate() {
            world.hosts.push(Host {
                name: format!("h{}", i),
                latency,
                ..Host::default()
            });
        }
        world.finish().unwrap()
    }

    fn run(op: StatsOperation, world: &StaticWorld) -> f64 {
        let stats = StatsColumn::Operation {
            op,
            column: latency_col(),
        };
        let mut aggr = stats.create_aggregator();
        for h in world.hosts() {
            aggr.consume(&RowCtx {
                world,
                row: Row::Host(h),
                auth_user: None,
                timezone_offset: 0,
                now: 0,
            });
        }
        match aggr.output() {
            ColumnData::Double(v) => v,
            other => panic!("expected double, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregator_laws() {
        let world = world_with_latencies(&[1.0, 2.0, 3.0, 4.0]);
        let sum = run(StatsOperation::Sum, &world);
        let avg = run(StatsOperation::Avg, &world);
        let min = run(StatsOperation::Min, &world);
        let max = run(StatsOperation::Max, &world);
        assert_eq!(sum, 10.0);
        assert_eq!(avg, sum / 4.0);
        assert!(min <= avg && avg <= max);
        assert_eq!(min, 1.0);
        assert_eq!(max, 4.0);
    }

    #[test]
    fn test_std_of_single_row_is_zero() {
        let world = world_with_latencies(&[7.5]);
        assert_eq!(run(StatsOperation::Std, &world), 0.0);
    }

    #[test]
    fn test_std_matches_definition() {
        let world = world_with_latencies(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let std = run(StatsOperation::Std, &world);
        assert!((std - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_permutation_invariance() {
        let a = world_with_latencies(&[3.0, 1.0, 2.0]);
        let b = world_with_latencies(&[2.0, 3.0, 1.0]);
        for op in [
            StatsOperation::Sum,
            StatsOperation::Min,
            StatsOperation::Max,
            StatsOperation::Avg,
            StatsOperation::SumInv,
            StatsOperation::AvgInv,
        ] {
            assert!((run(op, &a) - run(op, &b)).abs() < 1e-12, "op {:?}", op);
        }
    }

    #[test]
    fn test_suminv() {
        let world = world_with_latencies(&[2.0, 4.0]);
        assert!((run(StatsOperation::SumInv, &world) - 0.75).abs() < 1e-12);
        assert!((run(StatsOperation::AvgInv, &world) - 0.375).abs() < 1e-12);
    }
}
