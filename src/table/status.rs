//! The status table
//!
//! One row only. Mixes daemon-global toggles from the view with the
//! engine's own connection counters.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::column::{Column, Row, RowCtx};
use crate::query::Query;
use crate::table::{Catalog, Table};
use crate::world::StatusInfo;

/// Engine-owned request counters, shared with the status table.
#[derive(Debug, Default)]
pub struct Counters {
    pub connections: AtomicU64,
    pub requests: AtomicU64,
    pub commands: AtomicU64,
}

pub struct TableStatus {
    catalog: Catalog,
}

fn status_int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&StatusInfo) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        f(ctx.world.status())
    }));
}

fn status_time(catalog: &mut Catalog, name: &str, description: &str, f: fn(&StatusInfo) -> i64) {
    catalog.add(Column::time(name, description, move |ctx| {
        f(ctx.world.status())
    }));
}

fn counter(
    catalog: &mut Catalog,
    counters: &Arc<Counters>,
    name: &str,
    description: &str,
    f: fn(&Counters) -> &AtomicU64,
) {
    let counters = Arc::clone(counters);
    catalog.add(Column::int(name, description, move |_ctx: &RowCtx<'_>| {
        f(&counters).load(Ordering::Relaxed) as i64
    }));
}

impl TableStatus {
    pub fn new(counters: &Arc<Counters>, client_threads: usize) -> TableStatus {
        let mut catalog = Catalog::new();

        counter(
            &mut catalog,
            counters,
            "connections",
            "The number of client connections to the query engine since program start",
            |c| &c.connections,
        );
        counter(
            &mut catalog,
            counters,
            "requests",
            "The number of requests to the query engine since program start",
            |c| &c.requests,
        );
        counter(
            &mut catalog,
            counters,
            "external_commands",
            "The number of external commands since program start",
            |c| &c.commands,
        );

        status_int(&mut catalog, "pid", "The process ID of the monitoring daemon", |s| s.pid);
        status_int(
            &mut catalog,
            "enable_notifications",
            "Whether notifications are enabled in general (0/1)",
            |s| s.enable_notifications,
        );
        status_int(
            &mut catalog,
            "execute_service_checks",
            "Whether active service checks are activated in general (0/1)",
            |s| s.execute_service_checks,
        );
        status_int(
            &mut catalog,
            "accept_passive_service_checks",
            "Whether passive service checks are activated in general (0/1)",
            |s| s.accept_passive_service_checks,
        );
        status_int(
            &mut catalog,
            "execute_host_checks",
            "Whether host checks are executed in general (0/1)",
            |s| s.execute_host_checks,
        );
        status_int(
            &mut catalog,
            "accept_passive_host_checks",
            "Whether passive host checks are accepted in general (0/1)",
            |s| s.accept_passive_host_checks,
        );
        status_int(
            &mut catalog,
            "enable_event_handlers",
            "Whether event handlers are activated in general (0/1)",
            |s| s.enable_event_handlers,
        );
        status_int(
            &mut catalog,
            "obsess_over_services",
            "Whether the daemon will obsess over service checks (0/1)",
            |s| s.obsess_over_services,
        );
        status_int(
            &mut catalog,
            "obsess_over_hosts",
            "Whether the daemon will obsess over host checks (0/1)",
            |s| s.obsess_over_hosts,
        );
        status_int(
            &mut catalog,
            "check_service_freshness",
            "Whether service freshness checking is activated in general (0/1)",
            |s| s.check_service_freshness,
        );
        status_int(
            &mut catalog,
            "check_host_freshness",
            "Whether host freshness checking is activated in general (0/1)",
            |s| s.check_host_freshness,
        );
        status_int(
            &mut catalog,
            "enable_flap_detection",
            "Whether flap detection is activated in general (0/1)",
            |s| s.enable_flap_detection,
        );
        status_int(
            &mut catalog,
            "process_performance_data",
            "Whether processing of performance data is activated in general (0/1)",
            |s| s.process_performance_data,
        );
        status_int(
            &mut catalog,
            "check_external_commands",
            "Whether the daemon checks for external commands at its command pipe (0/1)",
            |s| s.check_external_commands,
        );
        status_time(
            &mut catalog,
            "program_start",
            "The time of the last program start as UNIX timestamp",
            |s| s.program_start,
        );
        status_time(
            &mut catalog,
            "last_command_check",
            "The time of the last check for a command as UNIX timestamp",
            |s| s.last_command_check,
        );
        status_time(
            &mut catalog,
            "last_log_rotation",
            "Time time of the last log file rotation",
            |s| s.last_log_rotation,
        );
        status_int(
            &mut catalog,
            "interval_length",
            "The default interval length from the daemon configuration",
            |s| s.interval_length,
        );
        status_int(
            &mut catalog,
            "cached_log_messages",
            "The current number of log messages the daemon keeps in memory",
            |s| s.cached_log_messages,
        );

        catalog.add(Column::int(
            "num_hosts",
            "The total number of hosts",
            |ctx| ctx.world.hosts().len() as i64,
        ));
        catalog.add(Column::int(
            "num_services",
            "The total number of services",
            |ctx| ctx.world.services().len() as i64,
        ));
        catalog.add(Column::string(
            "program_version",
            "The version of the monitoring daemon",
            |ctx| Cow::Borrowed(ctx.world.status().program_version.as_str()),
        ));
        catalog.add(Column::string(
            "engine_version",
            "The version of the query engine",
            |_ctx| Cow::Borrowed(env!("CARGO_PKG_VERSION")),
        ));
        catalog.add(Column::int(
            "client_threads",
            "The maximum number of queries that can be handled in parallel",
            move |_ctx| client_threads as i64,
        ));

        TableStatus { catalog }
    }
}

impl Table for TableStatus {
    fn name(&self) -> &'static str {
        "status"
    }

    fn name_prefix(&self) -> &'static str {
        "status_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        query.process(self, Row::Status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_columns() {
        let counters = Arc::new(Counters::default());
        let table = TableStatus::new(&counters, 10);
        for name in ["requests", "program_start", "num_hosts", "engine_version"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
    }
}
