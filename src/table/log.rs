//! The log table
//!
//! Scans the daemon's pre-parsed history log. The filter tree is asked for
//! limits on the `time` column first, so queries with a bounded window
//! never touch the rest of the retention.

use std::borrow::Cow;
use std::sync::Arc;

use crate::column::{Column, Getter, Row, RowCtx};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::table::{host_has_contact, hosts, service_has_contact, services, Catalog, Table};
use crate::world::{Contact, DaemonView, LogEntry};

pub struct TableLog {
    catalog: Catalog,
    service_auth: AuthorizationKind,
}

fn log_string(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    f: for<'e> fn(&'e LogEntry) -> &'e str,
) {
    catalog.add(Column::string(name, description, move |ctx| {
        ctx.row
            .as_log()
            .map(|e| Cow::Borrowed(f(e)))
            .unwrap_or_default()
    }));
}

fn log_int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&LogEntry) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        ctx.row.as_log().map(f).unwrap_or(0)
    }));
}

fn current_host() -> Getter<crate::world::Host> {
    Arc::new(|ctx: &RowCtx<'_>| {
        let entry = ctx.row.as_log()?;
        let index = ctx.world.find_host(&entry.host_name)?;
        Some(&ctx.world.hosts()[index])
    })
}

fn current_service() -> Getter<crate::world::Service> {
    Arc::new(|ctx: &RowCtx<'_>| {
        let entry = ctx.row.as_log()?;
        let index = ctx
            .world
            .find_service(&entry.host_name, &entry.service_description)?;
        Some(&ctx.world.services()[index])
    })
}

impl TableLog {
    pub fn new(service_auth: AuthorizationKind) -> TableLog {
        let mut catalog = Catalog::new();
        catalog.add(Column::time(
            "time",
            "Time of the log event (UNIX timestamp)",
            |ctx| ctx.row.as_log().map(|e| e.time).unwrap_or(0),
        ));
        log_int(&mut catalog, "lineno", "The number of the line in the log file", |e| e.lineno);
        log_int(
            &mut catalog,
            "class",
            "The class of the message as integer (0:info, 1:state, 2:program, 3:notification, 4:passive, 5:command)",
            |e| e.class,
        );
        log_string(&mut catalog, "message", "The complete message line including the timestamp", |e| {
            &e.message
        });
        log_string(
            &mut catalog,
            "type",
            "The type of the message (text before the colon), the message itself for info messages",
            |e| &e.kind,
        );
        log_string(&mut catalog, "options", "The part of the message after the ':'", |e| {
            &e.options
        });
        log_string(&mut catalog, "comment", "A comment field used in various message types", |e| {
            &e.comment
        });
        log_string(
            &mut catalog,
            "plugin_output",
            "The output of the check, if any is associated with the message",
            |e| &e.plugin_output,
        );
        log_int(&mut catalog, "state", "The state of the host or service in question", |e| e.state);
        log_string(&mut catalog, "state_type", "The type of the state (varies on different log classes)", |e| {
            &e.state_type
        });
        log_int(&mut catalog, "attempt", "The number of the check attempt", |e| e.attempt);
        log_string(
            &mut catalog,
            "service_description",
            "The description of the service log entry is about (might be empty)",
            |e| &e.service_description,
        );
        log_string(
            &mut catalog,
            "host_name",
            "The name of the host the log entry is about (might be empty)",
            |e| &e.host_name,
        );
        log_string(
            &mut catalog,
            "contact_name",
            "The name of the contact the log entry is about (might be empty)",
            |e| &e.contact_name,
        );
        log_string(
            &mut catalog,
            "command_name",
            "The name of the command of the log entry (e.g. for notifications)",
            |e| &e.command_name,
        );
        hosts::add_columns(&mut catalog, "current_host_", current_host());
        services::add_columns(&mut catalog, "current_service_", current_service(), false);
        TableLog {
            catalog,
            service_auth,
        }
    }
}

impl Table for TableLog {
    fn name(&self) -> &'static str {
        "log"
    }

    fn name_prefix(&self) -> &'static str {
        "log_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        let (since, until) = query.int_limits("time", 0, query.server_now() + 1);
        if since >= until {
            return;
        }
        let class_mask = query.value_mask("class");
        for entry in world.log_entries(since, until) {
            // Cheap class pre-filter, the full filter still runs per row.
            if (0..32).contains(&entry.class) && class_mask & (1 << entry.class) == 0 {
                continue;
            }
            if !query.process(self, Row::Log(entry)) {
                return;
            }
        }
    }

    /// A log line is visible if its object is. Lines without a host are
    /// visible to everyone.
    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        let Some(entry) = row.as_log() else {
            return false;
        };
        if entry.host_name.is_empty() {
            return true;
        }
        let Some(contact) = user else {
            return false;
        };
        if !entry.service_description.is_empty() {
            if let Some(index) = world.find_service(&entry.host_name, &entry.service_description)
            {
                return service_has_contact(
                    world,
                    self.service_auth,
                    &world.services()[index],
                    contact,
                );
            }
        }
        match world.find_host(&entry.host_name) {
            Some(index) => host_has_contact(world, &world.hosts()[index], contact),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_columns() {
        let table = TableLog::new(AuthorizationKind::Loose);
        for name in ["time", "class", "message", "current_host_name"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
    }
}
