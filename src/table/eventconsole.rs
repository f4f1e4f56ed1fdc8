//! Event-console tables
//!
//! These tables do not scan daemon memory. The query is forwarded over a
//! Unix socket to the sibling event-console daemon, its tab-separated
//! reply is reshaped into rows, and host-based authorisation is applied
//! on our side. A connection failure yields one 502 error line, never a
//! partial result.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use crate::buffer::ResponseCode;
use crate::column::{Column, EcRow, Getter, Row, RowCtx};
use crate::query::Query;
use crate::table::{host_has_contact, hosts, Catalog, Table};
use crate::world::{Contact, DaemonView};

/// Field values the event console uses for "not set" and as list
/// separator in plain output mode.
const EC_NONE: &str = "\u{2}";
const EC_LIST_SEP: char = '\u{1}';

pub struct TableEventConsole {
    name: &'static str,
    prefix: &'static str,
    /// Table name understood by the remote daemon.
    remote_name: &'static str,
    catalog: Catalog,
    /// Events and history rows carry host columns and are auth-guarded.
    guarded: bool,
}

fn ec_field<'a>(ctx: &RowCtx<'a>, name: &str) -> &'a str {
    match ctx.row {
        Row::Ec(row) => row.field(name),
        _ => "",
    }
}

fn ec_string(catalog: &mut Catalog, name: &'static str, description: &str) {
    catalog.add(Column::string(name, description, move |ctx| {
        Cow::Borrowed(ec_field(ctx, name))
    }));
}

fn ec_int(catalog: &mut Catalog, name: &'static str, description: &str) {
    catalog.add(Column::int(name, description, move |ctx| {
        ec_field(ctx, name).parse().unwrap_or(0)
    }));
}

fn ec_time(catalog: &mut Catalog, name: &'static str, description: &str) {
    catalog.add(Column::time(name, description, move |ctx| {
        // The console sends float timestamps.
        ec_field(ctx, name).parse::<f64>().unwrap_or(0.0) as i64
    }));
}

fn ec_list(catalog: &mut Catalog, name: &'static str, description: &str) {
    catalog.add(Column::list(name, description, move |ctx| {
        let raw = ec_field(ctx, name);
        if raw.is_empty() || raw == EC_NONE {
            return Vec::new();
        }
        raw.split(EC_LIST_SEP)
            .filter(|part| !part.is_empty())
            .map(Cow::Borrowed)
            .collect()
    }));
}

fn event_host() -> Getter<crate::world::Host> {
    Arc::new(|ctx: &RowCtx<'_>| match ctx.row {
        Row::Ec(row) => row.host.map(|i| &ctx.world.hosts()[i]),
        _ => None,
    })
}

fn add_event_columns(catalog: &mut Catalog) {
    ec_int(catalog, "event_id", "The unique ID for this event");
    ec_int(
        catalog,
        "event_count",
        "The number of occurrences of this event within period",
    );
    ec_string(catalog, "event_text", "The textual description of the event");
    ec_time(
        catalog,
        "event_first",
        "Time of the first occurrence of the event (Unix timestamp)",
    );
    ec_time(
        catalog,
        "event_last",
        "Time of the last occurrence of this event (Unix timestamp)",
    );
    ec_string(catalog, "event_comment", "Event comment");
    ec_int(catalog, "event_sl", "The service level for this event");
    ec_string(catalog, "event_host", "Host name for this event");
    ec_string(catalog, "event_contact", "Contact information");
    ec_string(catalog, "event_application", "Syslog tag/application");
    ec_int(catalog, "event_pid", "The process ID of the originating process");
    ec_int(catalog, "event_priority", "Syslog priority");
    ec_int(catalog, "event_facility", "Syslog facility");
    ec_string(catalog, "event_rule_id", "The ID of the rule");
    ec_int(catalog, "event_state", "The state of the event (0/1/2/3)");
    ec_string(
        catalog,
        "event_phase",
        "The phase the event is currently in (one of open/closed/delayed/counting/ack)",
    );
    ec_string(catalog, "event_owner", "The owner of the event");
    ec_list(
        catalog,
        "event_match_groups",
        "Text groups from regular expression match",
    );
    ec_list(catalog, "event_contact_groups", "Contact groups");
    ec_string(
        catalog,
        "event_contact_groups_precedence",
        "Whether or not the host- or rule groups have precedence",
    );
    ec_string(catalog, "event_ipaddress", "The IP address where the event originated");
}

impl TableEventConsole {
    pub fn events() -> TableEventConsole {
        let mut catalog = Catalog::new();
        add_event_columns(&mut catalog);
        hosts::add_columns(&mut catalog, "host_", event_host());
        TableEventConsole {
            name: "eventconsoleevents",
            prefix: "eventconsoleevents_",
            remote_name: "events",
            catalog,
            guarded: true,
        }
    }

    pub fn history() -> TableEventConsole {
        let mut catalog = Catalog::new();
        ec_int(&mut catalog, "history_line", "The line number of the event in the history file");
        ec_time(&mut catalog, "history_time", "Time when the event was written into the history file (Unix timestamp)");
        ec_string(&mut catalog, "history_what", "What happened (one of ARCHIVED/AUTODELETE/CANCELLED/CHANGESTATE/COUNTFAILED/COUNTREACHED/DELETE/EMAIL/EXPIRED/NEW/NOCOUNT/ORPHANED/SCRIPT/UPDATE)");
        ec_string(&mut catalog, "history_who", "The user who triggered the command");
        ec_string(&mut catalog, "history_addinfo", "Additional information");
        add_event_columns(&mut catalog);
        hosts::add_columns(&mut catalog, "host_", event_host());
        TableEventConsole {
            name: "eventconsolehistory",
            prefix: "eventconsolehistory_",
            remote_name: "history",
            catalog,
            guarded: true,
        }
    }

    pub fn status() -> TableEventConsole {
        let mut catalog = Catalog::new();
        ec_time(&mut catalog, "status_config_load_time", "The time when the configuration was loaded (Unix timestamp)");
        ec_int(&mut catalog, "status_num_open_events", "The number of currently open events");
        ec_int(&mut catalog, "status_messages", "The number of messages received since startup");
        TableEventConsole {
            name: "eventconsolestatus",
            prefix: "eventconsolestatus_",
            remote_name: "status",
            catalog,
            guarded: false,
        }
    }

    pub fn rules() -> TableEventConsole {
        let mut catalog = Catalog::new();
        ec_string(&mut catalog, "rule_id", "The ID of the rule");
        ec_int(&mut catalog, "rule_hits", "The times rule matched an incoming message");
        TableEventConsole {
            name: "eventconsolerules",
            prefix: "eventconsolerules_",
            remote_name: "rules",
            catalog,
            guarded: false,
        }
    }

    pub fn replication() -> TableEventConsole {
        let mut catalog = Catalog::new();
        ec_string(&mut catalog, "replication_slavemode", "The replication slavemode (empty or one of sync/takeover)");
        ec_time(&mut catalog, "replication_last_sync", "Time of the last replication (Unix timestamp)");
        ec_int(&mut catalog, "replication_priority", "The replication priority");
        TableEventConsole {
            name: "eventconsolereplication",
            prefix: "eventconsolereplication_",
            remote_name: "replication",
            catalog,
            guarded: false,
        }
    }

    /// Column names the remote daemon knows, i.e. everything that is not
    /// a joined host column.
    fn remote_columns(&self) -> Vec<&str> {
        self.catalog
            .columns()
            .iter()
            .map(|c| c.name())
            .filter(|name| !name.starts_with("host_"))
            .collect()
    }

    fn fetch(&self, world: &dyn DaemonView, path: &Path) -> Result<Vec<EcRow>, String> {
        let mut stream = UnixStream::connect(path)
            .map_err(|e| format!("cannot connect to event console at {:?}: {}", path, e))?;
        let mut request = format!("GET {}\nOutputFormat: plain\nColumns:", self.remote_name);
        for name in self.remote_columns() {
            request.push(' ');
            request.push_str(name);
        }
        request.push_str("\n\n");
        stream
            .write_all(request.as_bytes())
            .and_then(|_| stream.shutdown(std::net::Shutdown::Write))
            .map_err(|e| format!("cannot send request to event console: {}", e))?;

        let reader = BufReader::new(stream);
        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| format!("cannot read event console reply: {}", e))?;
            if line.is_empty() {
                break;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match &headers {
                None => {
                    headers = Some(fields.iter().map(|f| f.to_string()).collect());
                }
                Some(names) => {
                    let mut map = HashMap::new();
                    for (i, name) in names.iter().enumerate() {
                        map.insert(
                            name.clone(),
                            fields.get(i).copied().unwrap_or("").to_string(),
                        );
                    }
                    let host = map
                        .get("event_host")
                        .filter(|h| !h.is_empty() && *h != EC_NONE)
                        .and_then(|h| world.host_by_designation(h));
                    rows.push(EcRow { fields: map, host });
                }
            }
        }
        Ok(rows)
    }
}

impl Table for TableEventConsole {
    fn name(&self) -> &'static str {
        self.name
    }

    fn name_prefix(&self) -> &'static str {
        self.prefix
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        let Some(path) = world.event_console_path() else {
            // Event console not enabled, the table is simply empty.
            return;
        };
        match self.fetch(world, path) {
            Ok(rows) => {
                for row in &rows {
                    if !query.process(self, Row::Ec(row)) {
                        return;
                    }
                }
            }
            Err(message) => {
                tracing::warn!("event console query failed: {}", message);
                query.set_error(ResponseCode::BackendError, &message);
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        if !self.guarded {
            return true;
        }
        let (Some(contact), Row::Ec(event)) = (user, row) else {
            return false;
        };
        let via_groups = || -> Option<bool> {
            let raw = event.fields.get("event_contact_groups")?;
            if raw == EC_NONE {
                return None;
            }
            Some(
                raw.split(EC_LIST_SEP)
                    .filter(|g| !g.is_empty())
                    .any(|g| world.is_member_of_contactgroup(g, contact)),
            )
        };
        let via_host = || -> Option<bool> {
            event
                .host
                .map(|i| host_has_contact(world, &world.hosts()[i], contact))
        };
        match event.field("event_contact_groups_precedence") {
            "rule" => via_groups().or_else(via_host).unwrap_or(true),
            "host" | "" => via_host().or_else(via_groups).unwrap_or(true),
            other => {
                tracing::error!(
                    "unknown contact group precedence '{}' in table {}",
                    other,
                    self.name
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_columns_exclude_host_family() {
        let table = TableEventConsole::events();
        let remote = table.remote_columns();
        assert!(remote.contains(&"event_id"));
        assert!(!remote.iter().any(|name| name.starts_with("host_")));
        // but joined host columns are queryable
        assert!(table.column("host_name").is_some());
    }

    #[test]
    fn test_five_tables() {
        let names: Vec<&str> = [
            TableEventConsole::events().name(),
            TableEventConsole::history().name(),
            TableEventConsole::status().name(),
            TableEventConsole::rules().name(),
            TableEventConsole::replication().name(),
        ]
        .to_vec();
        assert_eq!(
            names,
            vec![
                "eventconsoleevents",
                "eventconsolehistory",
                "eventconsolestatus",
                "eventconsolerules",
                "eventconsolereplication"
            ]
        );
    }
}
