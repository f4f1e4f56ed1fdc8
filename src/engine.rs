//! Request dispatch
//!
//! The `Engine` owns the table registry, the wait triggers and the request
//! counters. The embedding daemon constructs one engine over its
//! [`DaemonView`] and calls [`Engine::serve_connection`] from each worker
//! thread; the engine itself never spawns threads.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::buffer::{InputBuffer, OutputBuffer, ResponseCode, ResponseHeaderKind};
use crate::config::EngineConfig;
use crate::query::Query;
use crate::table::{
    Table, TableColumns, TableCommands, TableComments, TableContactgroups, TableContacts,
    TableDowntimes, TableEventConsole, TableHostgroups, TableHosts, TableLog, TableServicegroups,
    TableServices, TableStateHistory, TableStatus, TableTimeperiods,
};
use crate::triggers::{Trigger, Triggers};
use crate::world::DaemonView;

pub use crate::table::Counters;

pub struct Engine {
    world: Arc<dyn DaemonView>,
    config: EngineConfig,
    triggers: Arc<Triggers>,
    counters: Arc<Counters>,
    tables: Vec<Box<dyn Table>>,
    by_name: HashMap<&'static str, usize>,
}

impl Engine {
    pub fn new(world: Arc<dyn DaemonView>, config: EngineConfig) -> Engine {
        let counters = Arc::new(Counters::default());
        let service_auth = config.service_authorization;
        let group_auth = config.group_authorization;

        let mut tables: Vec<Box<dyn Table>> = vec![
            Box::new(TableHosts::new()),
            Box::new(TableServices::new(service_auth)),
            Box::new(TableHostgroups::new(group_auth)),
            Box::new(TableServicegroups::new(group_auth, service_auth)),
            Box::new(TableContacts::new()),
            Box::new(TableContactgroups::new()),
            Box::new(TableCommands::new()),
            Box::new(TableTimeperiods::new()),
            Box::new(TableDowntimes::new(service_auth)),
            Box::new(TableComments::new(service_auth)),
            Box::new(TableLog::new(service_auth)),
            Box::new(TableStateHistory::new(service_auth)),
            Box::new(TableStatus::new(&counters, config.num_client_threads)),
            Box::new(TableEventConsole::events()),
            Box::new(TableEventConsole::history()),
            Box::new(TableEventConsole::status()),
            Box::new(TableEventConsole::rules()),
            Box::new(TableEventConsole::replication()),
        ];
        tables.push(Box::new(TableColumns::new(&tables)));

        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name(), i))
            .collect();

        tracing::info!(
            "query engine ready: {} tables, {} hosts, {} services",
            tables.len(),
            world.hosts().len(),
            world.services().len()
        );

        Engine {
            world,
            config,
            triggers: Arc::new(Triggers::new()),
            counters,
            tables,
            by_name,
        }
    }

    /// The condition variables the daemon signals on state changes.
    pub fn triggers(&self) -> Arc<Triggers> {
        Arc::clone(&self.triggers)
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn find_table(&self, name: &str) -> Option<&dyn Table> {
        self.by_name.get(name).map(|&i| self.tables[i].as_ref())
    }

    /// Serve one client connection until EOF, an I/O error, or a request
    /// without keepalive.
    pub fn serve_connection<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> std::io::Result<()> {
        self.counters.connections.fetch_add(1, Ordering::Relaxed);
        let mut input = InputBuffer::new(reader);
        loop {
            let Some(lines) = input.read_request()? else {
                return Ok(());
            };
            if lines.is_empty() {
                return Ok(());
            }
            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            let mut out = OutputBuffer::new(self.config.max_response_size);
            let keepalive = self.answer_request(&lines, &mut out);
            out.flush(&mut writer)?;
            if !keepalive {
                return Ok(());
            }
        }
    }

    /// Answer one request into `out`, returning the keepalive wish.
    pub fn answer_request(&self, lines: &[String], out: &mut OutputBuffer) -> bool {
        let Some(request) = lines.first() else {
            return false;
        };
        tracing::debug!("request: {}", request);

        if let Some(rest) = request.strip_prefix("GET ") {
            return self.answer_get(rest.trim(), &lines[1..], out);
        }
        if request == "GET" {
            return self.answer_get("", &lines[1..], out);
        }
        if let Some(command) = request.strip_prefix("COMMAND ") {
            self.counters.commands.fetch_add(1, Ordering::Relaxed);
            self.world.submit_command(command.trim());
            self.triggers.notify(Trigger::Command);
            // Commands produce no response at all.
            return scan_keepalive(lines);
        }

        out.set_error(
            ResponseCode::BadRequest,
            &format!("invalid request method '{}'", request),
        );
        false
    }

    fn answer_get(&self, table_name: &str, headers: &[String], out: &mut OutputBuffer) -> bool {
        let Some(table) = self.find_table(table_name) else {
            out.set_error(
                ResponseCode::NotFound,
                &format!("invalid GET request, no such table '{}'", table_name),
            );
            // Honor response framing headers even for unknown tables.
            if headers.iter().any(|l| l.trim() == "ResponseHeader: fixed16") {
                out.response_header = ResponseHeaderKind::Fixed16;
            }
            return scan_keepalive(headers);
        };

        let mut query = Query::parse(
            table,
            headers,
            self.world.as_ref(),
            &self.config,
            &self.triggers,
            out,
        );
        if !query.has_error() {
            query.start(table);
        }
        if !query.has_error() {
            table.answer_query(&mut query);
        }
        query.finish()
    }
}

fn scan_keepalive(lines: &[String]) -> bool {
    lines.iter().any(|l| l.trim() == "KeepAlive: on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StaticWorld;
    use std::io::Cursor;

    fn engine() -> Engine {
        let world = StaticWorld::from_json(
            r#"{
                "hosts": [
                    {"name": "h1", "state": 0, "alias": "first"},
                    {"name": "h2", "state": 1, "alias": "second"}
                ]
            }"#,
        )
        .unwrap();
        Engine::new(Arc::new(world), EngineConfig::default())
    }

    fn run(engine: &Engine, request: &str) -> String {
        let mut response = Vec::new();
        engine
            .serve_connection(Cursor::new(request.to_string()), &mut response)
            .unwrap();
        String::from_utf8(response).unwrap()
    }

    #[test]
    fn test_simple_get() {
        let engine = engine();
        let response = run(&engine, "GET hosts\nColumns: name state\n\n");
        assert_eq!(response, "h1;0\nh2;1\n");
    }

    #[test]
    fn test_unknown_table_is_404() {
        let engine = engine();
        let response = run(
            &engine,
            "GET nonsense\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("404 "));
    }

    #[test]
    fn test_default_columns_have_header_row() {
        let engine = engine();
        let response = run(&engine, "GET hosts\nColumns: name\nColumnHeaders: on\n\n");
        assert_eq!(response, "name\nh1\nh2\n");
    }

    #[test]
    fn test_request_counter_increments() {
        let engine = engine();
        run(&engine, "GET hosts\n\n");
        run(&engine, "GET hosts\n\n");
        assert_eq!(
            engine.counters().requests.load(Ordering::Relaxed),
            2
        );
    }

    #[test]
    fn test_keepalive_serves_multiple_requests() {
        let engine = engine();
        let response = run(
            &engine,
            "GET hosts\nColumns: name\nKeepAlive: on\n\nGET hosts\nColumns: alias\n\n",
        );
        assert_eq!(response, "h1\nh2\nfirst\nsecond\n");
    }
}
