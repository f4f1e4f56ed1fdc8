//! The statehistory table
//!
//! Replays alert log entries within the queried time window into one row
//! per uninterrupted state span of a host or service. `duration_part` is
//! the share of the span within the window, so summing it per state gives
//! availability numbers directly.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::column::{Column, Row, StateSpan};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::table::{host_has_contact, service_has_contact, Catalog, Table};
use crate::world::{Contact, DaemonView};

pub struct TableStateHistory {
    catalog: Catalog,
    service_auth: AuthorizationKind,
}

fn span_int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&StateSpan) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        match ctx.row {
            Row::StateSpan(span) => f(span),
            _ => 0,
        }
    }));
}

fn span_time(catalog: &mut Catalog, name: &str, description: &str, f: fn(&StateSpan) -> i64) {
    catalog.add(Column::time(name, description, move |ctx| {
        match ctx.row {
            Row::StateSpan(span) => f(span),
            _ => 0,
        }
    }));
}

fn span_string(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    f: for<'s> fn(&'s StateSpan) -> &'s str,
) {
    catalog.add(Column::string(name, description, move |ctx| {
        match ctx.row {
            Row::StateSpan(span) => Cow::Borrowed(f(span)),
            _ => Cow::Borrowed(""),
        }
    }));
}

impl TableStateHistory {
    pub fn new(service_auth: AuthorizationKind) -> TableStateHistory {
        let mut catalog = Catalog::new();
        span_time(&mut catalog, "time", "Time of the log event (seconds since 1/1/1970)", |s| {
            s.time
        });
        span_time(&mut catalog, "from", "Start time of state (seconds since 1/1/1970)", |s| s.from);
        span_time(&mut catalog, "until", "End time of state (seconds since 1/1/1970)", |s| s.until);
        span_int(&mut catalog, "duration", "Duration of state (until - from)", |s| s.duration);
        catalog.add(Column::double(
            "duration_part",
            "Duration part in regard to the query timeframe",
            |ctx| match ctx.row {
                Row::StateSpan(span) => span.duration_part,
                _ => 0.0,
            },
        ));
        span_int(&mut catalog, "state", "The state of the host or service in question - OK(0) / WARNING(1) / CRITICAL(2) / UNKNOWN(3) / UNMONITORED(-1)", |s| {
            s.state
        });
        span_string(&mut catalog, "host_name", "Host name", |s| &s.host_name);
        span_string(&mut catalog, "service_description", "Description of the service", |s| {
            &s.service_description
        });
        span_string(&mut catalog, "log_output", "Logfile output relevant for this state", |s| {
            &s.log_output
        });
        TableStateHistory {
            catalog,
            service_auth,
        }
    }
}

impl Table for TableStateHistory {
    fn name(&self) -> &'static str {
        "statehistory"
    }

    fn name_prefix(&self) -> &'static str {
        "statehist_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        let now = query.server_now();
        let (since, until) = query.int_limits("time", 0, now + 1);
        if since >= until {
            return;
        }
        let window = (until - since) as f64;
        let state_mask = query.value_mask("state");

        // Track the running state per object and close a span whenever it
        // changes. Open spans are closed at the window end.
        let mut running: HashMap<(String, String), (i64, i64, String)> = HashMap::new();
        let mut spans: Vec<StateSpan> = Vec::new();
        for entry in world.log_entries(since, until) {
            if entry.class != 1 {
                continue;
            }
            let key = (entry.host_name.clone(), entry.service_description.clone());
            let next = (entry.state, entry.time, entry.plugin_output.clone());
            if let Some((state, from, output)) = running.insert(key.clone(), next) {
                spans.push(make_span(
                    &key.0, &key.1, state, from, entry.time, window, output,
                ));
            }
        }
        for ((host, service), (state, from, output)) in running {
            spans.push(make_span(&host, &service, state, from, until, window, output));
        }
        spans.sort_by(|a, b| {
            (a.from, &a.host_name, &a.service_description)
                .cmp(&(b.from, &b.host_name, &b.service_description))
        });

        for span in &spans {
            if (0..32).contains(&span.state) && state_mask & (1 << span.state) == 0 {
                continue;
            }
            if !query.process(self, Row::StateSpan(span)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        let Row::StateSpan(span) = row else {
            return false;
        };
        let Some(contact) = user else {
            return false;
        };
        if !span.service_description.is_empty() {
            if let Some(index) = world.find_service(&span.host_name, &span.service_description) {
                return service_has_contact(
                    world,
                    self.service_auth,
                    &world.services()[index],
                    contact,
                );
            }
        }
        match world.find_host(&span.host_name) {
            Some(index) => host_has_contact(world, &world.hosts()[index], contact),
            None => true,
        }
    }
}

fn make_span(
    host: &str,
    service: &str,
    state: i64,
    from: i64,
    until: i64,
    window: f64,
    output: String,
) -> StateSpan {
    let duration = until - from;
    StateSpan {
        time: from,
        from,
        until,
        duration,
        duration_part: if window > 0.0 {
            duration as f64 / window
        } else {
            0.0
        },
        state,
        host_name: host.to_string(),
        service_description: service.to_string(),
        log_output: output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_arithmetic() {
        let span = make_span("h1", "", 0, 100, 160, 200.0, "OK".into());
        assert_eq!(span.duration, 60);
        assert!((span.duration_part - 0.3).abs() < 1e-12);
    }
}
