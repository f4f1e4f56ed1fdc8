//! The hosts table
//!
//! `add_columns` is reused by every table that can reach a host from its
//! rows (services, downtimes, comments, log, event console); the getter
//! closure replaces the pointer-offset chain such tables would otherwise
//! need per column.

use std::borrow::Cow;
use std::sync::Arc;

use crate::column::special::{self, ServiceListState};
use crate::column::{Column, Getter, Row, RowCtx};
use crate::query::Query;
use crate::table::{host_has_contact, Catalog, Table};
use crate::world::{Contact, DaemonView, Host};

pub struct TableHosts {
    catalog: Catalog,
}

impl TableHosts {
    pub fn new() -> TableHosts {
        let mut catalog = Catalog::new();
        add_columns(&mut catalog, "", Arc::new(|ctx: &RowCtx<'_>| ctx.row.as_host()));
        TableHosts { catalog }
    }
}

impl Default for TableHosts {
    fn default() -> Self {
        TableHosts::new()
    }
}

impl Table for TableHosts {
    fn name(&self) -> &'static str {
        "hosts"
    }

    fn name_prefix(&self) -> &'static str {
        "host_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        // A filter that pins the group membership lets us scan only that
        // group instead of the full host list.
        if let Some(group) = query.string_value_restriction_for("groups") {
            tracing::debug!("scanning only hostgroup '{}'", group);
            if let Some(index) = world.find_hostgroup(&group) {
                for &member in &world.hostgroups()[index].members {
                    if !query.process(self, Row::Host(&world.hosts()[member])) {
                        return;
                    }
                }
            }
            return;
        }
        for host in world.hosts() {
            if !query.process(self, Row::Host(host)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        match (user, row.as_host()) {
            (Some(contact), Some(host)) => host_has_contact(world, host, contact),
            _ => false,
        }
    }

    fn find_wait_object<'w>(&self, world: &'w dyn DaemonView, id: &str) -> Option<Row<'w>> {
        world.find_host(id).map(|i| Row::Host(&world.hosts()[i]))
    }
}

fn string(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: for<'h> fn(&'h Host) -> &'h str,
) {
    let get = Arc::clone(get);
    catalog.add(Column::string(
        format!("{}{}", prefix, name),
        description,
        move |ctx| {
            get(ctx)
                .map(|h| Cow::Borrowed(f(h)))
                .unwrap_or(Cow::Borrowed(""))
        },
    ));
}

/// Macro-expanded variant of a string field.
fn expanded(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: for<'h> fn(&'h Host) -> &'h str,
) {
    let get = Arc::clone(get);
    catalog.add(Column::string(
        format!("{}{}", prefix, name),
        description,
        move |ctx| match get(ctx) {
            Some(h) => Cow::Owned(ctx.world.expand_macros(f(h), h, None)),
            None => Cow::Borrowed(""),
        },
    ));
}

fn int(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: fn(&Host) -> i64,
) {
    let get = Arc::clone(get);
    catalog.add(Column::int(
        format!("{}{}", prefix, name),
        description,
        move |ctx| get(ctx).map(f).unwrap_or(0),
    ));
}

fn time(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: fn(&Host) -> i64,
) {
    let get = Arc::clone(get);
    catalog.add(Column::time(
        format!("{}{}", prefix, name),
        description,
        move |ctx| get(ctx).map(f).unwrap_or(0),
    ));
}

fn double(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: fn(&Host) -> f64,
) {
    let get = Arc::clone(get);
    catalog.add(Column::double(
        format!("{}{}", prefix, name),
        description,
        move |ctx| get(ctx).map(f).unwrap_or(0.0),
    ));
}

fn string_list(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    f: for<'h> fn(&'h Host) -> &'h [String],
) {
    let get = Arc::clone(get);
    catalog.add(Column::list(
        format!("{}{}", prefix, name),
        description,
        move |ctx| {
            get(ctx)
                .map(|h| f(h).iter().map(|s| Cow::Borrowed(s.as_str())).collect())
                .unwrap_or_default()
        },
    ));
}

fn service_rollup(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Host>,
    name: &str,
    description: &str,
    which: ServiceListState,
) {
    let get = Arc::clone(get);
    catalog.add(Column::int(
        format!("{}{}", prefix, name),
        description,
        move |ctx| match get(ctx) {
            Some(h) => special::service_list_state(
                h.services.iter().map(|&i| &ctx.world.services()[i]),
                which,
            ),
            None => 0,
        },
    ));
}

/// Add all host columns under `prefix`, reading through `get`.
pub(crate) fn add_columns(catalog: &mut Catalog, prefix: &str, get: Getter<Host>) {
    let g = &get;
    string(catalog, prefix, g, "name", "Host name", |h| &h.name);
    string(catalog, prefix, g, "display_name", "Optional display name of the host", |h| {
        &h.display_name
    });
    string(catalog, prefix, g, "alias", "An alias name for the host", |h| &h.alias);
    string(catalog, prefix, g, "address", "IP address", |h| &h.address);
    string(catalog, prefix, g, "check_command", "Command for active checks of this host", |h| {
        &h.check_command
    });
    expanded(
        catalog,
        prefix,
        g,
        "check_command_expanded",
        "Command for active checks of this host with macros expanded",
        |h| &h.check_command,
    );
    string(catalog, prefix, g, "event_handler", "Command used as event handler", |h| {
        &h.event_handler
    });
    string(
        catalog,
        prefix,
        g,
        "notification_period",
        "Time period in which problems of this host will be notified. If empty then notification will be always",
        |h| &h.notification_period,
    );
    string(
        catalog,
        prefix,
        g,
        "check_period",
        "Time period in which this host will be checked. If empty then the host will always be checked.",
        |h| &h.check_period,
    );
    string(catalog, prefix, g, "notes", "Optional notes for this host", |h| &h.notes);
    expanded(
        catalog,
        prefix,
        g,
        "notes_expanded",
        "The same as notes, but with the most important macros expanded",
        |h| &h.notes,
    );
    string(
        catalog,
        prefix,
        g,
        "notes_url",
        "An optional URL with further information about the host",
        |h| &h.notes_url,
    );
    expanded(
        catalog,
        prefix,
        g,
        "notes_url_expanded",
        "Same as notes_url, but with the most important macros expanded",
        |h| &h.notes_url,
    );
    string(
        catalog,
        prefix,
        g,
        "action_url",
        "An optional URL to custom actions or information about this host",
        |h| &h.action_url,
    );
    expanded(
        catalog,
        prefix,
        g,
        "action_url_expanded",
        "The same as action_url, but with the most important macros expanded",
        |h| &h.action_url,
    );
    string(catalog, prefix, g, "plugin_output", "Output of the last host check", |h| {
        &h.plugin_output
    });
    string(
        catalog,
        prefix,
        g,
        "long_plugin_output",
        "Complete output from check plugin",
        |h| &h.long_plugin_output,
    );
    string(
        catalog,
        prefix,
        g,
        "perf_data",
        "Optional performance data of the last host check",
        |h| &h.perf_data,
    );
    string(
        catalog,
        prefix,
        g,
        "icon_image",
        "The name of an image file to be used in the web pages",
        |h| &h.icon_image,
    );
    expanded(
        catalog,
        prefix,
        g,
        "icon_image_expanded",
        "The same as icon_image, but with the most important macros expanded",
        |h| &h.icon_image,
    );
    string(catalog, prefix, g, "icon_image_alt", "Alternative text for the icon_image", |h| {
        &h.icon_image_alt
    });
    string(
        catalog,
        prefix,
        g,
        "statusmap_image",
        "The name of in image file for the status map",
        |h| &h.statusmap_image,
    );

    int(catalog, prefix, g, "state", "The current state of the host (0: up, 1: down, 2: unreachable)", |h| h.state);
    int(catalog, prefix, g, "last_hard_state", "Last hard state", |h| h.last_hard_state);
    int(catalog, prefix, g, "check_type", "Type of check (0: active, 1: passive)", |h| {
        h.check_type
    });
    int(
        catalog,
        prefix,
        g,
        "has_been_checked",
        "Whether the host has already been checked (0/1)",
        |h| h.has_been_checked,
    );
    int(
        catalog,
        prefix,
        g,
        "current_attempt",
        "Number of the current check attempts",
        |h| h.current_attempt,
    );
    int(
        catalog,
        prefix,
        g,
        "max_check_attempts",
        "Max check attempts for active host checks",
        |h| h.max_check_attempts,
    );
    int(
        catalog,
        prefix,
        g,
        "state_type",
        "Type of the current state (0: soft, 1: hard)",
        |h| h.state_type,
    );
    int(
        catalog,
        prefix,
        g,
        "acknowledged",
        "Whether the current host problem has been acknowledged (0/1)",
        |h| h.acknowledged,
    );
    int(
        catalog,
        prefix,
        g,
        "acknowledgement_type",
        "Type of acknowledgement (0: none, 1: normal, 2: sticky)",
        |h| h.acknowledgement_type,
    );
    int(
        catalog,
        prefix,
        g,
        "scheduled_downtime_depth",
        "The number of downtimes this host is currently in",
        |h| h.scheduled_downtime_depth,
    );
    int(
        catalog,
        prefix,
        g,
        "current_notification_number",
        "Number of the current notification",
        |h| h.current_notification_number,
    );
    int(
        catalog,
        prefix,
        g,
        "checks_enabled",
        "Whether checks of the host are enabled (0/1)",
        |h| h.checks_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "accept_passive_checks",
        "Whether passive host checks are accepted (0/1)",
        |h| h.accept_passive_checks,
    );
    int(
        catalog,
        prefix,
        g,
        "event_handler_enabled",
        "Whether event handling is enabled (0/1)",
        |h| h.event_handler_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "notifications_enabled",
        "Whether notifications of the host are enabled (0/1)",
        |h| h.notifications_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "flap_detection_enabled",
        "Whether flap detection is enabled (0/1)",
        |h| h.flap_detection_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "process_performance_data",
        "Whether processing of performance data is enabled (0/1)",
        |h| h.process_performance_data,
    );
    int(
        catalog,
        prefix,
        g,
        "obsess_over_host",
        "The current obsess_over_host setting (0/1)",
        |h| h.obsess_over_host,
    );
    int(catalog, prefix, g, "is_flapping", "Whether the host state is flapping (0/1)", |h| {
        h.is_flapping
    });
    int(
        catalog,
        prefix,
        g,
        "is_executing",
        "is there a host check currently running (0/1)",
        |h| h.is_executing,
    );
    int(
        catalog,
        prefix,
        g,
        "total_services",
        "The total number of services of the host",
        |h| h.services.len() as i64,
    );

    time(catalog, prefix, g, "last_check", "Time of the last check (Unix timestamp)", |h| {
        h.last_check
    });
    time(catalog, prefix, g, "next_check", "Scheduled time for the next check (Unix timestamp)", |h| {
        h.next_check
    });
    time(
        catalog,
        prefix,
        g,
        "last_state_change",
        "Time of the last state change - soft or hard (Unix timestamp)",
        |h| h.last_state_change,
    );
    time(
        catalog,
        prefix,
        g,
        "last_hard_state_change",
        "Time of the last hard state change (Unix timestamp)",
        |h| h.last_hard_state_change,
    );
    time(catalog, prefix, g, "last_time_up", "The last time the host was UP (Unix timestamp)", |h| {
        h.last_time_up
    });
    time(
        catalog,
        prefix,
        g,
        "last_time_down",
        "The last time the host was DOWN (Unix timestamp)",
        |h| h.last_time_down,
    );
    time(
        catalog,
        prefix,
        g,
        "last_time_unreachable",
        "The last time the host was UNREACHABLE (Unix timestamp)",
        |h| h.last_time_unreachable,
    );
    time(
        catalog,
        prefix,
        g,
        "last_notification",
        "Time of the last notification (Unix timestamp)",
        |h| h.last_notification,
    );
    time(
        catalog,
        prefix,
        g,
        "next_notification",
        "Time of the next notification (Unix timestamp)",
        |h| h.next_notification,
    );

    double(catalog, prefix, g, "check_interval", "Number of basic interval lengths between two scheduled checks", |h| {
        h.check_interval
    });
    double(catalog, prefix, g, "retry_interval", "Number of basic interval lengths between checks when retrying after a soft error", |h| {
        h.retry_interval
    });
    double(catalog, prefix, g, "notification_interval", "Interval of periodic notification or 0 if its off", |h| {
        h.notification_interval
    });
    double(catalog, prefix, g, "latency", "Time difference between scheduled check time and actual check time", |h| {
        h.latency
    });
    double(catalog, prefix, g, "execution_time", "Time the host check needed for execution", |h| {
        h.execution_time
    });
    double(catalog, prefix, g, "percent_state_change", "Percent state change", |h| {
        h.percent_state_change
    });

    string_list(catalog, prefix, g, "parents", "The direct parents of the host", |h| &h.parents);
    string_list(catalog, prefix, g, "childs", "The direct children of the host", |h| &h.childs);
    string_list(catalog, prefix, g, "contacts", "A list of all contacts of this host", |h| {
        &h.contacts
    });
    string_list(
        catalog,
        prefix,
        g,
        "contact_groups",
        "A list of all contact groups this host is in",
        |h| &h.contact_groups,
    );
    string_list(catalog, prefix, g, "groups", "A list of all host groups this host is in", |h| {
        &h.groups
    });

    let get_services = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}services", prefix),
        "A list of all services of the host",
        move |ctx| match get_services(ctx) {
            Some(h) => h
                .services
                .iter()
                .map(|&i| Cow::Borrowed(ctx.world.services()[i].description.as_str()))
                .collect(),
            None => Vec::new(),
        },
    ));

    let get_attrs = Arc::clone(g);
    catalog.add(Column::attribute_list_int(
        format!("{}modified_attributes", prefix),
        "A bitmask specifying which attributes have been modified",
        move |ctx| get_attrs(ctx).map(|h| h.modified_attributes).unwrap_or(0),
    ));
    let get_attrs = Arc::clone(g);
    catalog.add(Column::attribute_list(
        format!("{}modified_attributes_list", prefix),
        "A list of all modified attributes",
        move |ctx| get_attrs(ctx).map(|h| h.modified_attributes).unwrap_or(0),
    ));

    let get_cv = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}custom_variable_names", prefix),
        "A list of the names of all custom variables",
        move |ctx| match get_cv(ctx) {
            Some(h) => special::custom_variable_names(&h.custom_variables),
            None => Vec::new(),
        },
    ));
    let get_cv = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}custom_variable_values", prefix),
        "A list of the values of the custom variables",
        move |ctx| match get_cv(ctx) {
            Some(h) => special::custom_variable_values(&h.custom_variables),
            None => Vec::new(),
        },
    ));
    let get_cv = Arc::clone(g);
    catalog.add(Column::dict(
        format!("{}custom_variables", prefix),
        "A dictionary of the custom variables",
        move |ctx| match get_cv(ctx) {
            Some(h) => special::custom_variables(&h.custom_variables),
            None => Vec::new(),
        },
    ));

    let get_tp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}in_check_period", prefix),
        "Whether this host is currently in its check period (0/1)",
        move |ctx| match get_tp(ctx) {
            Some(h) => special::in_timeperiod(ctx, &h.check_period),
            None => 0,
        },
    ));
    let get_tp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}in_notification_period", prefix),
        "Whether this host is currently in its notification period (0/1)",
        move |ctx| match get_tp(ctx) {
            Some(h) => special::in_timeperiod(ctx, &h.notification_period),
            None => 0,
        },
    ));

    let get_pnp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}pnpgraph_present", prefix),
        "Whether there is a PNP4Nagios graph present for this host (0/1/-1)",
        move |ctx| match get_pnp(ctx) {
            Some(h) => special::pnpgraph_present(ctx.world, &h.name, "_HOST_"),
            None => -1,
        },
    ));

    let get_inv = Arc::clone(g);
    catalog.add(Column::blob(
        format!("{}mk_inventory", prefix),
        "The file content of the Check_MK HW/SW-Inventory",
        move |ctx| match get_inv(ctx) {
            Some(h) => special::host_file_blob(ctx.world.mk_inventory_path(), &h.name, ""),
            None => Cow::Borrowed(&[]),
        },
    ));
    let get_inv = Arc::clone(g);
    catalog.add(Column::blob(
        format!("{}mk_inventory_gz", prefix),
        "The gzipped file content of the Check_MK HW/SW-Inventory",
        move |ctx| match get_inv(ctx) {
            Some(h) => special::host_file_blob(ctx.world.mk_inventory_path(), &h.name, ".gz"),
            None => Cow::Borrowed(&[]),
        },
    ));

    let get_lw = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}mk_logwatch_files", prefix),
        "This list of logfiles with problems fetched via mk_logwatch",
        move |ctx| match get_lw(ctx) {
            Some(h) => special::logwatch_files(ctx.world.logwatch_path(), &h.name),
            None => Vec::new(),
        },
    ));

    let get_dt = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}downtimes", prefix),
        "A list of the ids of all scheduled downtimes of this host",
        move |ctx| match get_dt(ctx) {
            Some(h) => ctx
                .world
                .downtimes()
                .iter()
                .filter(|d| {
                    d.service.is_none() && std::ptr::eq(&ctx.world.hosts()[d.host], h)
                })
                .map(|d| Cow::Owned(d.id.to_string()))
                .collect(),
            None => Vec::new(),
        },
    ));
    let get_cm = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}comments", prefix),
        "A list of the ids of all comments of this host",
        move |ctx| match get_cm(ctx) {
            Some(h) => ctx
                .world
                .comments()
                .iter()
                .filter(|c| {
                    c.service.is_none() && std::ptr::eq(&ctx.world.hosts()[c.host], h)
                })
                .map(|c| Cow::Owned(c.id.to_string()))
                .collect(),
            None => Vec::new(),
        },
    ));

    service_rollup(catalog, prefix, g, "num_services", "The total number of services of the host", ServiceListState::Num);
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_pending",
        "The number of the host's services which have not been checked yet (pending)",
        ServiceListState::NumPending,
    );
    service_rollup(catalog, prefix, g, "num_services_ok", "The number of the host's services with the state OK", ServiceListState::NumOk);
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_warn",
        "The number of the host's services with the state WARN",
        ServiceListState::NumWarn,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_crit",
        "The number of the host's services with the state CRIT",
        ServiceListState::NumCrit,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_unknown",
        "The number of the host's services with the state UNKNOWN",
        ServiceListState::NumUnknown,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "worst_service_state",
        "The worst state of all of the host's services (OK <= WARN <= UNKNOWN <= CRIT)",
        ServiceListState::WorstState,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_hard_ok",
        "The number of the host's services with the hard state OK",
        ServiceListState::NumHardOk,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_hard_warn",
        "The number of the host's services with the hard state WARN",
        ServiceListState::NumHardWarn,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_hard_crit",
        "The number of the host's services with the hard state CRIT",
        ServiceListState::NumHardCrit,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "num_services_hard_unknown",
        "The number of the host's services with the hard state UNKNOWN",
        ServiceListState::NumHardUnknown,
    );
    service_rollup(
        catalog,
        prefix,
        g,
        "worst_service_hard_state",
        "The worst hard state of all of the host's services (OK <= WARN <= UNKNOWN <= CRIT)",
        ServiceListState::WorstHardState,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_core_columns() {
        let table = TableHosts::new();
        for name in ["name", "state", "groups", "custom_variables", "num_services_crit"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
        // prefix stripping
        assert!(table.column("host_name").is_some());
        assert!(table.column("bogus").is_none());
    }

    #[test]
    fn test_unique_column_names() {
        let table = TableHosts::new();
        let mut seen = std::collections::HashSet::new();
        for column in table.catalog().columns() {
            assert!(seen.insert(column.name().to_string()));
        }
    }
}
