//! The services table
//!
//! Shares the column-family pattern with hosts: `add_columns` is reused by
//! downtimes, comments and the log table. When `with_host_columns` is set
//! the full host column family is attached under an additional `host_`
//! prefix, reached through the service's host reference.

use std::borrow::Cow;
use std::sync::Arc;

use crate::column::special;
use crate::column::{Column, Getter, Row, RowCtx};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::table::{hosts, service_has_contact, Catalog, Table};
use crate::world::{Contact, DaemonView, Service};

pub struct TableServices {
    catalog: Catalog,
    service_auth: AuthorizationKind,
}

impl TableServices {
    pub fn new(service_auth: AuthorizationKind) -> TableServices {
        let mut catalog = Catalog::new();
        add_columns(
            &mut catalog,
            "",
            Arc::new(|ctx: &RowCtx<'_>| ctx.row.as_service()),
            true,
        );
        TableServices {
            catalog,
            service_auth,
        }
    }
}

impl Table for TableServices {
    fn name(&self) -> &'static str {
        "services"
    }

    fn name_prefix(&self) -> &'static str {
        "service_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        // Pinned host or servicegroup filters shrink the scan.
        if let Some(host) = query.string_value_restriction_for("host_name") {
            tracing::debug!("scanning only services of host '{}'", host);
            if let Some(index) = world.find_host(&host) {
                for &member in &world.hosts()[index].services {
                    if !query.process(self, Row::Service(&world.services()[member])) {
                        return;
                    }
                }
            }
            return;
        }
        if let Some(group) = query.string_value_restriction_for("groups") {
            tracing::debug!("scanning only servicegroup '{}'", group);
            if let Some(index) = world.find_servicegroup(&group) {
                for &member in &world.servicegroups()[index].members {
                    if !query.process(self, Row::Service(&world.services()[member])) {
                        return;
                    }
                }
            }
            return;
        }
        for service in world.services() {
            if !query.process(self, Row::Service(service)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        match (user, row.as_service()) {
            (Some(contact), Some(service)) => {
                service_has_contact(world, self.service_auth, service, contact)
            }
            _ => false,
        }
    }

    /// Designator is `host;description` or `host description`.
    fn find_wait_object<'w>(&self, world: &'w dyn DaemonView, id: &str) -> Option<Row<'w>> {
        let (host, description) = id
            .split_once(';')
            .or_else(|| id.split_once(char::is_whitespace))?;
        world
            .find_service(host.trim(), description.trim())
            .map(|i| Row::Service(&world.services()[i]))
    }
}

fn string(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: for<'s> fn(&'s Service) -> &'s str,
) {
    let get = Arc::clone(get);
    catalog.add(Column::string(
        format!("{}{}", prefix, name),
        description,
        move |ctx| {
            get(ctx)
                .map(|s| Cow::Borrowed(f(s)))
                .unwrap_or(Cow::Borrowed(""))
        },
    ));
}

fn expanded(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: for<'s> fn(&'s Service) -> &'s str,
) {
    let get = Arc::clone(get);
    catalog.add(Column::string(
        format!("{}{}", prefix, name),
        description,
        move |ctx| match get(ctx) {
            Some(s) => Cow::Owned(ctx.world.expand_macros(
                f(s),
                &ctx.world.hosts()[s.host],
                Some(s),
            )),
            None => Cow::Borrowed(""),
        },
    ));
}

fn int(
    catalog: &mut Catalog,
    prefix: &str,
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: fn(&Service) -> i64,
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
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: fn(&Service) -> i64,
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
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: fn(&Service) -> f64,
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
    get: &Getter<Service>,
    name: &str,
    description: &str,
    f: for<'s> fn(&'s Service) -> &'s [String],
) {
    let get = Arc::clone(get);
    catalog.add(Column::list(
        format!("{}{}", prefix, name),
        description,
        move |ctx| {
            get(ctx)
                .map(|s| f(s).iter().map(|v| Cow::Borrowed(v.as_str())).collect())
                .unwrap_or_default()
        },
    ));
}

/// Add all service columns under `prefix`, reading through `get`.
pub(crate) fn add_columns(
    catalog: &mut Catalog,
    prefix: &str,
    get: Getter<Service>,
    with_host_columns: bool,
) {
    if with_host_columns {
        let through = Arc::clone(&get);
        hosts::add_columns(
            catalog,
            &format!("{}host_", prefix),
            Arc::new(move |ctx: &RowCtx<'_>| {
                through(ctx).map(|s| &ctx.world.hosts()[s.host])
            }),
        );
    }

    let g = &get;
    string(catalog, prefix, g, "description", "Description of the service (also used as key)", |s| {
        &s.description
    });
    string(
        catalog,
        prefix,
        g,
        "display_name",
        "An optional display name of the service",
        |s| &s.display_name,
    );
    string(catalog, prefix, g, "check_command", "Command used for active checks", |s| {
        &s.check_command
    });
    expanded(
        catalog,
        prefix,
        g,
        "check_command_expanded",
        "Command used for active checks with the macros expanded",
        |s| &s.check_command,
    );
    string(catalog, prefix, g, "event_handler", "Command used as event handler", |s| {
        &s.event_handler
    });
    string(
        catalog,
        prefix,
        g,
        "notification_period",
        "The name of the notification period of the service. It this is empty, service problems are always notified.",
        |s| &s.notification_period,
    );
    string(
        catalog,
        prefix,
        g,
        "check_period",
        "The name of the check period of the service. If this is empty, the service is always checked.",
        |s| &s.check_period,
    );
    string(catalog, prefix, g, "notes", "Optional notes about the service", |s| &s.notes);
    expanded(
        catalog,
        prefix,
        g,
        "notes_expanded",
        "The notes with (the most important) macros expanded",
        |s| &s.notes,
    );
    string(catalog, prefix, g, "notes_url", "An optional URL for additional notes about the service", |s| {
        &s.notes_url
    });
    expanded(
        catalog,
        prefix,
        g,
        "notes_url_expanded",
        "The notes_url with (the most important) macros expanded",
        |s| &s.notes_url,
    );
    string(
        catalog,
        prefix,
        g,
        "action_url",
        "An optional URL for actions or custom information about the service",
        |s| &s.action_url,
    );
    expanded(
        catalog,
        prefix,
        g,
        "action_url_expanded",
        "The action_url with (the most important) macros expanded",
        |s| &s.action_url,
    );
    string(catalog, prefix, g, "plugin_output", "Output of the last check plugin", |s| {
        &s.plugin_output
    });
    string(
        catalog,
        prefix,
        g,
        "long_plugin_output",
        "Unabbreviated output of the last check plugin",
        |s| &s.long_plugin_output,
    );
    string(catalog, prefix, g, "perf_data", "Performance data of the last check plugin", |s| {
        &s.perf_data
    });
    string(
        catalog,
        prefix,
        g,
        "icon_image",
        "The name of an image to be used as icon in the web interface",
        |s| &s.icon_image,
    );
    expanded(
        catalog,
        prefix,
        g,
        "icon_image_expanded",
        "The same as icon_image, but with the most important macros expanded",
        |s| &s.icon_image,
    );
    string(catalog, prefix, g, "icon_image_alt", "An alternative text for the icon_image for browsers not displaying icons", |s| {
        &s.icon_image_alt
    });

    int(catalog, prefix, g, "state", "The current state of the service (0: OK, 1: WARN, 2: CRITICAL, 3: UNKNOWN)", |s| {
        s.state
    });
    int(catalog, prefix, g, "last_hard_state", "The last hard state of the service", |s| {
        s.last_hard_state
    });
    int(catalog, prefix, g, "check_type", "The type of the last check (0: active, 1: passive)", |s| {
        s.check_type
    });
    int(
        catalog,
        prefix,
        g,
        "has_been_checked",
        "Whether the service already has been checked (0/1)",
        |s| s.has_been_checked,
    );
    int(
        catalog,
        prefix,
        g,
        "current_attempt",
        "The number of the current check attempt",
        |s| s.current_attempt,
    );
    int(
        catalog,
        prefix,
        g,
        "max_check_attempts",
        "The maximum number of check attempts",
        |s| s.max_check_attempts,
    );
    int(
        catalog,
        prefix,
        g,
        "state_type",
        "The type of the current state (0: soft, 1: hard)",
        |s| s.state_type,
    );
    int(
        catalog,
        prefix,
        g,
        "acknowledged",
        "Whether the current service problem has been acknowledged (0/1)",
        |s| s.acknowledged,
    );
    int(
        catalog,
        prefix,
        g,
        "acknowledgement_type",
        "The type of the acknowledgement (0: none, 1: normal, 2: sticky)",
        |s| s.acknowledgement_type,
    );
    int(
        catalog,
        prefix,
        g,
        "scheduled_downtime_depth",
        "The number of scheduled downtimes the service is currently in",
        |s| s.scheduled_downtime_depth,
    );
    int(
        catalog,
        prefix,
        g,
        "current_notification_number",
        "The number of the current notification",
        |s| s.current_notification_number,
    );
    int(
        catalog,
        prefix,
        g,
        "checks_enabled",
        "Whether active checks are enabled for the service (0/1)",
        |s| s.checks_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "accept_passive_checks",
        "Whether the service accepts passive checks (0/1)",
        |s| s.accept_passive_checks,
    );
    int(
        catalog,
        prefix,
        g,
        "event_handler_enabled",
        "Whether and event handler is activated for the service (0/1)",
        |s| s.event_handler_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "notifications_enabled",
        "Whether notifications are enabled for the service (0/1)",
        |s| s.notifications_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "flap_detection_enabled",
        "Whether flap detection is enabled for the service (0/1)",
        |s| s.flap_detection_enabled,
    );
    int(
        catalog,
        prefix,
        g,
        "process_performance_data",
        "Whether processing of performance data is enabled for the service (0/1)",
        |s| s.process_performance_data,
    );
    int(
        catalog,
        prefix,
        g,
        "obsess_over_service",
        "Whether 'obsess_over_service' is enabled for the service (0/1)",
        |s| s.obsess_over_service,
    );
    int(catalog, prefix, g, "is_flapping", "Whether the service is flapping (0/1)", |s| {
        s.is_flapping
    });
    int(
        catalog,
        prefix,
        g,
        "is_executing",
        "is there a service check currently running (0/1)",
        |s| s.is_executing,
    );

    time(catalog, prefix, g, "last_check", "The time of the last check (Unix timestamp)", |s| {
        s.last_check
    });
    time(catalog, prefix, g, "next_check", "The scheduled time of the next check (Unix timestamp)", |s| {
        s.next_check
    });
    time(
        catalog,
        prefix,
        g,
        "last_state_change",
        "The time of the last state change - soft or hard (Unix timestamp)",
        |s| s.last_state_change,
    );
    time(
        catalog,
        prefix,
        g,
        "last_hard_state_change",
        "The time of the last hard state change (Unix timestamp)",
        |s| s.last_hard_state_change,
    );
    time(catalog, prefix, g, "last_time_ok", "The last time the service was OK (Unix timestamp)", |s| {
        s.last_time_ok
    });
    time(
        catalog,
        prefix,
        g,
        "last_time_warning",
        "The last time the service was in WARNING state (Unix timestamp)",
        |s| s.last_time_warning,
    );
    time(
        catalog,
        prefix,
        g,
        "last_time_critical",
        "The last time the service was CRITICAL (Unix timestamp)",
        |s| s.last_time_critical,
    );
    time(
        catalog,
        prefix,
        g,
        "last_time_unknown",
        "The last time the service was UNKNOWN (Unix timestamp)",
        |s| s.last_time_unknown,
    );
    time(
        catalog,
        prefix,
        g,
        "last_notification",
        "The time of the last notification (Unix timestamp)",
        |s| s.last_notification,
    );
    time(
        catalog,
        prefix,
        g,
        "next_notification",
        "The time of the next notification (Unix timestamp)",
        |s| s.next_notification,
    );

    double(catalog, prefix, g, "check_interval", "Number of basic interval lengths between two scheduled checks of the service", |s| {
        s.check_interval
    });
    double(catalog, prefix, g, "retry_interval", "Number of basic interval lengths between checks when retrying after a soft error", |s| {
        s.retry_interval
    });
    double(catalog, prefix, g, "notification_interval", "Interval of periodic notification or 0 if its off", |s| {
        s.notification_interval
    });
    double(catalog, prefix, g, "latency", "Time difference between scheduled check time and actual check time", |s| {
        s.latency
    });
    double(catalog, prefix, g, "execution_time", "Time the service check needed for execution", |s| {
        s.execution_time
    });
    double(catalog, prefix, g, "percent_state_change", "Percent state change", |s| {
        s.percent_state_change
    });

    string_list(catalog, prefix, g, "contacts", "A list of all contacts of the service", |s| {
        &s.contacts
    });
    string_list(
        catalog,
        prefix,
        g,
        "contact_groups",
        "A list of all contact groups this service is in",
        |s| &s.contact_groups,
    );
    string_list(
        catalog,
        prefix,
        g,
        "groups",
        "A list of all service groups the service is in",
        |s| &s.groups,
    );

    let get_attrs = Arc::clone(g);
    catalog.add(Column::attribute_list_int(
        format!("{}modified_attributes", prefix),
        "A bitmask specifying which attributes have been modified",
        move |ctx| get_attrs(ctx).map(|s| s.modified_attributes).unwrap_or(0),
    ));
    let get_attrs = Arc::clone(g);
    catalog.add(Column::attribute_list(
        format!("{}modified_attributes_list", prefix),
        "A list of all modified attributes",
        move |ctx| get_attrs(ctx).map(|s| s.modified_attributes).unwrap_or(0),
    ));

    let get_cv = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}custom_variable_names", prefix),
        "A list of the names of all custom variables of the service",
        move |ctx| match get_cv(ctx) {
            Some(s) => special::custom_variable_names(&s.custom_variables),
            None => Vec::new(),
        },
    ));
    let get_cv = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}custom_variable_values", prefix),
        "A list of the values of all custom variable of the service",
        move |ctx| match get_cv(ctx) {
            Some(s) => special::custom_variable_values(&s.custom_variables),
            None => Vec::new(),
        },
    ));
    let get_cv = Arc::clone(g);
    catalog.add(Column::dict(
        format!("{}custom_variables", prefix),
        "A dictionary of the custom variables",
        move |ctx| match get_cv(ctx) {
            Some(s) => special::custom_variables(&s.custom_variables),
            None => Vec::new(),
        },
    ));

    let get_tp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}in_check_period", prefix),
        "Whether the service is currently in its check period (0/1)",
        move |ctx| match get_tp(ctx) {
            Some(s) => special::in_timeperiod(ctx, &s.check_period),
            None => 0,
        },
    ));
    let get_tp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}in_notification_period", prefix),
        "Whether the service is currently in its notification period (0/1)",
        move |ctx| match get_tp(ctx) {
            Some(s) => special::in_timeperiod(ctx, &s.notification_period),
            None => 0,
        },
    ));

    let get_pnp = Arc::clone(g);
    catalog.add(Column::int(
        format!("{}pnpgraph_present", prefix),
        "Whether there is a PNP4Nagios graph present for this service (0/1/-1)",
        move |ctx| match get_pnp(ctx) {
            Some(s) => special::pnpgraph_present(
                ctx.world,
                &ctx.world.hosts()[s.host].name,
                &s.description,
            ),
            None => -1,
        },
    ));

    let get_dt = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}downtimes", prefix),
        "A list of all downtime ids of the service",
        move |ctx| match get_dt(ctx) {
            Some(s) => ctx
                .world
                .downtimes()
                .iter()
                .filter(|d| {
                    d.service
                        .is_some_and(|i| std::ptr::eq(&ctx.world.services()[i], s))
                })
                .map(|d| Cow::Owned(d.id.to_string()))
                .collect(),
            None => Vec::new(),
        },
    ));
    let get_cm = Arc::clone(g);
    catalog.add(Column::list(
        format!("{}comments", prefix),
        "A list of the ids of all comments of this service",
        move |ctx| match get_cm(ctx) {
            Some(s) => ctx
                .world
                .comments()
                .iter()
                .filter(|c| {
                    c.service
                        .is_some_and(|i| std::ptr::eq(&ctx.world.services()[i], s))
                })
                .map(|c| Cow::Owned(c.id.to_string()))
                .collect(),
            None => Vec::new(),
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_includes_host_family() {
        let table = TableServices::new(AuthorizationKind::Loose);
        assert!(table.column("description").is_some());
        assert!(table.column("host_name").is_some());
        assert!(table.column("host_num_services_crit").is_some());
        // prefix stripping on the service's own prefix
        assert!(table.column("service_description").is_some());
    }
}
