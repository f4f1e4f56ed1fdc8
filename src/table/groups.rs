//! Hostgroup and servicegroup tables

use std::borrow::Cow;
use std::sync::Arc;

use crate::column::special::{self, HostListState, ServiceListState};
use crate::column::{Column, Row, RowCtx};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::table::{hostgroup_visible, servicegroup_visible, Catalog, Table};
use crate::world::{Contact, DaemonView, Hostgroup, Servicegroup};

pub struct TableHostgroups {
    catalog: Catalog,
    group_auth: AuthorizationKind,
}

fn hostgroup<'a>(ctx: &RowCtx<'a>) -> Option<&'a Hostgroup> {
    match ctx.row {
        Row::Hostgroup(g) => Some(g),
        _ => None,
    }
}

fn hg_string(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    f: for<'g> fn(&'g Hostgroup) -> &'g str,
) {
    catalog.add(Column::string(name, description, move |ctx| {
        hostgroup(ctx)
            .map(|g| Cow::Borrowed(f(g)))
            .unwrap_or(Cow::Borrowed(""))
    }));
}

/// Rollup over the hosts of the group.
fn hg_host_rollup(catalog: &mut Catalog, name: &str, description: &str, which: HostListState) {
    catalog.add(Column::int(name, description, move |ctx| {
        match hostgroup(ctx) {
            Some(g) => special::host_list_state(
                g.members.iter().map(|&i| &ctx.world.hosts()[i]),
                which,
            ),
            None => 0,
        }
    }));
}

/// Rollup over all services of all member hosts.
fn hg_service_rollup(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    which: ServiceListState,
) {
    catalog.add(Column::int(name, description, move |ctx| {
        match hostgroup(ctx) {
            Some(g) => special::service_list_state(
                g.members.iter().flat_map(|&i| {
                    ctx.world.hosts()[i]
                        .services
                        .iter()
                        .map(|&s| &ctx.world.services()[s])
                }),
                which,
            ),
            None => 0,
        }
    }));
}

impl TableHostgroups {
    pub fn new(group_auth: AuthorizationKind) -> TableHostgroups {
        let mut catalog = Catalog::new();
        hg_string(&mut catalog, "name", "Name of the hostgroup", |g| &g.name);
        hg_string(&mut catalog, "alias", "An alias of the hostgroup", |g| &g.alias);
        hg_string(&mut catalog, "notes", "Optional notes to the hostgroup", |g| &g.notes);
        hg_string(
            &mut catalog,
            "notes_url",
            "An optional URL with further information about the hostgroup",
            |g| &g.notes_url,
        );
        hg_string(
            &mut catalog,
            "action_url",
            "An optional URL to custom actions or information about the hostgroup",
            |g| &g.action_url,
        );
        catalog.add(Column::list(
            "members",
            "A list of all host names that are members of the hostgroup",
            |ctx| match hostgroup(ctx) {
                Some(g) => g
                    .members
                    .iter()
                    .map(|&i| Cow::Borrowed(ctx.world.hosts()[i].name.as_str()))
                    .collect(),
                None => Vec::new(),
            },
        ));

        hg_host_rollup(&mut catalog, "num_hosts", "The total number of hosts in the group", HostListState::Num);
        hg_host_rollup(
            &mut catalog,
            "num_hosts_pending",
            "The number of hosts in the group that are pending",
            HostListState::NumPending,
        );
        hg_host_rollup(&mut catalog, "num_hosts_up", "The number of hosts in the group that are up", HostListState::NumUp);
        hg_host_rollup(
            &mut catalog,
            "num_hosts_down",
            "The number of hosts in the group that are down",
            HostListState::NumDown,
        );
        hg_host_rollup(
            &mut catalog,
            "num_hosts_unreach",
            "The number of hosts in the group that are unreachable",
            HostListState::NumUnreach,
        );
        hg_host_rollup(
            &mut catalog,
            "worst_host_state",
            "The worst state of all of the groups' hosts (UP <= UNREACHABLE <= DOWN)",
            HostListState::WorstState,
        );

        hg_service_rollup(&mut catalog, "num_services", "The total number of services of hosts in this group", ServiceListState::Num);
        hg_service_rollup(
            &mut catalog,
            "num_services_pending",
            "The total number of services with the state Pending of hosts in this group",
            ServiceListState::NumPending,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_ok",
            "The total number of services with the state OK of hosts in this group",
            ServiceListState::NumOk,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_warn",
            "The total number of services with the state WARN of hosts in this group",
            ServiceListState::NumWarn,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_crit",
            "The total number of services with the state CRIT of hosts in this group",
            ServiceListState::NumCrit,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_unknown",
            "The total number of services with the state UNKNOWN of hosts in this group",
            ServiceListState::NumUnknown,
        );
        hg_service_rollup(
            &mut catalog,
            "worst_service_state",
            "The worst state of all services that belong to a host of this group (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListState::WorstState,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_hard_ok",
            "The total number of services with the state OK of hosts in this group",
            ServiceListState::NumHardOk,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_hard_warn",
            "The total number of services with the state WARN of hosts in this group",
            ServiceListState::NumHardWarn,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_hard_crit",
            "The total number of services with the state CRIT of hosts in this group",
            ServiceListState::NumHardCrit,
        );
        hg_service_rollup(
            &mut catalog,
            "num_services_hard_unknown",
            "The total number of services with the state UNKNOWN of hosts in this group",
            ServiceListState::NumHardUnknown,
        );
        hg_service_rollup(
            &mut catalog,
            "worst_service_hard_state",
            "The worst state of all services that belong to a host of this group (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListState::WorstHardState,
        );

        TableHostgroups {
            catalog,
            group_auth,
        }
    }
}

impl Table for TableHostgroups {
    fn name(&self) -> &'static str {
        "hostgroups"
    }

    fn name_prefix(&self) -> &'static str {
        "hostgroup_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for group in world.hostgroups() {
            if !query.process(self, Row::Hostgroup(group)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        match (user, row) {
            (Some(contact), Row::Hostgroup(group)) => {
                hostgroup_visible(world, self.group_auth, &group.members, contact)
            }
            _ => false,
        }
    }
}

pub struct TableServicegroups {
    catalog: Catalog,
    group_auth: AuthorizationKind,
    service_auth: AuthorizationKind,
}

fn servicegroup<'a>(ctx: &RowCtx<'a>) -> Option<&'a Servicegroup> {
    match ctx.row {
        Row::Servicegroup(g) => Some(g),
        _ => None,
    }
}

fn sg_string(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    f: for<'g> fn(&'g Servicegroup) -> &'g str,
) {
    catalog.add(Column::string(name, description, move |ctx| {
        servicegroup(ctx)
            .map(|g| Cow::Borrowed(f(g)))
            .unwrap_or(Cow::Borrowed(""))
    }));
}

fn sg_rollup(catalog: &mut Catalog, name: &str, description: &str, which: ServiceListState) {
    catalog.add(Column::int(name, description, move |ctx| {
        match servicegroup(ctx) {
            Some(g) => special::service_list_state(
                g.members.iter().map(|&i| &ctx.world.services()[i]),
                which,
            ),
            None => 0,
        }
    }));
}

impl TableServicegroups {
    pub fn new(
        group_auth: AuthorizationKind,
        service_auth: AuthorizationKind,
    ) -> TableServicegroups {
        let mut catalog = Catalog::new();
        sg_string(&mut catalog, "name", "The name of the service group", |g| &g.name);
        sg_string(&mut catalog, "alias", "An alias of the service group", |g| &g.alias);
        sg_string(&mut catalog, "notes", "Optional additional notes about the service group", |g| {
            &g.notes
        });
        sg_string(
            &mut catalog,
            "notes_url",
            "An optional URL to further notes on the service group",
            |g| &g.notes_url,
        );
        sg_string(
            &mut catalog,
            "action_url",
            "An optional URL to custom notes or actions on the service group",
            |g| &g.action_url,
        );
        catalog.add(Column::host_service_list(
            "members",
            "A list of all members of the service group as host/service pairs",
            |ctx| match servicegroup(ctx) {
                Some(g) => g
                    .members
                    .iter()
                    .map(|&i| {
                        let service = &ctx.world.services()[i];
                        (
                            Cow::Borrowed(ctx.world.hosts()[service.host].name.as_str()),
                            Cow::Borrowed(service.description.as_str()),
                        )
                    })
                    .collect(),
                None => Vec::new(),
            },
        ));

        sg_rollup(&mut catalog, "num_services", "The total number of services in the group", ServiceListState::Num);
        sg_rollup(
            &mut catalog,
            "num_services_pending",
            "The number of services in the group that are pending",
            ServiceListState::NumPending,
        );
        sg_rollup(&mut catalog, "num_services_ok", "The number of services in the group that are OK", ServiceListState::NumOk);
        sg_rollup(
            &mut catalog,
            "num_services_warn",
            "The number of services in the group that are WARN",
            ServiceListState::NumWarn,
        );
        sg_rollup(
            &mut catalog,
            "num_services_crit",
            "The number of services in the group that are CRIT",
            ServiceListState::NumCrit,
        );
        sg_rollup(
            &mut catalog,
            "num_services_unknown",
            "The number of services in the group that are UNKNOWN",
            ServiceListState::NumUnknown,
        );
        sg_rollup(
            &mut catalog,
            "worst_service_state",
            "The worst soft state of all of the groups services (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListState::WorstState,
        );
        sg_rollup(
            &mut catalog,
            "num_services_hard_ok",
            "The number of services in the group that are OK",
            ServiceListState::NumHardOk,
        );
        sg_rollup(
            &mut catalog,
            "num_services_hard_warn",
            "The number of services in the group that are WARN",
            ServiceListState::NumHardWarn,
        );
        sg_rollup(
            &mut catalog,
            "num_services_hard_crit",
            "The number of services in the group that are CRIT",
            ServiceListState::NumHardCrit,
        );
        sg_rollup(
            &mut catalog,
            "num_services_hard_unknown",
            "The number of services in the group that are UNKNOWN",
            ServiceListState::NumHardUnknown,
        );
        sg_rollup(
            &mut catalog,
            "worst_service_hard_state",
            "The worst hard state of all of the groups services (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListState::WorstHardState,
        );

        TableServicegroups {
            catalog,
            group_auth,
            service_auth,
        }
    }
}

impl Table for TableServicegroups {
    fn name(&self) -> &'static str {
        "servicegroups"
    }

    fn name_prefix(&self) -> &'static str {
        "servicegroup_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for group in world.servicegroups() {
            if !query.process(self, Row::Servicegroup(group)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        match (user, row) {
            (Some(contact), Row::Servicegroup(group)) => servicegroup_visible(
                world,
                self.group_auth,
                self.service_auth,
                &group.members,
                contact,
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostgroup_columns() {
        let table = TableHostgroups::new(AuthorizationKind::Strict);
        for name in ["name", "members", "num_hosts_down", "worst_service_state"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
    }

    #[test]
    fn test_servicegroup_columns() {
        let table =
            TableServicegroups::new(AuthorizationKind::Strict, AuthorizationKind::Loose);
        for name in ["name", "members", "num_services_crit"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
    }
}
