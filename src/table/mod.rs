//! Virtual tables
//!
//! One module per table family. A table owns the column catalogue for its
//! row type and drives the scan in `answer_query`, pushing every candidate
//! row through the query. Scan order follows the daemon's internal storage
//! order.

mod columns;
mod commands;
mod contacts;
mod downtimes;
mod eventconsole;
mod groups;
mod hosts;
mod log;
mod services;
mod statehistory;
mod status;
mod timeperiods;

pub use columns::TableColumns;
pub use commands::TableCommands;
pub use contacts::{TableContactgroups, TableContacts};
pub use downtimes::{TableComments, TableDowntimes};
pub use eventconsole::TableEventConsole;
pub use groups::{TableHostgroups, TableServicegroups};
pub use hosts::TableHosts;
pub use log::TableLog;
pub use statehistory::TableStateHistory;
pub use services::TableServices;
pub use status::{Counters, TableStatus};
pub use timeperiods::TableTimeperiods;

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::{Column, Row};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::world::{Contact, DaemonView, Host, Service};

/// Column set of one table, with name lookup.
#[derive(Default)]
pub struct Catalog {
    columns: Vec<Arc<Column>>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    pub fn add(&mut self, column: Arc<Column>) {
        let previous = self
            .by_name
            .insert(column.name().to_string(), self.columns.len());
        debug_assert!(previous.is_none(), "duplicate column {}", column.name());
        self.columns.push(column);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Column>> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }
}

/// One virtual table: a catalogue plus a scan procedure.
pub trait Table: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prefix clients may leave on column names, e.g. `host_` on `hosts`.
    fn name_prefix(&self) -> &'static str {
        ""
    }

    fn catalog(&self) -> &Catalog;

    fn column(&self, name: &str) -> Option<Arc<Column>> {
        let catalog = self.catalog();
        if let Some(column) = catalog.get(name) {
            return Some(Arc::clone(column));
        }
        let prefix = self.name_prefix();
        if !prefix.is_empty() {
            if let Some(stripped) = name.strip_prefix(prefix) {
                if let Some(column) = catalog.get(stripped) {
                    return Some(Arc::clone(column));
                }
            }
        }
        None
    }

    /// Iterate candidate rows and feed them to the query until it says
    /// stop. Tables with an index consult the query's filter first.
    fn answer_query(&self, query: &mut Query<'_>);

    /// Per-row access control. `user` is `None` when an `AuthUser` header
    /// named an unknown contact, which must not see auth-guarded rows.
    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        let _ = (world, user, row);
        true
    }

    /// Resolve a `WaitObject` designator to a row of this table.
    fn find_wait_object<'w>(&self, world: &'w dyn DaemonView, id: &str) -> Option<Row<'w>> {
        let _ = (world, id);
        None
    }
}

/// Whether the contact is attached to the host, directly or through one of
/// its contactgroups.
pub(crate) fn host_has_contact(world: &dyn DaemonView, host: &Host, contact: &Contact) -> bool {
    host.contacts.iter().any(|c| *c == contact.name)
        || host
            .contact_groups
            .iter()
            .any(|g| world.is_member_of_contactgroup(g, contact))
}

pub(crate) fn service_has_contact(
    world: &dyn DaemonView,
    mode: AuthorizationKind,
    service: &Service,
    contact: &Contact,
) -> bool {
    service.contacts.iter().any(|c| *c == contact.name)
        || service
            .contact_groups
            .iter()
            .any(|g| world.is_member_of_contactgroup(g, contact))
        || (mode == AuthorizationKind::Loose
            && host_has_contact(world, &world.hosts()[service.host], contact))
}

/// Group-level access: `Loose` grants the group if any member is visible,
/// `Strict` requires all of them.
pub(crate) fn hostgroup_visible(
    world: &dyn DaemonView,
    mode: AuthorizationKind,
    members: &[usize],
    contact: &Contact,
) -> bool {
    let mut check = members
        .iter()
        .map(|&i| host_has_contact(world, &world.hosts()[i], contact));
    match mode {
        AuthorizationKind::Loose => check.any(|ok| ok),
        AuthorizationKind::Strict => check.all(|ok| ok),
    }
}

pub(crate) fn servicegroup_visible(
    world: &dyn DaemonView,
    group_mode: AuthorizationKind,
    service_mode: AuthorizationKind,
    members: &[usize],
    contact: &Contact,
) -> bool {
    let mut check = members
        .iter()
        .map(|&i| service_has_contact(world, service_mode, &world.services()[i], contact));
    match group_mode {
        AuthorizationKind::Loose => check.any(|ok| ok),
        AuthorizationKind::Strict => check.all(|ok| ok),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Contactgroup, StaticWorld};

    fn world() -> StaticWorld {
        let mut world = StaticWorld::default();
        world.contacts.push(Contact {
            name: "alice".into(),
            ..Contact::default()
        });
        world.contacts.push(Contact {
            name: "bob".into(),
            ..Contact::default()
        });
        world.contactgroups.push(Contactgroup {
            name: "admins".into(),
            members: vec!["alice".into()],
            ..Contactgroup::default()
        });
        world.hosts.push(Host {
            name: "h1".into(),
            contact_groups: vec!["admins".into()],
            services: vec![0],
            ..Host::default()
        });
        world.services.push(Service {
            description: "ping".into(),
            host: 0,
            contacts: vec!["bob".into()],
            ..Service::default()
        });
        world.finish().unwrap()
    }

    #[test]
    fn test_host_contact_via_group() {
        let world = world();
        let alice = &world.contacts()[0];
        let bob = &world.contacts()[1];
        assert!(host_has_contact(&world, &world.hosts()[0], alice));
        assert!(!host_has_contact(&world, &world.hosts()[0], bob));
    }

    #[test]
    fn test_service_auth_loose_vs_strict() {
        let world = world();
        let alice = &world.contacts()[0];
        let svc = &world.services()[0];
        // alice only reaches the service through the host
        assert!(service_has_contact(
            &world,
            AuthorizationKind::Loose,
            svc,
            alice
        ));
        assert!(!service_has_contact(
            &world,
            AuthorizationKind::Strict,
            svc,
            alice
        ));
    }
}
