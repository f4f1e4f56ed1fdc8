//! Downtime and comment tables
//!
//! Both join the owning host/service column families through getters, so
//! `Filter: host_name = ...` works the same as on the hosts table.

use std::sync::Arc;

use crate::column::{Column, Getter, Row, RowCtx};
use crate::config::AuthorizationKind;
use crate::query::Query;
use crate::table::{host_has_contact, hosts, service_has_contact, services, Catalog, Table};
use crate::world::{Comment, Contact, DaemonView, Downtime, Host, Service};

pub struct TableDowntimes {
    catalog: Catalog,
    service_auth: AuthorizationKind,
}

fn downtime_host() -> Getter<Host> {
    Arc::new(|ctx: &RowCtx<'_>| {
        ctx.row.as_downtime().map(|d| &ctx.world.hosts()[d.host])
    })
}

fn downtime_service() -> Getter<Service> {
    Arc::new(|ctx: &RowCtx<'_>| {
        ctx.row
            .as_downtime()
            .and_then(|d| d.service.map(|i| &ctx.world.services()[i]))
    })
}

fn dt_int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&Downtime) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        ctx.row.as_downtime().map(f).unwrap_or(0)
    }));
}

fn dt_time(catalog: &mut Catalog, name: &str, description: &str, f: fn(&Downtime) -> i64) {
    catalog.add(Column::time(name, description, move |ctx| {
        ctx.row.as_downtime().map(f).unwrap_or(0)
    }));
}

impl TableDowntimes {
    pub fn new(service_auth: AuthorizationKind) -> TableDowntimes {
        let mut catalog = Catalog::new();
        dt_int(&mut catalog, "id", "The id of the downtime", |d| d.id);
        catalog.add(Column::string(
            "author",
            "The contact that scheduled the downtime",
            |ctx| {
                ctx.row
                    .as_downtime()
                    .map(|d| std::borrow::Cow::Borrowed(d.author.as_str()))
                    .unwrap_or_default()
            },
        ));
        catalog.add(Column::string(
            "comment",
            "A comment text",
            |ctx| {
                ctx.row
                    .as_downtime()
                    .map(|d| std::borrow::Cow::Borrowed(d.comment.as_str()))
                    .unwrap_or_default()
            },
        ));
        dt_time(&mut catalog, "entry_time", "The time the entry was made as UNIX timestamp", |d| {
            d.entry_time
        });
        dt_time(&mut catalog, "start_time", "The start time of the downtime as UNIX timestamp", |d| {
            d.start_time
        });
        dt_time(&mut catalog, "end_time", "The end time of the downtime as UNIX timestamp", |d| {
            d.end_time
        });
        dt_int(&mut catalog, "fixed", "A 1 if the downtime is fixed, a 0 if it is flexible", |d| {
            d.fixed
        });
        dt_int(&mut catalog, "duration", "The duration of the downtime in seconds", |d| {
            d.duration
        });
        dt_int(
            &mut catalog,
            "triggered_by",
            "The id of the downtime this downtime was triggered by or 0 if it was not triggered by another downtime",
            |d| d.triggered_by,
        );
        dt_int(
            &mut catalog,
            "is_service",
            "0, if this entry is for a host, 1 if it is for a service",
            |d| i64::from(d.service.is_some()),
        );
        hosts::add_columns(&mut catalog, "host_", downtime_host());
        services::add_columns(&mut catalog, "service_", downtime_service(), false);
        TableDowntimes {
            catalog,
            service_auth,
        }
    }
}

impl Table for TableDowntimes {
    fn name(&self) -> &'static str {
        "downtimes"
    }

    fn name_prefix(&self) -> &'static str {
        "downtime_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for downtime in world.downtimes() {
            if !query.process(self, Row::Downtime(downtime)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        let (Some(contact), Some(downtime)) = (user, row.as_downtime()) else {
            return false;
        };
        match downtime.service {
            Some(service) => service_has_contact(
                world,
                self.service_auth,
                &world.services()[service],
                contact,
            ),
            None => host_has_contact(world, &world.hosts()[downtime.host], contact),
        }
    }
}

pub struct TableComments {
    catalog: Catalog,
    service_auth: AuthorizationKind,
}

fn comment_host() -> Getter<Host> {
    Arc::new(|ctx: &RowCtx<'_>| ctx.row.as_comment().map(|c| &ctx.world.hosts()[c.host]))
}

fn comment_service() -> Getter<Service> {
    Arc::new(|ctx: &RowCtx<'_>| {
        ctx.row
            .as_comment()
            .and_then(|c| c.service.map(|i| &ctx.world.services()[i]))
    })
}

fn cm_int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&Comment) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        ctx.row.as_comment().map(f).unwrap_or(0)
    }));
}

fn cm_time(catalog: &mut Catalog, name: &str, description: &str, f: fn(&Comment) -> i64) {
    catalog.add(Column::time(name, description, move |ctx| {
        ctx.row.as_comment().map(f).unwrap_or(0)
    }));
}

impl TableComments {
    pub fn new(service_auth: AuthorizationKind) -> TableComments {
        let mut catalog = Catalog::new();
        cm_int(&mut catalog, "id", "The id of the comment", |c| c.id);
        catalog.add(Column::string(
            "author",
            "The contact that entered the comment",
            |ctx| {
                ctx.row
                    .as_comment()
                    .map(|c| std::borrow::Cow::Borrowed(c.author.as_str()))
                    .unwrap_or_default()
            },
        ));
        catalog.add(Column::string(
            "comment",
            "A comment text",
            |ctx| {
                ctx.row
                    .as_comment()
                    .map(|c| std::borrow::Cow::Borrowed(c.comment.as_str()))
                    .unwrap_or_default()
            },
        ));
        cm_time(&mut catalog, "entry_time", "The time the entry was made as UNIX timestamp", |c| {
            c.entry_time
        });
        cm_int(
            &mut catalog,
            "entry_type",
            "The type of the comment: 1 is user, 2 is downtime, 3 is flap and 4 is acknowledgement",
            |c| c.entry_type,
        );
        cm_int(&mut catalog, "persistent", "Whether this comment is persistent (0/1)", |c| {
            c.persistent
        });
        cm_int(&mut catalog, "expires", "Whether this comment expires", |c| c.expires);
        cm_time(
            &mut catalog,
            "expire_time",
            "The time of expiry of this comment as a UNIX timestamp",
            |c| c.expire_time,
        );
        cm_int(
            &mut catalog,
            "is_service",
            "0, if this entry is for a host, 1 if it is for a service",
            |c| i64::from(c.service.is_some()),
        );
        hosts::add_columns(&mut catalog, "host_", comment_host());
        services::add_columns(&mut catalog, "service_", comment_service(), false);
        TableComments {
            catalog,
            service_auth,
        }
    }
}

impl Table for TableComments {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn name_prefix(&self) -> &'static str {
        "comment_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for comment in world.comments() {
            if !query.process(self, Row::Comment(comment)) {
                return;
            }
        }
    }

    fn is_authorized(&self, world: &dyn DaemonView, user: Option<&Contact>, row: Row<'_>) -> bool {
        let (Some(contact), Some(comment)) = (user, row.as_comment()) else {
            return false;
        };
        match comment.service {
            Some(service) => service_has_contact(
                world,
                self.service_auth,
                &world.services()[service],
                contact,
            ),
            None => host_has_contact(world, &world.hosts()[comment.host], contact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downtime_joins_host_and_service_columns() {
        let table = TableDowntimes::new(AuthorizationKind::Loose);
        assert!(table.column("id").is_some());
        assert!(table.column("host_name").is_some());
        assert!(table.column("service_description").is_some());
        // service family on downtimes must not re-add host columns
        assert!(table.column("service_host_name").is_none());
    }
}
