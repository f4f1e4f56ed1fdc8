//! Contact and contactgroup tables

use std::borrow::Cow;

use crate::column::{special, Column, Row, RowCtx};
use crate::query::Query;
use crate::table::{Catalog, Table};
use crate::world::Contact;

pub struct TableContacts {
    catalog: Catalog,
}

fn contact<'a>(ctx: &RowCtx<'a>) -> Option<&'a Contact> {
    match ctx.row {
        Row::Contact(c) => Some(c),
        _ => None,
    }
}

fn string(
    catalog: &mut Catalog,
    name: &str,
    description: &str,
    f: for<'c> fn(&'c Contact) -> &'c str,
) {
    catalog.add(Column::string(name, description, move |ctx| {
        contact(ctx)
            .map(|c| Cow::Borrowed(f(c)))
            .unwrap_or(Cow::Borrowed(""))
    }));
}

fn int(catalog: &mut Catalog, name: &str, description: &str, f: fn(&Contact) -> i64) {
    catalog.add(Column::int(name, description, move |ctx| {
        contact(ctx).map(f).unwrap_or(0)
    }));
}

impl TableContacts {
    pub fn new() -> TableContacts {
        let mut catalog = Catalog::new();
        string(&mut catalog, "name", "The login name of the contact person", |c| &c.name);
        string(&mut catalog, "alias", "The full name of the contact", |c| &c.alias);
        string(&mut catalog, "email", "The email address of the contact", |c| &c.email);
        string(&mut catalog, "pager", "The pager address of the contact", |c| &c.pager);
        string(
            &mut catalog,
            "host_notification_period",
            "The time period in which the contact will be notified about host problems",
            |c| &c.host_notification_period,
        );
        string(
            &mut catalog,
            "service_notification_period",
            "The time period in which the contact will be notified about service problems",
            |c| &c.service_notification_period,
        );
        int(
            &mut catalog,
            "can_submit_commands",
            "Whether the contact is allowed to submit commands (0/1)",
            |c| c.can_submit_commands,
        );
        int(
            &mut catalog,
            "host_notifications_enabled",
            "Whether the contact will be notified about host problems in general (0/1)",
            |c| c.host_notifications_enabled,
        );
        int(
            &mut catalog,
            "service_notifications_enabled",
            "Whether the contact will be notified about service problems in general (0/1)",
            |c| c.service_notifications_enabled,
        );
        catalog.add(Column::int(
            "in_host_notification_period",
            "Whether the contact is currently in his/her host notification period (0/1)",
            |ctx| match contact(ctx) {
                Some(c) => special::in_timeperiod(ctx, &c.host_notification_period),
                None => 0,
            },
        ));
        catalog.add(Column::int(
            "in_service_notification_period",
            "Whether the contact is currently in his/her service notification period (0/1)",
            |ctx| match contact(ctx) {
                Some(c) => special::in_timeperiod(ctx, &c.service_notification_period),
                None => 0,
            },
        ));
        catalog.add(Column::list(
            "custom_variable_names",
            "A list of all custom variables of the contact",
            |ctx| match contact(ctx) {
                Some(c) => special::custom_variable_names(&c.custom_variables),
                None => Vec::new(),
            },
        ));
        catalog.add(Column::list(
            "custom_variable_values",
            "A list of the values of all custom variables of the contact",
            |ctx| match contact(ctx) {
                Some(c) => special::custom_variable_values(&c.custom_variables),
                None => Vec::new(),
            },
        ));
        catalog.add(Column::dict(
            "custom_variables",
            "A dictionary of the custom variables",
            |ctx| match contact(ctx) {
                Some(c) => special::custom_variables(&c.custom_variables),
                None => Vec::new(),
            },
        ));
        catalog.add(Column::attribute_list_int(
            "modified_attributes",
            "A bitmask specifying which attributes have been modified",
            |ctx| contact(ctx).map(|c| c.modified_attributes).unwrap_or(0),
        ));
        catalog.add(Column::attribute_list(
            "modified_attributes_list",
            "A list of all modified attributes",
            |ctx| contact(ctx).map(|c| c.modified_attributes).unwrap_or(0),
        ));
        TableContacts { catalog }
    }
}

impl Table for TableContacts {
    fn name(&self) -> &'static str {
        "contacts"
    }

    fn name_prefix(&self) -> &'static str {
        "contact_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for contact in world.contacts() {
            if !query.process(self, Row::Contact(contact)) {
                return;
            }
        }
    }
}

pub struct TableContactgroups {
    catalog: Catalog,
}

impl TableContactgroups {
    pub fn new() -> TableContactgroups {
        let mut catalog = Catalog::new();
        catalog.add(Column::string("name", "The name of the contactgroup", |ctx| {
            match ctx.row {
                Row::Contactgroup(g) => Cow::Borrowed(g.name.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        catalog.add(Column::string("alias", "The alias of the contactgroup", |ctx| {
            match ctx.row {
                Row::Contactgroup(g) => Cow::Borrowed(g.alias.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        catalog.add(Column::list(
            "members",
            "A list of all members of this contactgroup",
            |ctx| match ctx.row {
                Row::Contactgroup(g) => {
                    g.members.iter().map(|m| Cow::Borrowed(m.as_str())).collect()
                }
                _ => Vec::new(),
            },
        ));
        TableContactgroups { catalog }
    }
}

impl Table for TableContactgroups {
    fn name(&self) -> &'static str {
        "contactgroups"
    }

    fn name_prefix(&self) -> &'static str {
        "contactgroup_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for group in world.contactgroups() {
            if !query.process(self, Row::Contactgroup(group)) {
                return;
            }
        }
    }
}

impl Default for TableContacts {
    fn default() -> Self {
        TableContacts::new()
    }
}

impl Default for TableContactgroups {
    fn default() -> Self {
        TableContactgroups::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_columns() {
        let table = TableContacts::new();
        for name in ["name", "email", "in_host_notification_period", "custom_variables"] {
            assert!(table.column(name).is_some(), "missing column {}", name);
        }
    }
}
