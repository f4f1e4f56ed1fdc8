//! The commands table

use std::borrow::Cow;

use crate::column::{Column, Row};
use crate::query::Query;
use crate::table::{Catalog, Table};

pub struct TableCommands {
    catalog: Catalog,
}

impl TableCommands {
    pub fn new() -> TableCommands {
        let mut catalog = Catalog::new();
        catalog.add(Column::string("name", "The name of the command", |ctx| {
            match ctx.row {
                Row::Command(c) => Cow::Borrowed(c.name.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        catalog.add(Column::string("line", "The shell command line", |ctx| {
            match ctx.row {
                Row::Command(c) => Cow::Borrowed(c.line.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        TableCommands { catalog }
    }
}

impl Default for TableCommands {
    fn default() -> Self {
        TableCommands::new()
    }
}

impl Table for TableCommands {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn name_prefix(&self) -> &'static str {
        "command_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for command in world.commands() {
            if !query.process(self, Row::Command(command)) {
                return;
            }
        }
    }
}
