//! The timeperiods table

use std::borrow::Cow;

use crate::column::{Column, Row};
use crate::query::Query;
use crate::table::{Catalog, Table};

pub struct TableTimeperiods {
    catalog: Catalog,
}

impl TableTimeperiods {
    pub fn new() -> TableTimeperiods {
        let mut catalog = Catalog::new();
        catalog.add(Column::string("name", "The name of the timeperiod", |ctx| {
            match ctx.row {
                Row::Timeperiod(tp) => Cow::Borrowed(tp.name.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        catalog.add(Column::string("alias", "The alias of the timeperiod", |ctx| {
            match ctx.row {
                Row::Timeperiod(tp) => Cow::Borrowed(tp.alias.as_str()),
                _ => Cow::Borrowed(""),
            }
        }));
        catalog.add(Column::int(
            "in",
            "Wether we are currently in this period (0/1)",
            |ctx| match ctx.row {
                Row::Timeperiod(tp) => i64::from(
                    ctx.world
                        .timeperiod_active(&tp.name, ctx.now + ctx.timezone_offset),
                ),
                _ => 0,
            },
        ));
        TableTimeperiods { catalog }
    }
}

impl Default for TableTimeperiods {
    fn default() -> Self {
        TableTimeperiods::new()
    }
}

impl Table for TableTimeperiods {
    fn name(&self) -> &'static str {
        "timeperiods"
    }

    fn name_prefix(&self) -> &'static str {
        "timeperiod_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        let world = query.world();
        for timeperiod in world.timeperiods() {
            if !query.process(self, Row::Timeperiod(timeperiod)) {
                return;
            }
        }
    }
}
