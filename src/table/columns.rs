//! The columns metatable
//!
//! Lists every column of every table, including its own. Rows are
//! materialised at engine construction since catalogues never change.

use std::borrow::Cow;

use crate::column::{Column, ColumnMetaRow, Row};
use crate::query::Query;
use crate::table::{Catalog, Table};

pub struct TableColumns {
    catalog: Catalog,
    rows: Vec<ColumnMetaRow>,
}

fn meta<'a>(row: Row<'a>) -> Option<&'a ColumnMetaRow> {
    match row {
        Row::ColumnMeta(m) => Some(m),
        _ => None,
    }
}

fn make_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add(Column::string("table", "The name of the table", |ctx| {
        meta(ctx.row)
            .map(|m| Cow::Borrowed(m.table.as_str()))
            .unwrap_or_default()
    }));
    catalog.add(Column::string(
        "name",
        "The name of the column within the table",
        |ctx| {
            meta(ctx.row)
                .map(|m| Cow::Borrowed(m.name.as_str()))
                .unwrap_or_default()
        },
    ));
    catalog.add(Column::string(
        "description",
        "A description of the column",
        |ctx| {
            meta(ctx.row)
                .map(|m| Cow::Borrowed(m.description.as_str()))
                .unwrap_or_default()
        },
    ));
    catalog.add(Column::string(
        "type",
        "The data type of the column (int, float, string, list)",
        |ctx| {
            meta(ctx.row)
                .map(|m| Cow::Borrowed(m.ctype.as_str()))
                .unwrap_or_default()
        },
    ));
    catalog
}

impl TableColumns {
    /// Build over the already-registered tables; our own columns are
    /// listed too.
    pub fn new(tables: &[Box<dyn Table>]) -> TableColumns {
        let catalog = make_catalog();
        let mut rows = Vec::new();
        let mut describe = |table_name: &str, catalog: &Catalog| {
            for column in catalog.columns() {
                rows.push(ColumnMetaRow {
                    table: table_name.to_string(),
                    name: column.name().to_string(),
                    description: column.description().to_string(),
                    ctype: column.ctype(),
                });
            }
        };
        for table in tables {
            describe(table.name(), table.catalog());
        }
        describe("columns", &catalog);
        TableColumns { catalog, rows }
    }
}

impl Table for TableColumns {
    fn name(&self) -> &'static str {
        "columns"
    }

    fn name_prefix(&self) -> &'static str {
        "column_"
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn answer_query(&self, query: &mut Query<'_>) {
        for row in &self.rows {
            if !query.process(self, Row::ColumnMeta(row)) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    #[test]
    fn test_lists_own_columns() {
        let table = TableColumns::new(&[]);
        assert_eq!(table.rows.len(), 4);
        assert!(table.rows.iter().all(|r| r.table == "columns"));
        assert_eq!(table.rows[0].ctype, ColumnType::String);
    }
}
