//! Column catalogue
//!
//! A [`Column`] is a named, typed accessor over a [`Row`]. The accessor is a
//! boxed closure from a per-row context to a tagged value, which replaces
//! per-field glue code: families of columns that project a reachable
//! sub-object (host columns on the services table, host columns on event
//! rows) are generated once and bound to a getter closure that walks to the
//! sub-object, see [`Getter`].

pub mod special;

use std::borrow::Cow;
use std::sync::Arc;

use crate::world::{
    Comment, Contact, Contactgroup, Command, DaemonView, Downtime, Host, Hostgroup, LogEntry,
    Service, Servicegroup, Timeperiod,
};

/// Rendered shape of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Double,
    String,
    List,
    Time,
    Dict,
    Blob,
    Null,
}

impl ColumnType {
    /// Name used by the `columns` metatable.
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Double => "float",
            ColumnType::String => "string",
            ColumnType::List => "list",
            ColumnType::Time => "time",
            ColumnType::Dict => "dict",
            ColumnType::Blob => "blob",
            ColumnType::Null => "null",
        }
    }
}

/// How filter leaves compare against this column. Usually implied by the
/// rendered type; attribute lists render as lists but filter numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Int,
    Double,
    String,
    List,
    Time,
    Dict,
    AttributeList,
    None,
}

/// A value produced by a column accessor for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData<'a> {
    Int(i64),
    Double(f64),
    Str(Cow<'a, str>),
    List(Vec<Cow<'a, str>>),
    /// Member lists that pair a host with a service description.
    HostServiceList(Vec<(Cow<'a, str>, Cow<'a, str>)>),
    /// Unix seconds, timezone offset already applied.
    Time(i64),
    Dict(Vec<(Cow<'a, str>, Cow<'a, str>)>),
    Blob(Cow<'a, [u8]>),
    Null,
}

impl ColumnData<'_> {
    /// Deep copy with owned storage, used to keep stats group keys alive
    /// after the scan.
    pub fn into_owned(self) -> ColumnData<'static> {
        match self {
            ColumnData::Int(v) => ColumnData::Int(v),
            ColumnData::Double(v) => ColumnData::Double(v),
            ColumnData::Str(v) => ColumnData::Str(Cow::Owned(v.into_owned())),
            ColumnData::List(v) => ColumnData::List(
                v.into_iter().map(|e| Cow::Owned(e.into_owned())).collect(),
            ),
            ColumnData::HostServiceList(v) => ColumnData::HostServiceList(
                v.into_iter()
                    .map(|(h, s)| (Cow::Owned(h.into_owned()), Cow::Owned(s.into_owned())))
                    .collect(),
            ),
            ColumnData::Time(v) => ColumnData::Time(v),
            ColumnData::Dict(v) => ColumnData::Dict(
                v.into_iter()
                    .map(|(k, val)| (Cow::Owned(k.into_owned()), Cow::Owned(val.into_owned())))
                    .collect(),
            ),
            ColumnData::Blob(v) => ColumnData::Blob(Cow::Owned(v.into_owned())),
            ColumnData::Null => ColumnData::Null,
        }
    }
}

/// Row of the `columns` metatable.
#[derive(Debug, Clone)]
pub struct ColumnMetaRow {
    pub table: String,
    pub name: String,
    pub description: String,
    pub ctype: ColumnType,
}

/// Row of an event-console table: a string map plus the resolved host used
/// as authorization anchor.
#[derive(Debug, Clone, Default)]
pub struct EcRow {
    pub fields: std::collections::HashMap<String, String>,
    /// Index into [`DaemonView::hosts`], resolved from `event_host`.
    pub host: Option<usize>,
}

impl EcRow {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// State span emitted by the statehistory table.
#[derive(Debug, Clone, Default)]
pub struct StateSpan {
    pub time: i64,
    pub from: i64,
    pub until: i64,
    pub duration: i64,
    pub duration_part: f64,
    pub state: i64,
    pub host_name: String,
    pub service_description: String,
    pub log_output: String,
}

/// An opaque handle to one foreign object. Copy, valid for one scan.
#[derive(Clone, Copy)]
pub enum Row<'a> {
    Host(&'a Host),
    Service(&'a Service),
    Hostgroup(&'a Hostgroup),
    Servicegroup(&'a Servicegroup),
    Contact(&'a Contact),
    Contactgroup(&'a Contactgroup),
    Command(&'a Command),
    Timeperiod(&'a Timeperiod),
    Downtime(&'a Downtime),
    Comment(&'a Comment),
    Log(&'a LogEntry),
    StateSpan(&'a StateSpan),
    ColumnMeta(&'a ColumnMetaRow),
    Ec(&'a EcRow),
    /// The singleton row of the status table.
    Status,
}

impl<'a> Row<'a> {
    pub fn as_host(self) -> Option<&'a Host> {
        match self {
            Row::Host(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_service(self) -> Option<&'a Service> {
        match self {
            Row::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_downtime(self) -> Option<&'a Downtime> {
        match self {
            Row::Downtime(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_comment(self) -> Option<&'a Comment> {
        match self {
            Row::Comment(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_log(self) -> Option<&'a LogEntry> {
        match self {
            Row::Log(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_ec(self) -> Option<&'a EcRow> {
        match self {
            Row::Ec(e) => Some(e),
            _ => None,
        }
    }
}

/// Everything an accessor may need for one row.
pub struct RowCtx<'a> {
    pub world: &'a dyn DaemonView,
    pub row: Row<'a>,
    pub auth_user: Option<&'a Contact>,
    /// Seconds added to every time value, from the `Localtime` header.
    pub timezone_offset: i64,
    /// Wall clock at query start (server side).
    pub now: i64,
}

/// Maps a row context to the sub-object a column family reads from.
/// Returning `None` yields the column type's zero value.
pub type Getter<T> = Arc<dyn for<'a> Fn(&RowCtx<'a>) -> Option<&'a T> + Send + Sync>;

type Eval = Box<dyn for<'a> Fn(&RowCtx<'a>) -> ColumnData<'a> + Send + Sync>;
type EvalInt = Box<dyn for<'a> Fn(&RowCtx<'a>) -> i64 + Send + Sync>;

pub struct Column {
    name: String,
    description: String,
    ctype: ColumnType,
    ftype: FilterType,
    eval: Eval,
    /// Numeric shadow value for columns whose rendered form is not numeric
    /// but whose filters are (attribute lists).
    eval_int: Option<EvalInt>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        ctype: ColumnType,
        ftype: FilterType,
        eval: Eval,
    ) -> Arc<Column> {
        Arc::new(Column {
            name: name.into(),
            description: description.into(),
            ctype,
            ftype,
            eval,
            eval_int: None,
        })
    }

    pub fn int(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> i64 + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Int,
            FilterType::Int,
            Box::new(move |ctx| ColumnData::Int(f(ctx))),
        )
    }

    pub fn double(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> f64 + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Double,
            FilterType::Double,
            Box::new(move |ctx| ColumnData::Double(f(ctx))),
        )
    }

    pub fn string(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> Cow<'a, str> + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::String,
            FilterType::String,
            Box::new(move |ctx| ColumnData::Str(f(ctx))),
        )
    }

    /// Time column. The accessor returns raw unix seconds; the timezone
    /// offset from the request is applied here, uniformly for rendering
    /// and filtering.
    pub fn time(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> i64 + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Time,
            FilterType::Time,
            Box::new(move |ctx| ColumnData::Time(f(ctx) + ctx.timezone_offset)),
        )
    }

    pub fn list(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> Vec<Cow<'a, str>> + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::List,
            FilterType::List,
            Box::new(move |ctx| ColumnData::List(f(ctx))),
        )
    }

    pub fn host_service_list(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> Vec<(Cow<'a, str>, Cow<'a, str>)> + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::List,
            FilterType::List,
            Box::new(move |ctx| ColumnData::HostServiceList(f(ctx))),
        )
    }

    pub fn dict(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> Vec<(Cow<'a, str>, Cow<'a, str>)> + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Dict,
            FilterType::Dict,
            Box::new(move |ctx| ColumnData::Dict(f(ctx))),
        )
    }

    pub fn blob(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> Cow<'a, [u8]> + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Blob,
            FilterType::None,
            Box::new(move |ctx| ColumnData::Blob(f(ctx))),
        )
    }

    /// Attribute list: renders the set bit names, filters on the mask.
    pub fn attribute_list(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> u32 + Send + Sync + Clone + 'static,
    ) -> Arc<Column> {
        let g = f.clone();
        Arc::new(Column {
            name: name.into(),
            description: description.into(),
            ctype: ColumnType::List,
            ftype: FilterType::AttributeList,
            eval: Box::new(move |ctx| {
                ColumnData::List(special::attribute_names(f(ctx)))
            }),
            eval_int: Some(Box::new(move |ctx| g(ctx) as i64)),
        })
    }

    /// Attribute list rendered as its numeric mask.
    pub fn attribute_list_int(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl for<'a> Fn(&RowCtx<'a>) -> u32 + Send + Sync + 'static,
    ) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Int,
            FilterType::AttributeList,
            Box::new(move |ctx| ColumnData::Int(f(ctx) as i64)),
        )
    }

    pub fn null(name: impl Into<String>, description: impl Into<String>) -> Arc<Column> {
        Column::new(
            name,
            description,
            ColumnType::Null,
            FilterType::None,
            Box::new(|_| ColumnData::Null),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ctype(&self) -> ColumnType {
        self.ctype
    }

    pub fn ftype(&self) -> FilterType {
        self.ftype
    }

    pub fn value<'a>(&self, ctx: &RowCtx<'a>) -> ColumnData<'a> {
        (self.eval)(ctx)
    }

    /// Numeric view used by int/time filters and aggregators.
    pub fn int_value(&self, ctx: &RowCtx<'_>) -> i64 {
        if let Some(eval_int) = &self.eval_int {
            return eval_int(ctx);
        }
        match (self.eval)(ctx) {
            ColumnData::Int(v) => v,
            ColumnData::Time(v) => v,
            ColumnData::Double(v) => v as i64,
            _ => 0,
        }
    }

    pub fn double_value(&self, ctx: &RowCtx<'_>) -> f64 {
        if let Some(eval_int) = &self.eval_int {
            return eval_int(ctx) as f64;
        }
        match (self.eval)(ctx) {
            ColumnData::Int(v) => v as f64,
            ColumnData::Time(v) => v as f64,
            ColumnData::Double(v) => v,
            _ => 0.0,
        }
    }

    /// Canonical string form used by string-shaped filters.
    pub fn string_value(&self, ctx: &RowCtx<'_>) -> String {
        if let Some(eval_int) = &self.eval_int {
            return eval_int(ctx).to_string();
        }
        match (self.eval)(ctx) {
            ColumnData::Str(s) => s.into_owned(),
            ColumnData::Int(v) => v.to_string(),
            ColumnData::Time(v) => v.to_string(),
            ColumnData::Double(v) => v.to_string(),
            _ => String::new(),
        }
    }

    /// Elements of a list column, used by membership filters.
    pub fn list_value<'a>(&self, ctx: &RowCtx<'a>) -> Vec<Cow<'a, str>> {
        match (self.eval)(ctx) {
            ColumnData::List(v) => v,
            ColumnData::HostServiceList(v) => v.into_iter().map(|(_, s)| s).collect(),
            _ => Vec::new(),
        }
    }

    /// Key/value pairs of a dict column.
    pub fn dict_value<'a>(&self, ctx: &RowCtx<'a>) -> Vec<(Cow<'a, str>, Cow<'a, str>)> {
        match (self.eval)(ctx) {
            ColumnData::Dict(v) => v,
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("type", &self.ctype)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StaticWorld;

    fn ctx_with<'a>(world: &'a StaticWorld, row: Row<'a>) -> RowCtx<'a> {
        RowCtx {
            world,
            row,
            auth_user: None,
            timezone_offset: 0,
            now: 0,
        }
    }

    #[test]
    fn test_int_column_on_host() {
        let world = StaticWorld::from_json(r#"{"hosts": [{"name": "h1", "state": 1}]}"#).unwrap();
        let col = Column::int("state", "Current state", |ctx| {
            ctx.row.as_host().map(|h| h.state).unwrap_or(0)
        });
        let ctx = ctx_with(&world, Row::Host(&world.hosts()[0]));
        assert_eq!(col.value(&ctx), ColumnData::Int(1));
        assert_eq!(col.int_value(&ctx), 1);
        assert_eq!(col.string_value(&ctx), "1");
    }

    #[test]
    fn test_time_column_applies_timezone() {
        let world = StaticWorld::from_json(r#"{"hosts": [{"name": "h1", "last_check": 100}]}"#)
            .unwrap();
        let col = Column::time("last_check", "Last check", |ctx| {
            ctx.row.as_host().map(|h| h.last_check).unwrap_or(0)
        });
        let mut ctx = ctx_with(&world, Row::Host(&world.hosts()[0]));
        ctx.timezone_offset = 1800;
        assert_eq!(col.value(&ctx), ColumnData::Time(1900));
        assert_eq!(col.int_value(&ctx), 1900);
    }

    #[test]
    fn test_attribute_list_shadow_value() {
        let world =
            StaticWorld::from_json(r#"{"hosts": [{"name": "h1", "modified_attributes": 1}]}"#)
                .unwrap();
        let col = Column::attribute_list("modified_attributes", "Modified attributes", |ctx| {
            ctx.row.as_host().map(|h| h.modified_attributes).unwrap_or(0)
        });
        let ctx = ctx_with(&world, Row::Host(&world.hosts()[0]));
        assert_eq!(col.int_value(&ctx), 1);
        assert_eq!(col.string_value(&ctx), "1");
        match col.value(&ctx) {
            ColumnData::List(names) => assert_eq!(names, vec!["notifications_enabled"]),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
