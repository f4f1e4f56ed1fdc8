//! Query lifecycle
//!
//! Parses the header lines of one GET request, drives the table scan, and
//! renders rows or grouped aggregates into the output buffer. A `Query` is
//! created per request and dies with it; only the trigger condition
//! variables outlive requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::buffer::{OutputBuffer, ResponseCode, ResponseHeaderKind};
use crate::column::{Column, ColumnData, FilterType, Row, RowCtx};
use crate::config::EngineConfig;
use crate::filter::{self, Filter, LeafFilter, LogicOp, RelOp};
use crate::render::{Encoding, OutputFormat, Renderer, Separators};
use crate::stats::{Aggregator, StatsColumn, StatsOperation};
use crate::table::Table;
use crate::triggers::{Trigger, Triggers};
use crate::world::{Contact, DaemonView};

/// Resolved `AuthUser` state.
#[derive(Clone, Copy)]
enum AuthUser<'a> {
    Anyone,
    Contact(&'a Contact),
    /// Unknown contact name: sees nothing that is auth-guarded.
    Nobody,
}

pub struct Query<'a> {
    world: &'a dyn DaemonView,
    config: &'a EngineConfig,
    triggers: &'a Triggers,
    out: &'a mut OutputBuffer,

    columns: Vec<Arc<Column>>,
    column_names: Vec<String>,
    columns_given: bool,
    show_column_headers: Option<bool>,

    filter: Filter,
    stats_columns: Vec<StatsColumn>,
    stats_group_by: Vec<Arc<Column>>,
    stats_groups: Vec<(Vec<ColumnData<'static>>, Vec<Aggregator>)>,
    group_index: HashMap<Vec<u8>, usize>,

    auth: AuthUser<'a>,
    limit: Option<usize>,
    time_limit: Option<u64>,
    deadline: Option<Instant>,

    output_format: OutputFormat,
    separators: Separators,
    encoding: Encoding,
    keepalive: bool,

    timezone_offset: i64,
    now: i64,

    wait_object_id: String,
    wait_condition: Filter,
    wait_timeout_ms: u64,
    wait_trigger: Option<Trigger>,

    renderer: Renderer,
    started: bool,
    rows_rendered: usize,
}

impl<'a> Query<'a> {
    pub fn parse(
        table: &dyn Table,
        lines: &[String],
        world: &'a dyn DaemonView,
        config: &'a EngineConfig,
        triggers: &'a Triggers,
        out: &'a mut OutputBuffer,
    ) -> Query<'a> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let mut query = Query {
            world,
            config,
            triggers,
            out,
            columns: Vec::new(),
            column_names: Vec::new(),
            columns_given: false,
            show_column_headers: None,
            filter: Filter::all(),
            stats_columns: Vec::new(),
            stats_group_by: Vec::new(),
            stats_groups: Vec::new(),
            group_index: HashMap::new(),
            auth: AuthUser::Anyone,
            limit: None,
            time_limit: None,
            deadline: None,
            output_format: OutputFormat::Csv,
            separators: Separators::default(),
            encoding: config.data_encoding,
            keepalive: false,
            timezone_offset: 0,
            now,
            wait_object_id: String::new(),
            wait_condition: Filter::all(),
            wait_timeout_ms: 0,
            wait_trigger: None,
            renderer: Renderer::new(OutputFormat::Csv, Separators::default(), config.data_encoding),
            started: false,
            rows_rendered: 0,
        };
        query.parse_lines(table, lines);
        query
    }

    fn parse_lines(&mut self, table: &dyn Table, lines: &[String]) {
        let mut filter_stack: Vec<Filter> = Vec::new();
        let mut wait_stack: Vec<Filter> = Vec::new();

        for line in lines {
            let Some((header, rest)) = line.split_once(':') else {
                self.invalid_header(&format!("invalid request header '{}'", line));
                continue;
            };
            let value = rest.trim_start();
            match header {
                "Columns" => self.parse_columns_line(table, value),
                "Filter" => {
                    if let Some(leaf) = self.parse_filter_line(table, value) {
                        filter_stack.push(leaf);
                    }
                }
                "And" => self.parse_and_or_line(&mut filter_stack, LogicOp::And, value, header),
                "Or" => self.parse_and_or_line(&mut filter_stack, LogicOp::Or, value, header),
                "Negate" => {
                    if let Err(err) = filter::negate_top(&mut filter_stack) {
                        self.invalid_header(&err);
                    }
                }
                "Stats" => self.parse_stats_line(table, value),
                "StatsAnd" => self.parse_stats_and_or_line(LogicOp::And, value),
                "StatsOr" => self.parse_stats_and_or_line(LogicOp::Or, value),
                "StatsNegate" => self.parse_stats_negate_line(),
                "StatsGroupBy" => self.parse_stats_group_line(table, value),
                "Limit" => match value.parse::<usize>() {
                    Ok(limit) => self.limit = Some(limit),
                    Err(_) => self.invalid_header(&format!("invalid limit '{}'", value)),
                },
                "Timelimit" => match value.parse::<u64>() {
                    Ok(secs) => self.time_limit = Some(secs),
                    Err(_) => self.invalid_header(&format!("invalid time limit '{}'", value)),
                },
                "OutputFormat" => match OutputFormat::parse(value) {
                    Some(format) => self.output_format = format,
                    None => self.invalid_header(&format!("invalid output format '{}'", value)),
                },
                "Separators" => match Separators::parse(value) {
                    Some(separators) => self.separators = separators,
                    None => self.invalid_header(&format!("invalid separators '{}'", value)),
                },
                "Encoding" => match Encoding::parse(value) {
                    Some(encoding) => self.encoding = encoding,
                    None => self.invalid_header(&format!("invalid encoding '{}'", value)),
                },
                "ColumnHeaders" => match value {
                    "on" => self.show_column_headers = Some(true),
                    "off" => self.show_column_headers = Some(false),
                    _ => self.invalid_header(&format!("invalid column headers '{}'", value)),
                },
                "KeepAlive" => match value {
                    "on" => self.keepalive = true,
                    "off" => self.keepalive = false,
                    _ => self.invalid_header(&format!("invalid keepalive '{}'", value)),
                },
                "ResponseHeader" => match value {
                    "off" => self.out.response_header = ResponseHeaderKind::Off,
                    "fixed16" => self.out.response_header = ResponseHeaderKind::Fixed16,
                    _ => self.invalid_header(&format!("invalid response header '{}'", value)),
                },
                "AuthUser" => {
                    self.auth = match self.world.find_contact(value) {
                        Some(i) => AuthUser::Contact(&self.world.contacts()[i]),
                        None => {
                            tracing::info!("unknown AuthUser '{}', hiding all rows", value);
                            AuthUser::Nobody
                        }
                    };
                }
                "Localtime" => match value.parse::<i64>() {
                    Ok(client) => {
                        // Round the clock difference to half hours, clients
                        // within one timezone have no real skew.
                        let diff = client - self.now;
                        self.timezone_offset = ((diff as f64 / 1800.0).round() as i64) * 1800;
                        if self.timezone_offset != 0 {
                            tracing::debug!(
                                "timezone offset is {} seconds",
                                self.timezone_offset
                            );
                        }
                    }
                    Err(_) => self.invalid_header(&format!("invalid localtime '{}'", value)),
                },
                "WaitObject" => self.wait_object_id = value.to_string(),
                "WaitCondition" => {
                    if let Some(leaf) = self.parse_filter_line(table, value) {
                        wait_stack.push(leaf);
                    }
                }
                "WaitConditionAnd" => {
                    self.parse_and_or_line(&mut wait_stack, LogicOp::And, value, header)
                }
                "WaitConditionOr" => {
                    self.parse_and_or_line(&mut wait_stack, LogicOp::Or, value, header)
                }
                "WaitConditionNegate" => {
                    if let Err(err) = filter::negate_top(&mut wait_stack) {
                        self.invalid_header(&err);
                    }
                }
                "WaitTimeout" => match value.parse::<u64>() {
                    Ok(ms) => self.wait_timeout_ms = ms,
                    Err(_) => self.invalid_header(&format!("invalid wait timeout '{}'", value)),
                },
                "WaitTrigger" => match Trigger::parse(value) {
                    Some(trigger) => self.wait_trigger = Some(trigger),
                    None => self.invalid_header(&format!("unknown trigger '{}'", value)),
                },
                _ => self.invalid_header(&format!("undefined request header '{}'", header)),
            }
        }

        self.filter = Filter::And(filter_stack);
        self.wait_condition = Filter::And(wait_stack);

        if !self.columns_given {
            self.columns = table.catalog().columns().to_vec();
            self.column_names = self
                .columns
                .iter()
                .map(|c| c.name().to_string())
                .collect();
        }
        // Pre-StatsGroupBy clients pass the grouping columns as Columns.
        if !self.stats_columns.is_empty() && self.stats_group_by.is_empty() && self.columns_given {
            self.stats_group_by = self.columns.clone();
        }
    }

    fn invalid_header(&mut self, message: &str) {
        self.out.set_error(ResponseCode::BadRequest, message);
    }

    /// Parse `col op value` into a leaf filter.
    fn parse_filter_line(&mut self, table: &dyn Table, line: &str) -> Option<Filter> {
        let (column_name, rest) = match line.split_once(char::is_whitespace) {
            Some(parts) => parts,
            None => {
                self.invalid_header(&format!("invalid filter '{}'", line));
                return None;
            }
        };
        let rest = rest.trim_start();
        let (op_token, value) = match rest.split_once(char::is_whitespace) {
            Some((op, value)) => (op, value),
            None => (rest, ""),
        };
        let Some(op) = RelOp::parse(op_token) else {
            self.invalid_header(&format!("invalid filter operator '{}'", op_token));
            return None;
        };
        let Some(column) = table.column(column_name) else {
            self.out.set_error(
                ResponseCode::NotFound,
                &format!("table '{}' has no column '{}'", table.name(), column_name),
            );
            return None;
        };
        match LeafFilter::new(column, op, value) {
            Ok(leaf) => Some(Filter::Leaf(leaf)),
            Err(err) => {
                self.invalid_header(&err);
                None
            }
        }
    }

    fn parse_and_or_line(
        &mut self,
        stack: &mut Vec<Filter>,
        op: LogicOp,
        value: &str,
        header: &str,
    ) {
        let Ok(count) = value.parse::<usize>() else {
            self.invalid_header(&format!("invalid count '{}' for {}", value, header));
            return;
        };
        if let Err(err) = filter::combine_tail(stack, op, count) {
            self.invalid_header(&format!("{}: {}", header, err));
        }
    }

    fn parse_columns_line(&mut self, table: &dyn Table, line: &str) {
        self.columns_given = true;
        for name in line.split_whitespace() {
            match table.column(name) {
                Some(column) => {
                    self.columns.push(column);
                    self.column_names.push(name.to_string());
                }
                None => {
                    self.out.set_error(
                        ResponseCode::NotFound,
                        &format!("table '{}' has no column '{}'", table.name(), name),
                    );
                }
            }
        }
    }

    fn parse_stats_group_line(&mut self, table: &dyn Table, line: &str) {
        for name in line.split_whitespace() {
            match table.column(name) {
                Some(column) => self.stats_group_by.push(column),
                None => {
                    self.out.set_error(
                        ResponseCode::NotFound,
                        &format!("table '{}' has no column '{}'", table.name(), name),
                    );
                }
            }
        }
    }

    /// `Stats: op col` makes an aggregator, `Stats: col op value` a
    /// counting predicate.
    fn parse_stats_line(&mut self, table: &dyn Table, line: &str) {
        let first = line.split_whitespace().next().unwrap_or("");
        if let Some(op) = StatsOperation::parse(first) {
            let column_name = line[first.len()..].trim();
            let Some(column) = table.column(column_name) else {
                self.out.set_error(
                    ResponseCode::NotFound,
                    &format!("table '{}' has no column '{}'", table.name(), column_name),
                );
                return;
            };
            if !matches!(
                column.ftype(),
                FilterType::Int | FilterType::Double | FilterType::Time
            ) {
                self.invalid_header(&format!("cannot aggregate column '{}'", column_name));
                return;
            }
            self.stats_columns.push(StatsColumn::Operation { op, column });
        } else if let Some(leaf) = self.parse_filter_line(table, line) {
            self.stats_columns.push(StatsColumn::Count(leaf));
        }
    }

    fn parse_stats_and_or_line(&mut self, op: LogicOp, value: &str) {
        let Ok(count) = value.parse::<usize>() else {
            self.invalid_header(&format!("invalid stats combination count '{}'", value));
            return;
        };
        if count == 0 {
            return;
        }
        if count > self.stats_columns.len() {
            self.invalid_header(&format!(
                "cannot combine {} stats, only {} defined",
                count,
                self.stats_columns.len()
            ));
            return;
        }
        let tail = self.stats_columns.split_off(self.stats_columns.len() - count);
        let mut filters = Vec::with_capacity(count);
        for stats in tail {
            match stats.into_filter() {
                Some(filter) => filters.push(filter),
                None => {
                    self.invalid_header("only counting stats can be combined");
                    return;
                }
            }
        }
        self.stats_columns.push(StatsColumn::Count(match op {
            LogicOp::And => Filter::And(filters),
            LogicOp::Or => Filter::Or(filters),
        }));
    }

    fn parse_stats_negate_line(&mut self) {
        match self.stats_columns.pop() {
            Some(stats) => match stats.into_filter() {
                Some(filter) => self.stats_columns.push(StatsColumn::Count(filter.negate())),
                None => self.invalid_header("only counting stats can be negated"),
            },
            None => self.invalid_header("no stats to negate"),
        }
    }

    // --- scan-side interface -------------------------------------------

    pub fn world(&self) -> &'a dyn DaemonView {
        self.world
    }

    pub fn server_now(&self) -> i64 {
        self.now
    }

    pub fn set_error(&mut self, code: ResponseCode, message: &str) {
        self.out.set_error(code, message);
    }

    pub fn has_error(&self) -> bool {
        self.out.has_error()
    }

    pub fn string_value_restriction_for(&self, column: &str) -> Option<String> {
        self.filter
            .string_value_restriction_for(column)
            .map(str::to_string)
    }

    pub fn int_limits(&self, column: &str, lower: i64, upper: i64) -> (i64, i64) {
        let (mut lo, mut hi) = (lower, upper);
        self.filter
            .find_int_limits(column, &mut lo, &mut hi, self.timezone_offset);
        (lo, hi)
    }

    /// Mask of feasible values of a small int column, full mask when the
    /// filter cannot be pushed down.
    pub fn value_mask(&self, column: &str) -> u32 {
        let mut mask = u32::MAX;
        if self
            .filter
            .optimize_bitmask(column, &mut mask, self.timezone_offset)
        {
            mask
        } else {
            u32::MAX
        }
    }

    fn ctx<'r>(&self, row: Row<'r>) -> RowCtx<'r>
    where
        'a: 'r,
    {
        RowCtx {
            world: self.world,
            row,
            auth_user: match self.auth {
                AuthUser::Contact(contact) => Some(contact),
                _ => None,
            },
            timezone_offset: self.timezone_offset,
            now: self.now,
        }
    }

    /// Begin the response: resolve the wait condition, then emit the
    /// column header row if requested.
    pub(crate) fn start(&mut self, table: &dyn Table) {
        self.do_wait(table);
        if self.out.has_error() {
            return;
        }
        self.renderer = Renderer::new(self.output_format, self.separators, self.encoding);
        self.started = true;
        self.renderer
            .begin_query(self.out.body_mut(), Some(&self.column_names));

        // wrapped_json already names the columns in its preamble.
        let show_headers = self.show_column_headers.unwrap_or(!self.columns_given)
            && self.output_format != OutputFormat::WrappedJson;
        if show_headers && self.stats_columns.is_empty() {
            self.renderer.begin_row(self.out.body_mut());
            let names = std::mem::take(&mut self.column_names);
            for (i, name) in names.iter().enumerate() {
                self.renderer.field(
                    self.out.body_mut(),
                    i,
                    &ColumnData::Str(std::borrow::Cow::Borrowed(name)),
                );
            }
            self.column_names = names;
            self.renderer.end_row(self.out.body_mut());
        }

        if self.deadline.is_none() {
            self.deadline = self
                .time_limit
                .map(|secs| Instant::now() + Duration::from_secs(secs));
        }

        // Ungrouped stats report zeroes even over an empty scan.
        if !self.stats_columns.is_empty() && self.stats_group_by.is_empty() {
            let aggregators = self
                .stats_columns
                .iter()
                .map(StatsColumn::create_aggregator)
                .collect();
            self.group_index.insert(Vec::new(), 0);
            self.stats_groups.push((Vec::new(), aggregators));
        }
    }

    fn do_wait(&mut self, table: &dyn Table) {
        if self.wait_condition.is_trivial() {
            return;
        }
        let Some(row) = table.find_wait_object(self.world, &self.wait_object_id) else {
            self.invalid_header(&format!(
                "unknown wait object '{}' in table '{}'",
                self.wait_object_id,
                table.name()
            ));
            return;
        };
        let deadline = (self.wait_timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(self.wait_timeout_ms));
        let trigger = self.wait_trigger.unwrap_or(Trigger::All);
        loop {
            if self.wait_condition.accepts(&self.ctx(row)) {
                return;
            }
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return; // timed out, fall through to the normal GET
                    }
                    deadline - now
                }
                None => Duration::from_secs(3600),
            };
            self.triggers.wait_for(trigger, timeout);
        }
    }

    /// Feed one candidate row. Returns false when the scan must stop.
    pub fn process(&mut self, table: &dyn Table, row: Row<'_>) -> bool {
        if self.out.has_error() {
            return false;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.out.set_error(
                    ResponseCode::TimeLimit,
                    &format!(
                        "time limit of {} seconds exceeded",
                        self.time_limit.unwrap_or(0)
                    ),
                );
                return false;
            }
        }

        let ctx = self.ctx(row);
        if !self.filter.accepts(&ctx) {
            return true;
        }
        match self.auth {
            AuthUser::Anyone => {}
            AuthUser::Contact(contact) => {
                if !table.is_authorized(self.world, Some(contact), row) {
                    return true;
                }
            }
            AuthUser::Nobody => {
                if !table.is_authorized(self.world, None, row) {
                    return true;
                }
            }
        }

        if !self.stats_columns.is_empty() {
            self.consume_stats(row);
            return true;
        }

        if let Some(limit) = self.limit {
            if self.rows_rendered >= limit {
                return false;
            }
        }

        self.renderer.begin_row(self.out.body_mut());
        for (i, column) in self.columns.iter().enumerate() {
            let value = column.value(&ctx);
            self.renderer.field(self.out.body_mut(), i, &value);
        }
        self.renderer.end_row(self.out.body_mut());
        self.rows_rendered += 1;

        if self.out.len() > self.out.max_size {
            self.out.set_error(
                ResponseCode::TooLarge,
                &format!("response exceeds limit of {} bytes", self.out.max_size),
            );
            return false;
        }
        true
    }

    fn consume_stats(&mut self, row: Row<'_>) {
        let ctx = self.ctx(row);
        let key_values: Vec<ColumnData<'static>> = self
            .stats_group_by
            .iter()
            .map(|c| c.value(&ctx).into_owned())
            .collect();
        let mut key = Vec::new();
        let mut key_renderer =
            Renderer::new(OutputFormat::Csv, Separators::default(), self.encoding);
        for (i, value) in key_values.iter().enumerate() {
            key_renderer.field(&mut key, i, value);
        }

        let index = match self.group_index.get(&key) {
            Some(&index) => index,
            None => {
                let aggregators = self
                    .stats_columns
                    .iter()
                    .map(StatsColumn::create_aggregator)
                    .collect();
                self.stats_groups.push((key_values, aggregators));
                let index = self.stats_groups.len() - 1;
                self.group_index.insert(key, index);
                index
            }
        };
        for aggregator in &mut self.stats_groups[index].1 {
            aggregator.consume(&ctx);
        }
    }

    /// Emit stats results, close the response, report the keepalive wish.
    pub(crate) fn finish(mut self) -> bool {
        if self.started {
            if !self.stats_columns.is_empty() && !self.out.has_error() {
                let groups = std::mem::take(&mut self.stats_groups);
                for (key_values, aggregators) in &groups {
                    self.renderer.begin_row(self.out.body_mut());
                    let mut index = 0;
                    for value in key_values {
                        self.renderer.field(self.out.body_mut(), index, value);
                        index += 1;
                    }
                    for aggregator in aggregators {
                        self.renderer
                            .field(self.out.body_mut(), index, &aggregator.output());
                        index += 1;
                    }
                    self.renderer.end_row(self.out.body_mut());
                }
            }
            if !self.out.has_error() {
                self.renderer.end_query(self.out.body_mut());
            }
        }
        self.keepalive
    }
}
