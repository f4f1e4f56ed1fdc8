//! Leaf predicates, one per column type
//!
//! A leaf binds a column to a relational operator and a parsed reference
//! value. Operators come in positive/negative pairs, so negation is a flip
//! of the operator and never needs a wrapper node.

use std::sync::Arc;

use regex_lite::{Regex, RegexBuilder};

use crate::column::{special, Column, FilterType, RowCtx};

/// The twelve relational operators of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    Matches,
    DoesntMatch,
    EqualIcase,
    NotEqualIcase,
    MatchesIcase,
    DoesntMatchIcase,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
}

impl RelOp {
    pub fn parse(token: &str) -> Option<RelOp> {
        Some(match token {
            "=" => RelOp::Equal,
            "!=" => RelOp::NotEqual,
            "~" => RelOp::Matches,
            "!~" => RelOp::DoesntMatch,
            "=~" => RelOp::EqualIcase,
            "!=~" => RelOp::NotEqualIcase,
            "~~" => RelOp::MatchesIcase,
            "!~~" => RelOp::DoesntMatchIcase,
            "<" => RelOp::Less,
            ">=" => RelOp::GreaterOrEqual,
            ">" => RelOp::Greater,
            "<=" => RelOp::LessOrEqual,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelOp::Equal => "=",
            RelOp::NotEqual => "!=",
            RelOp::Matches => "~",
            RelOp::DoesntMatch => "!~",
            RelOp::EqualIcase => "=~",
            RelOp::NotEqualIcase => "!=~",
            RelOp::MatchesIcase => "~~",
            RelOp::DoesntMatchIcase => "!~~",
            RelOp::Less => "<",
            RelOp::GreaterOrEqual => ">=",
            RelOp::Greater => ">",
            RelOp::LessOrEqual => "<=",
        }
    }

    /// The complementary operator, used for De Morgan negation.
    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Equal => RelOp::NotEqual,
            RelOp::NotEqual => RelOp::Equal,
            RelOp::Matches => RelOp::DoesntMatch,
            RelOp::DoesntMatch => RelOp::Matches,
            RelOp::EqualIcase => RelOp::NotEqualIcase,
            RelOp::NotEqualIcase => RelOp::EqualIcase,
            RelOp::MatchesIcase => RelOp::DoesntMatchIcase,
            RelOp::DoesntMatchIcase => RelOp::MatchesIcase,
            RelOp::Less => RelOp::GreaterOrEqual,
            RelOp::GreaterOrEqual => RelOp::Less,
            RelOp::Greater => RelOp::LessOrEqual,
            RelOp::LessOrEqual => RelOp::Greater,
        }
    }

    fn is_regex(self) -> bool {
        matches!(
            self,
            RelOp::Matches | RelOp::DoesntMatch | RelOp::MatchesIcase | RelOp::DoesntMatchIcase
        )
    }
}

#[derive(Clone)]
enum LeafKind {
    Int { ref_value: i64 },
    Double { ref_value: f64 },
    Str { ref_value: String, regex: Option<Regex> },
    List { ref_value: String, regex: Option<Regex> },
    Time { ref_value: i64 },
    Dict { var: String, ref_value: String, regex: Option<Regex> },
}

#[derive(Clone)]
pub struct LeafFilter {
    column: Arc<Column>,
    op: RelOp,
    kind: LeafKind,
}

fn compile_regex(pattern: &str, op: RelOp) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(matches!(op, RelOp::MatchesIcase | RelOp::DoesntMatchIcase))
        .build()
        .map_err(|e| format!("invalid regular expression: {}", e))
}

impl LeafFilter {
    /// Build a leaf for `column op value`. Fails on malformed reference
    /// values and on operators the column type does not support.
    pub fn new(column: Arc<Column>, op: RelOp, value: &str) -> Result<LeafFilter, String> {
        let kind = match column.ftype() {
            FilterType::Int | FilterType::AttributeList => {
                let ref_value = parse_int_reference(&column, value)?;
                LeafKind::Int { ref_value }
            }
            FilterType::Time => {
                let ref_value = value.trim().parse::<i64>().map_err(|_| {
                    format!("invalid timestamp '{}' for column {}", value, column.name())
                })?;
                LeafKind::Time { ref_value }
            }
            FilterType::Double => {
                if op.is_regex() {
                    return Err(format!(
                        "operator {} not supported for column {}",
                        op.as_str(),
                        column.name()
                    ));
                }
                let ref_value = value.trim().parse::<f64>().map_err(|_| {
                    format!("invalid number '{}' for column {}", value, column.name())
                })?;
                LeafKind::Double { ref_value }
            }
            FilterType::String => {
                let regex = op.is_regex().then(|| compile_regex(value, op)).transpose()?;
                LeafKind::Str {
                    ref_value: value.to_string(),
                    regex,
                }
            }
            FilterType::List => {
                match op {
                    RelOp::Equal | RelOp::NotEqual => {
                        // Only the empty-list test exists for these.
                        if !value.is_empty() {
                            return Err(format!(
                                "operator {} on column {} only supports the empty reference",
                                op.as_str(),
                                column.name()
                            ));
                        }
                    }
                    RelOp::GreaterOrEqual | RelOp::Less => {}
                    op if op.is_regex() => {}
                    other => {
                        return Err(format!(
                            "operator {} not supported for column {}",
                            other.as_str(),
                            column.name()
                        ));
                    }
                }
                let regex = op.is_regex().then(|| compile_regex(value, op)).transpose()?;
                LeafKind::List {
                    ref_value: value.to_string(),
                    regex,
                }
            }
            FilterType::Dict => {
                let (var, rest) = match value.split_once(char::is_whitespace) {
                    Some((var, rest)) => (var.to_string(), rest.trim_start().to_string()),
                    None => (value.to_string(), String::new()),
                };
                let regex = op
                    .is_regex()
                    .then(|| compile_regex(&rest, op))
                    .transpose()?;
                LeafKind::Dict {
                    var,
                    ref_value: rest,
                    regex,
                }
            }
            FilterType::None => {
                return Err(format!("cannot filter on column {}", column.name()));
            }
        };
        Ok(LeafFilter { column, op, kind })
    }

    pub fn column_name(&self) -> &str {
        self.column.name()
    }

    pub fn op(&self) -> RelOp {
        self.op
    }

    /// Same leaf with the complementary operator.
    pub fn negated(&self) -> LeafFilter {
        LeafFilter {
            column: Arc::clone(&self.column),
            op: self.op.negate(),
            kind: self.kind.clone(),
        }
    }

    pub fn accepts(&self, ctx: &RowCtx<'_>) -> bool {
        match &self.kind {
            LeafKind::Int { ref_value } | LeafKind::Time { ref_value } => {
                int_accepts(self.column.int_value(ctx), *ref_value, self.op)
            }
            LeafKind::Double { ref_value } => {
                let act = self.column.double_value(ctx);
                match self.op {
                    RelOp::Equal => act == *ref_value,
                    RelOp::NotEqual => act != *ref_value,
                    RelOp::Less => act < *ref_value,
                    RelOp::GreaterOrEqual => act >= *ref_value,
                    RelOp::Greater => act > *ref_value,
                    RelOp::LessOrEqual => act <= *ref_value,
                    other => invalid_operator(other, self.column.name()),
                }
            }
            LeafKind::Str { ref_value, regex } => {
                str_accepts(&self.column.string_value(ctx), ref_value, regex, self.op)
                    .unwrap_or_else(|| invalid_operator(self.op, self.column.name()))
            }
            LeafKind::List { ref_value, regex } => {
                let elements = self.column.list_value(ctx);
                match self.op {
                    RelOp::Equal => elements.is_empty(),
                    RelOp::NotEqual => !elements.is_empty(),
                    RelOp::GreaterOrEqual => elements.iter().any(|e| e == ref_value),
                    RelOp::Less => !elements.iter().any(|e| e == ref_value),
                    RelOp::Matches | RelOp::MatchesIcase => match regex {
                        Some(re) => elements.iter().any(|e| re.is_match(e)),
                        None => false,
                    },
                    RelOp::DoesntMatch | RelOp::DoesntMatchIcase => match regex {
                        Some(re) => !elements.iter().any(|e| re.is_match(e)),
                        None => false,
                    },
                    other => invalid_operator(other, self.column.name()),
                }
            }
            LeafKind::Dict {
                var,
                ref_value,
                regex,
            } => {
                let pairs = self.column.dict_value(ctx);
                let act = pairs
                    .iter()
                    .find(|(k, _)| k == var)
                    .map(|(_, v)| v.as_ref())
                    .unwrap_or("");
                str_accepts(act, ref_value, regex, self.op)
                    .unwrap_or_else(|| invalid_operator(self.op, self.column.name()))
            }
        }
    }

    /// Value this leaf pins the column to, if it pins one at all.
    pub fn string_restriction(&self) -> Option<&str> {
        match (&self.kind, self.op) {
            (LeafKind::Str { ref_value, .. }, RelOp::Equal) => Some(ref_value),
            (LeafKind::List { ref_value, .. }, RelOp::GreaterOrEqual) => Some(ref_value),
            _ => None,
        }
    }

    /// Narrow the half-open interval `[lower, upper)` of possible values.
    pub fn find_int_limits(&self, lower: &mut i64, upper: &mut i64, tz_offset: i64) {
        let ref_value = match &self.kind {
            LeafKind::Int { ref_value } => *ref_value,
            LeafKind::Time { ref_value } => *ref_value - tz_offset,
            _ => return,
        };
        if *lower >= *upper {
            return;
        }
        match self.op {
            RelOp::Equal => {
                if ref_value >= *lower && ref_value < *upper {
                    *lower = ref_value;
                    *upper = ref_value + 1;
                } else {
                    *lower = *upper;
                }
            }
            RelOp::NotEqual => {
                if ref_value == *lower {
                    *lower += 1;
                } else if ref_value == *upper - 1 {
                    *upper -= 1;
                }
            }
            RelOp::Less => {
                if ref_value < *upper {
                    *upper = ref_value;
                }
            }
            RelOp::GreaterOrEqual => {
                if ref_value > *lower {
                    *lower = ref_value;
                }
            }
            RelOp::Greater => {
                if ref_value >= *lower {
                    *lower = ref_value + 1;
                }
            }
            RelOp::LessOrEqual => {
                if ref_value < *upper - 1 {
                    *upper = ref_value + 1;
                }
            }
            // Bitmask operators cannot bound an interval.
            _ => {}
        }
    }

    /// Clear the bits of `mask` this leaf rules out. Returns false if the
    /// leaf cannot take part in mask optimisation.
    pub fn optimize_bitmask(&self, mask: &mut u32, tz_offset: i64) -> bool {
        let ref_value = match &self.kind {
            LeafKind::Int { ref_value } => *ref_value,
            LeafKind::Time { ref_value } => *ref_value - tz_offset,
            _ => return false,
        };
        if !(0..=31).contains(&ref_value) {
            // The filter exists but cannot narrow a 32-bit mask.
            return true;
        }
        let ref_value = ref_value as u32;
        let bit = 1u32 << ref_value;
        match self.op {
            RelOp::Equal => *mask &= bit,
            RelOp::NotEqual => *mask &= !bit,
            RelOp::GreaterOrEqual => *mask &= !(bit - 1),
            RelOp::Greater => *mask &= !(((1u64 << (ref_value + 1)) - 1) as u32),
            RelOp::LessOrEqual => *mask &= ((1u64 << (ref_value + 1)) - 1) as u32,
            RelOp::Less => *mask &= bit - 1,
            other => return invalid_operator(other, self.column.name()),
        }
        true
    }
}

fn invalid_operator(op: RelOp, column: &str) -> bool {
    tracing::error!(
        "invalid relational operator {} reached a filter on column {}",
        op.as_str(),
        column
    );
    false
}

fn int_accepts(act: i64, ref_value: i64, op: RelOp) -> bool {
    match op {
        RelOp::Equal => act == ref_value,
        RelOp::NotEqual => act != ref_value,
        // superset
        RelOp::Matches => act & ref_value == ref_value,
        RelOp::DoesntMatch => act & ref_value != ref_value,
        // subset
        RelOp::EqualIcase => act & ref_value == act,
        RelOp::NotEqualIcase => act & ref_value != act,
        // non-empty intersection
        RelOp::MatchesIcase => act & ref_value != 0,
        RelOp::DoesntMatchIcase => act & ref_value == 0,
        RelOp::Less => act < ref_value,
        RelOp::GreaterOrEqual => act >= ref_value,
        RelOp::Greater => act > ref_value,
        RelOp::LessOrEqual => act <= ref_value,
    }
}

/// Shared comparison core for string and dict leaves. `None` marks an
/// operator/state combination that should not exist.
fn str_accepts(act: &str, ref_value: &str, regex: &Option<Regex>, op: RelOp) -> Option<bool> {
    Some(match op {
        RelOp::Equal => act == ref_value,
        RelOp::NotEqual => act != ref_value,
        RelOp::EqualIcase => act.eq_ignore_ascii_case(ref_value),
        RelOp::NotEqualIcase => !act.eq_ignore_ascii_case(ref_value),
        RelOp::Matches | RelOp::MatchesIcase => regex.as_ref()?.is_match(act),
        RelOp::DoesntMatch | RelOp::DoesntMatchIcase => !regex.as_ref()?.is_match(act),
        RelOp::Less => act < ref_value,
        RelOp::GreaterOrEqual => act >= ref_value,
        RelOp::Greater => act > ref_value,
        RelOp::LessOrEqual => act <= ref_value,
    })
}

/// Integer references are a numeric literal, or for attribute lists a
/// comma-separated set of attribute names. Mixing both forms is rejected.
fn parse_int_reference(column: &Column, value: &str) -> Result<i64, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    if value.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return value.parse::<i64>().map_err(|_| {
            format!("invalid numeric value '{}' for column {}", value, column.name())
        });
    }
    if column.ftype() == FilterType::AttributeList {
        return Ok(special::parse_attribute_names(value) as i64);
    }
    Err(format!(
        "invalid numeric value '{}' for column {}",
        value,
        column.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, Row, RowCtx};
    use crate::world::{DaemonView, Host, StaticWorld};

    fn state_column() -> Arc<Column> {
        Column::int("state", "Current state", |ctx| {
            ctx.row.as_host().map(|h| h.state).unwrap_or(0)
        })
    }

    fn name_column() -> Arc<Column> {
        Column::string("name", "Host name", |ctx| {
            ctx.row
                .as_host()
                .map(|h| std::borrow::Cow::Borrowed(h.name.as_str()))
                .unwrap_or_default()
        })
    }

    fn world_with_host(name: &str, state: i64) -> StaticWorld {
        let mut world = StaticWorld::default();
        world.hosts.push(Host {
            name: name.into(),
            state,
            ..Host::default()
        });
        world.finish().unwrap()
    }

    fn accepts(leaf: &LeafFilter, world: &StaticWorld) -> bool {
        let ctx = RowCtx {
            world,
            row: Row::Host(&world.hosts()[0]),
            auth_user: None,
            timezone_offset: 0,
            now: 0,
        };
        leaf.accepts(&ctx)
    }

    #[test]
    fn test_int_relational_ops() {
        let world = world_with_host("h1", 1);
        for (op, expected) in [
            (RelOp::Equal, true),
            (RelOp::NotEqual, false),
            (RelOp::Less, false),
            (RelOp::GreaterOrEqual, true),
        ] {
            let leaf = LeafFilter::new(state_column(), op, "1").unwrap();
            assert_eq!(accepts(&leaf, &world), expected, "op {:?}", op);
        }
    }

    #[test]
    fn test_int_bitmask_ops() {
        let world = world_with_host("h1", 0b0110);
        // superset
        let leaf = LeafFilter::new(state_column(), RelOp::Matches, "6").unwrap();
        assert!(accepts(&leaf, &world));
        let leaf = LeafFilter::new(state_column(), RelOp::Matches, "7").unwrap();
        assert!(!accepts(&leaf, &world));
        // subset
        let leaf = LeafFilter::new(state_column(), RelOp::EqualIcase, "14").unwrap();
        assert!(accepts(&leaf, &world));
        // intersection
        let leaf = LeafFilter::new(state_column(), RelOp::MatchesIcase, "2").unwrap();
        assert!(accepts(&leaf, &world));
        let leaf = LeafFilter::new(state_column(), RelOp::DoesntMatchIcase, "8").unwrap();
        assert!(accepts(&leaf, &world));
    }

    #[test]
    fn test_string_regex_case_insensitive() {
        let world = world_with_host("Web01", 0);
        let leaf = LeafFilter::new(name_column(), RelOp::MatchesIcase, "^web").unwrap();
        assert!(accepts(&leaf, &world));
        let leaf = LeafFilter::new(name_column(), RelOp::Matches, "^web").unwrap();
        assert!(!accepts(&leaf, &world));
    }

    #[test]
    fn test_bad_regex_rejected() {
        assert!(LeafFilter::new(name_column(), RelOp::Matches, "[").is_err());
    }

    #[test]
    fn test_mixed_int_reference_rejected() {
        assert!(LeafFilter::new(state_column(), RelOp::Equal, "3,check_command").is_err());
    }

    #[test]
    fn test_negated_op_is_complement() {
        let world = world_with_host("h1", 2);
        let leaf = LeafFilter::new(state_column(), RelOp::Less, "2").unwrap();
        let negated = leaf.negated();
        assert_eq!(negated.op(), RelOp::GreaterOrEqual);
        assert_ne!(accepts(&leaf, &world), accepts(&negated, &world));
    }

    #[test]
    fn test_find_int_limits() {
        let leaf = LeafFilter::new(state_column(), RelOp::GreaterOrEqual, "5").unwrap();
        let (mut lo, mut hi) = (0i64, 100i64);
        leaf.find_int_limits(&mut lo, &mut hi, 0);
        assert_eq!((lo, hi), (5, 100));

        let leaf = LeafFilter::new(state_column(), RelOp::Equal, "200").unwrap();
        let (mut lo, mut hi) = (0i64, 100i64);
        leaf.find_int_limits(&mut lo, &mut hi, 0);
        assert_eq!(lo, hi);
    }

    #[test]
    fn test_optimize_bitmask() {
        let leaf = LeafFilter::new(state_column(), RelOp::Equal, "1").unwrap();
        let mut mask = u32::MAX;
        assert!(leaf.optimize_bitmask(&mut mask, 0));
        assert_eq!(mask, 0b10);

        let leaf = LeafFilter::new(state_column(), RelOp::Less, "2").unwrap();
        let mut mask = u32::MAX;
        assert!(leaf.optimize_bitmask(&mut mask, 0));
        assert_eq!(mask, 0b11);

        let leaf = LeafFilter::new(state_column(), RelOp::Greater, "30").unwrap();
        let mut mask = u32::MAX;
        assert!(leaf.optimize_bitmask(&mut mask, 0));
        assert_eq!(mask, 1 << 31);
    }
}
