//! Read-side view of the monitoring daemon's object graph
//!
//! The engine never owns monitored state. Everything it can see goes through
//! the [`DaemonView`] trait: slices of records, name lookups, membership
//! predicates and a handful of path getters. Cross references between
//! records are indices into the view's slices, so a record is cheap to hand
//! around as a shared reference for the duration of one scan.

pub mod snapshot;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use snapshot::StaticWorld;

/// Host states.
pub const HOST_UP: i64 = 0;
pub const HOST_DOWN: i64 = 1;
pub const HOST_UNREACHABLE: i64 = 2;
/// Service states.
pub const STATE_OK: i64 = 0;
pub const STATE_WARNING: i64 = 1;
pub const STATE_CRITICAL: i64 = 2;
pub const STATE_UNKNOWN: i64 = 3;

/// A monitored host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub check_command: String,
    #[serde(default)]
    pub event_handler: String,
    #[serde(default)]
    pub notification_period: String,
    #[serde(default)]
    pub check_period: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_url: String,
    #[serde(default)]
    pub action_url: String,
    #[serde(default)]
    pub icon_image: String,
    #[serde(default)]
    pub icon_image_alt: String,
    #[serde(default)]
    pub statusmap_image: String,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub long_plugin_output: String,
    #[serde(default)]
    pub perf_data: String,

    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub last_hard_state: i64,
    #[serde(default)]
    pub check_type: i64,
    #[serde(default)]
    pub has_been_checked: i64,
    #[serde(default)]
    pub current_attempt: i64,
    #[serde(default)]
    pub max_check_attempts: i64,
    #[serde(default)]
    pub state_type: i64,
    #[serde(default)]
    pub acknowledged: i64,
    #[serde(default)]
    pub acknowledgement_type: i64,
    #[serde(default)]
    pub scheduled_downtime_depth: i64,
    #[serde(default)]
    pub current_notification_number: i64,

    #[serde(default)]
    pub checks_enabled: i64,
    #[serde(default)]
    pub accept_passive_checks: i64,
    #[serde(default)]
    pub event_handler_enabled: i64,
    #[serde(default)]
    pub notifications_enabled: i64,
    #[serde(default)]
    pub flap_detection_enabled: i64,
    #[serde(default)]
    pub process_performance_data: i64,
    #[serde(default)]
    pub obsess_over_host: i64,
    #[serde(default)]
    pub is_flapping: i64,
    #[serde(default)]
    pub is_executing: i64,

    #[serde(default)]
    pub last_check: i64,
    #[serde(default)]
    pub next_check: i64,
    #[serde(default)]
    pub last_state_change: i64,
    #[serde(default)]
    pub last_hard_state_change: i64,
    #[serde(default)]
    pub last_time_up: i64,
    #[serde(default)]
    pub last_time_down: i64,
    #[serde(default)]
    pub last_time_unreachable: i64,
    #[serde(default)]
    pub last_notification: i64,
    #[serde(default)]
    pub next_notification: i64,

    #[serde(default)]
    pub check_interval: f64,
    #[serde(default)]
    pub retry_interval: f64,
    #[serde(default)]
    pub notification_interval: f64,
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub percent_state_change: f64,

    /// Bitmask of attributes modified at runtime.
    #[serde(default)]
    pub modified_attributes: u32,

    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub childs: Vec<String>,
    /// Indices into [`DaemonView::services`].
    #[serde(default)]
    pub services: Vec<usize>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub contact_groups: Vec<String>,
    /// Hostgroup names this host belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub custom_variables: Vec<(String, String)>,
}

/// A monitored service, always attached to one host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub description: String,
    #[serde(default)]
    pub display_name: String,
    /// Index into [`DaemonView::hosts`].
    #[serde(default)]
    pub host: usize,
    #[serde(default)]
    pub check_command: String,
    #[serde(default)]
    pub event_handler: String,
    #[serde(default)]
    pub notification_period: String,
    #[serde(default)]
    pub check_period: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_url: String,
    #[serde(default)]
    pub action_url: String,
    #[serde(default)]
    pub icon_image: String,
    #[serde(default)]
    pub icon_image_alt: String,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub long_plugin_output: String,
    #[serde(default)]
    pub perf_data: String,

    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub last_hard_state: i64,
    #[serde(default)]
    pub check_type: i64,
    #[serde(default)]
    pub has_been_checked: i64,
    #[serde(default)]
    pub current_attempt: i64,
    #[serde(default)]
    pub max_check_attempts: i64,
    #[serde(default)]
    pub state_type: i64,
    #[serde(default)]
    pub acknowledged: i64,
    #[serde(default)]
    pub acknowledgement_type: i64,
    #[serde(default)]
    pub scheduled_downtime_depth: i64,
    #[serde(default)]
    pub current_notification_number: i64,

    #[serde(default)]
    pub checks_enabled: i64,
    #[serde(default)]
    pub accept_passive_checks: i64,
    #[serde(default)]
    pub event_handler_enabled: i64,
    #[serde(default)]
    pub notifications_enabled: i64,
    #[serde(default)]
    pub flap_detection_enabled: i64,
    #[serde(default)]
    pub process_performance_data: i64,
    #[serde(default)]
    pub obsess_over_service: i64,
    #[serde(default)]
    pub is_flapping: i64,
    #[serde(default)]
    pub is_executing: i64,

    #[serde(default)]
    pub last_check: i64,
    #[serde(default)]
    pub next_check: i64,
    #[serde(default)]
    pub last_state_change: i64,
    #[serde(default)]
    pub last_hard_state_change: i64,
    #[serde(default)]
    pub last_time_ok: i64,
    #[serde(default)]
    pub last_time_warning: i64,
    #[serde(default)]
    pub last_time_critical: i64,
    #[serde(default)]
    pub last_time_unknown: i64,
    #[serde(default)]
    pub last_notification: i64,
    #[serde(default)]
    pub next_notification: i64,

    #[serde(default)]
    pub check_interval: f64,
    #[serde(default)]
    pub retry_interval: f64,
    #[serde(default)]
    pub notification_interval: f64,
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub percent_state_change: f64,

    #[serde(default)]
    pub modified_attributes: u32,

    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub contact_groups: Vec<String>,
    /// Servicegroup names this service belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub custom_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hostgroup {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_url: String,
    #[serde(default)]
    pub action_url: String,
    /// Indices into [`DaemonView::hosts`].
    #[serde(default)]
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Servicegroup {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_url: String,
    #[serde(default)]
    pub action_url: String,
    /// Indices into [`DaemonView::services`].
    #[serde(default)]
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub pager: String,
    #[serde(default)]
    pub host_notification_period: String,
    #[serde(default)]
    pub service_notification_period: String,
    #[serde(default)]
    pub host_notifications_enabled: i64,
    #[serde(default)]
    pub service_notifications_enabled: i64,
    #[serde(default)]
    pub can_submit_commands: i64,
    #[serde(default)]
    pub modified_attributes: u32,
    #[serde(default)]
    pub custom_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contactgroup {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    /// Contact names.
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub line: String,
}

/// A named timeperiod. Whether it is active is asked through
/// [`DaemonView::timeperiod_active`], so views backed by a live daemon can
/// answer from the real schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeperiod {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Downtime {
    pub id: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub entry_time: i64,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub fixed: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub triggered_by: i64,
    /// Index into [`DaemonView::hosts`].
    #[serde(default)]
    pub host: usize,
    /// Index into [`DaemonView::services`], `None` for host downtimes.
    #[serde(default)]
    pub service: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub entry_time: i64,
    #[serde(default)]
    pub entry_type: i64,
    #[serde(default)]
    pub persistent: i64,
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub expire_time: i64,
    /// Index into [`DaemonView::hosts`].
    #[serde(default)]
    pub host: usize,
    /// Index into [`DaemonView::services`], `None` for host comments.
    #[serde(default)]
    pub service: Option<usize>,
}

/// One line of the daemon's history log, pre-parsed by the log cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: i64,
    #[serde(default)]
    pub lineno: i64,
    /// Coarse classification (0 info, 1 alert, 2 program, 3 notification,
    /// 4 passive, 5 command, 6 state, 7 text).
    #[serde(default)]
    pub class: i64,
    /// The keyword before the colon, e.g. `SERVICE ALERT`.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Unparsed text after the keyword.
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub state_type: String,
    #[serde(default)]
    pub attempt: i64,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub command_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub service_description: String,
}

/// Daemon-global toggles and gauges surfaced by the status table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    #[serde(default)]
    pub program_start: i64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub last_command_check: i64,
    #[serde(default)]
    pub last_log_rotation: i64,
    #[serde(default)]
    pub enable_notifications: i64,
    #[serde(default)]
    pub execute_service_checks: i64,
    #[serde(default)]
    pub accept_passive_service_checks: i64,
    #[serde(default)]
    pub execute_host_checks: i64,
    #[serde(default)]
    pub accept_passive_host_checks: i64,
    #[serde(default)]
    pub enable_event_handlers: i64,
    #[serde(default)]
    pub obsess_over_services: i64,
    #[serde(default)]
    pub obsess_over_hosts: i64,
    #[serde(default)]
    pub check_service_freshness: i64,
    #[serde(default)]
    pub check_host_freshness: i64,
    #[serde(default)]
    pub enable_flap_detection: i64,
    #[serde(default)]
    pub process_performance_data: i64,
    #[serde(default)]
    pub check_external_commands: i64,
    #[serde(default)]
    pub interval_length: i64,
    #[serde(default)]
    pub program_version: String,
    #[serde(default)]
    pub cached_log_messages: i64,
}

/// Read-side interface the host daemon implements for the engine.
///
/// All slice getters must return stable storage for the duration of one
/// scan; the daemon guarantees this by holding its state lock shared while
/// a query runs.
pub trait DaemonView: Send + Sync {
    fn hosts(&self) -> &[Host];
    fn services(&self) -> &[Service];
    fn hostgroups(&self) -> &[Hostgroup];
    fn servicegroups(&self) -> &[Servicegroup];
    fn contacts(&self) -> &[Contact];
    fn contactgroups(&self) -> &[Contactgroup];
    fn commands(&self) -> &[Command];
    fn timeperiods(&self) -> &[Timeperiod];
    fn downtimes(&self) -> &[Downtime];
    fn comments(&self) -> &[Comment];

    /// Log entries with `since <= time < until`, in retention order
    /// (ascending time).
    fn log_entries(&self, since: i64, until: i64) -> &[LogEntry];

    fn status(&self) -> &StatusInfo;

    fn find_host(&self, name: &str) -> Option<usize>;
    fn find_hostgroup(&self, name: &str) -> Option<usize>;
    fn find_servicegroup(&self, name: &str) -> Option<usize>;
    fn find_contact(&self, name: &str) -> Option<usize>;
    fn find_contactgroup(&self, name: &str) -> Option<usize>;
    fn find_service(&self, host: &str, description: &str) -> Option<usize>;

    /// Resolve a host by whatever the event console put into `event_host`.
    /// Falls back to a case-insensitive name or address match.
    fn host_by_designation(&self, designation: &str) -> Option<usize> {
        self.find_host(designation).or_else(|| {
            self.hosts().iter().position(|h| {
                h.name.eq_ignore_ascii_case(designation)
                    || h.address == designation
            })
        })
    }

    fn is_member_of_contactgroup(&self, group: &str, contact: &Contact) -> bool {
        self.find_contactgroup(group)
            .map(|i| {
                self.contactgroups()[i]
                    .members
                    .iter()
                    .any(|m| *m == contact.name)
            })
            .unwrap_or(false)
    }

    /// Whether the named timeperiod is active at `at` (unix seconds).
    /// An unknown or empty name counts as always active.
    fn timeperiod_active(&self, name: &str, at: i64) -> bool;

    /// Expand `$HOSTNAME$`-style macros in a template.
    fn expand_macros(&self, template: &str, host: &Host, service: Option<&Service>) -> String {
        expand_standard_macros(template, host, service)
    }

    /// Base directory of PNP4Nagios graph files, if configured.
    fn pnp_path(&self) -> Option<&Path> {
        None
    }

    /// Base directory of HW/SW inventory blobs, if configured.
    fn mk_inventory_path(&self) -> Option<&Path> {
        None
    }

    /// Base directory of logwatch spool files, if configured.
    fn logwatch_path(&self) -> Option<&Path> {
        None
    }

    /// Unix socket of the sibling event-console daemon, if enabled.
    fn event_console_path(&self) -> Option<&Path> {
        None
    }

    /// Forward an external command line to the daemon's command pipe.
    fn submit_command(&self, command: &str);
}

/// Substitute the standard host/service macros. Unknown macros are left
/// in place, custom variables resolve through `$_HOSTNAME$` / `$_SERVICENAME$`.
pub fn expand_standard_macros(template: &str, host: &Host, service: Option<&Service>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('$') {
            None => {
                out.push('$');
                rest = after;
            }
            Some(end) => {
                let name = &after[..end];
                match macro_value(name, host, service) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('$');
                        out.push_str(name);
                        out.push('$');
                    }
                }
                rest = &after[end + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn macro_value(name: &str, host: &Host, service: Option<&Service>) -> Option<String> {
    if let Some(var) = name.strip_prefix("_HOST") {
        return custom_var(&host.custom_variables, var);
    }
    if let Some(var) = name.strip_prefix("_SERVICE") {
        return custom_var(&service?.custom_variables, var);
    }
    let value = match name {
        "HOSTNAME" => &host.name,
        "HOSTDISPLAYNAME" => &host.display_name,
        "HOSTALIAS" => &host.alias,
        "HOSTADDRESS" => &host.address,
        "HOSTOUTPUT" => &host.plugin_output,
        "HOSTPERFDATA" => &host.perf_data,
        "HOSTCHECKCOMMAND" => &host.check_command,
        "SERVICEDESC" => &service?.description,
        "SERVICEDISPLAYNAME" => &service?.display_name,
        "SERVICEOUTPUT" => &service?.plugin_output,
        "SERVICEPERFDATA" => &service?.perf_data,
        "SERVICECHECKCOMMAND" => &service?.check_command,
        _ => return None,
    };
    Some(value.clone())
}

fn custom_var(vars: &[(String, String)], name: &str) -> Option<String> {
    vars.iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host {
            name: "web01".into(),
            address: "10.0.0.1".into(),
            custom_variables: vec![("SITE".into(), "muc".into())],
            ..Host::default()
        }
    }

    #[test]
    fn test_macro_expansion() {
        let h = host();
        assert_eq!(
            expand_standard_macros("check!$HOSTNAME$!$HOSTADDRESS$", &h, None),
            "check!web01!10.0.0.1"
        );
    }

    #[test]
    fn test_custom_variable_macro() {
        let h = host();
        assert_eq!(expand_standard_macros("$_HOSTSITE$", &h, None), "muc");
    }

    #[test]
    fn test_unknown_macro_kept() {
        let h = host();
        assert_eq!(expand_standard_macros("$NOPE$", &h, None), "$NOPE$");
        assert_eq!(expand_standard_macros("50$ only", &h, None), "50$ only");
    }

    #[test]
    fn test_service_macros_need_service() {
        let h = host();
        let s = Service {
            description: "cpu load".into(),
            ..Service::default()
        };
        assert_eq!(expand_standard_macros("$SERVICEDESC$", &h, None), "$SERVICEDESC$");
        assert_eq!(expand_standard_macros("$SERVICEDESC$", &h, Some(&s)), "cpu load");
    }
}
