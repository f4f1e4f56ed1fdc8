//! Derived column behaviours
//!
//! Attribute-list bitmask decoding, service/host list state rollups, custom
//! variable projections, timeperiod membership and the file-backed blob
//! columns. Tables build their derived columns from these helpers.

use std::borrow::Cow;
use std::path::Path;

use crate::column::RowCtx;
use crate::world::{
    DaemonView, Host, Service, HOST_DOWN, HOST_UNREACHABLE, HOST_UP, STATE_CRITICAL, STATE_OK,
    STATE_UNKNOWN, STATE_WARNING,
};

/// Modified-attribute bits, in bit order.
pub const KNOWN_ATTRIBUTES: [(&str, u32); 17] = [
    ("notifications_enabled", 1 << 0),
    ("active_checks_enabled", 1 << 1),
    ("passive_checks_enabled", 1 << 2),
    ("event_handler_enabled", 1 << 3),
    ("flap_detection_enabled", 1 << 4),
    ("failure_prediction_enabled", 1 << 5),
    ("performance_data_enabled", 1 << 6),
    ("obsessive_handler_enabled", 1 << 7),
    ("event_handler_command", 1 << 8),
    ("check_command", 1 << 9),
    ("normal_check_interval", 1 << 10),
    ("retry_check_interval", 1 << 11),
    ("max_check_attempts", 1 << 12),
    ("freshness_checks_enabled", 1 << 13),
    ("check_timeperiod", 1 << 14),
    ("custom_variable", 1 << 15),
    ("notification_timeperiod", 1 << 16),
];

/// Names of the bits set in `mask`, in bit order.
pub fn attribute_names(mask: u32) -> Vec<Cow<'static, str>> {
    KNOWN_ATTRIBUTES
        .iter()
        .filter(|(_, bit)| mask & bit != 0)
        .map(|(name, _)| Cow::Borrowed(*name))
        .collect()
}

/// Fold a comma-separated list of attribute names into a mask. Unknown
/// names are logged and skipped, never fatal.
pub fn parse_attribute_names(value: &str) -> u32 {
    let mut mask = 0;
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match KNOWN_ATTRIBUTES.iter().find(|(name, _)| *name == token) {
            Some((_, bit)) => mask |= bit,
            None => tracing::info!("ignoring invalid value '{}' for attribute list", token),
        }
    }
    mask
}

/// Projections of a service list onto one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceListState {
    Num,
    NumPending,
    NumOk,
    NumWarn,
    NumCrit,
    NumUnknown,
    WorstState,
    NumHardOk,
    NumHardWarn,
    NumHardCrit,
    NumHardUnknown,
    WorstHardState,
}

/// Severity order for "worst": OK < WARN < UNKNOWN < CRIT.
fn state_weight(state: i64) -> i64 {
    match state {
        STATE_OK => 0,
        STATE_WARNING => 1,
        STATE_UNKNOWN => 2,
        _ => 3,
    }
}

/// Reduce the services reachable through `members` to one number.
pub fn service_list_state<'a>(
    members: impl Iterator<Item = &'a Service>,
    which: ServiceListState,
) -> i64 {
    let mut count = 0;
    let mut worst = 0;
    for svc in members {
        let checked = svc.has_been_checked != 0;
        // A hard state only exists once the service has been checked.
        let hard_state = if svc.state_type == 1 {
            svc.state
        } else {
            svc.last_hard_state
        };
        match which {
            ServiceListState::Num => count += 1,
            ServiceListState::NumPending => count += i64::from(!checked),
            ServiceListState::NumOk => count += i64::from(checked && svc.state == STATE_OK),
            ServiceListState::NumWarn => count += i64::from(checked && svc.state == STATE_WARNING),
            ServiceListState::NumCrit => count += i64::from(checked && svc.state == STATE_CRITICAL),
            ServiceListState::NumUnknown => {
                count += i64::from(checked && svc.state == STATE_UNKNOWN)
            }
            ServiceListState::WorstState => {
                if checked && state_weight(svc.state) > state_weight(worst) {
                    worst = svc.state;
                }
            }
            ServiceListState::NumHardOk => count += i64::from(checked && hard_state == STATE_OK),
            ServiceListState::NumHardWarn => {
                count += i64::from(checked && hard_state == STATE_WARNING)
            }
            ServiceListState::NumHardCrit => {
                count += i64::from(checked && hard_state == STATE_CRITICAL)
            }
            ServiceListState::NumHardUnknown => {
                count += i64::from(checked && hard_state == STATE_UNKNOWN)
            }
            ServiceListState::WorstHardState => {
                if checked && state_weight(hard_state) > state_weight(worst) {
                    worst = hard_state;
                }
            }
        }
    }
    match which {
        ServiceListState::WorstState | ServiceListState::WorstHardState => worst,
        _ => count,
    }
}

/// Projections of a host list onto one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostListState {
    Num,
    NumPending,
    NumUp,
    NumDown,
    NumUnreach,
    WorstState,
}

pub fn host_list_state<'a>(
    members: impl Iterator<Item = &'a Host>,
    which: HostListState,
) -> i64 {
    let mut count = 0;
    let mut worst = 0;
    for host in members {
        let checked = host.has_been_checked != 0;
        match which {
            HostListState::Num => count += 1,
            HostListState::NumPending => count += i64::from(!checked),
            HostListState::NumUp => count += i64::from(checked && host.state == HOST_UP),
            HostListState::NumDown => count += i64::from(checked && host.state == HOST_DOWN),
            HostListState::NumUnreach => {
                count += i64::from(checked && host.state == HOST_UNREACHABLE)
            }
            HostListState::WorstState => {
                // DOWN beats UNREACHABLE beats UP.
                let hs_weight = |state: i64| match state {
                    HOST_UP => 0,
                    HOST_UNREACHABLE => 1,
                    _ => 2,
                };
                let weight = hs_weight(host.state);
                let worst_weight = hs_weight(worst);
                if checked && weight > worst_weight {
                    worst = host.state;
                }
            }
        }
    }
    match which {
        HostListState::WorstState => worst,
        _ => count,
    }
}

/// Substitute the characters that may not appear in spool file names.
pub fn pnp_cleanup(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

/// 1 if a PNP graph exists for the object, 0 if not, -1 without a PNP path.
pub fn pnpgraph_present(world: &dyn DaemonView, host: &str, service: &str) -> i64 {
    match world.pnp_path() {
        None => -1,
        Some(base) => {
            let path = base
                .join(pnp_cleanup(host))
                .join(format!("{}.xml", pnp_cleanup(service)));
            i64::from(path.exists())
        }
    }
}

/// Contents of a per-host spool file; missing files yield an empty blob.
pub fn host_file_blob(base: Option<&Path>, host: &str, suffix: &str) -> Cow<'static, [u8]> {
    let Some(base) = base else {
        return Cow::Borrowed(&[]);
    };
    let path = base.join(format!("{}{}", pnp_cleanup(host), suffix));
    match std::fs::read(&path) {
        Ok(bytes) => Cow::Owned(bytes),
        Err(_) => Cow::Borrowed(&[]),
    }
}

/// File names in a host's logwatch directory, sorted. Missing directory
/// yields an empty list.
pub fn logwatch_files(base: Option<&Path>, host: &str) -> Vec<Cow<'static, str>> {
    let Some(base) = base else {
        return Vec::new();
    };
    let dir = base.join(pnp_cleanup(host));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names.into_iter().map(Cow::Owned).collect()
}

/// 0/1 whether a timeperiod is active at the query's reference time.
pub fn in_timeperiod(ctx: &RowCtx<'_>, name: &str) -> i64 {
    i64::from(
        ctx.world
            .timeperiod_active(name, ctx.now + ctx.timezone_offset),
    )
}

pub fn custom_variable_names(vars: &[(String, String)]) -> Vec<Cow<'_, str>> {
    vars.iter().map(|(n, _)| Cow::Borrowed(n.as_str())).collect()
}

pub fn custom_variable_values(vars: &[(String, String)]) -> Vec<Cow<'_, str>> {
    vars.iter().map(|(_, v)| Cow::Borrowed(v.as_str())).collect()
}

pub fn custom_variables(vars: &[(String, String)]) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
    vars.iter()
        .map(|(n, v)| (Cow::Borrowed(n.as_str()), Cow::Borrowed(v.as_str())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_attribute_round_trip() {
        let mask = parse_attribute_names("notifications_enabled,check_command");
        assert_eq!(mask, 1 | 512);
        let names = attribute_names(mask);
        assert_eq!(names, vec!["notifications_enabled", "check_command"]);
    }

    #[test]
    fn test_unknown_attribute_ignored() {
        assert_eq!(parse_attribute_names("bogus,active_checks_enabled"), 2);
    }

    #[test]
    fn test_pnp_cleanup() {
        assert_eq!(pnp_cleanup("C:/my host\\x"), "C__my_host_x");
        assert_eq!(pnp_cleanup("plain"), "plain");
    }

    #[test]
    fn test_worst_service_state_ordering() {
        let mk = |state: i64| Service {
            state,
            has_been_checked: 1,
            ..Service::default()
        };
        let services = [mk(0), mk(3), mk(1)];
        let worst = service_list_state(services.iter(), ServiceListState::WorstState);
        // UNKNOWN outranks WARNING
        assert_eq!(worst, 3);
        let with_crit = [mk(0), mk(3), mk(2)];
        let worst = service_list_state(with_crit.iter(), ServiceListState::WorstState);
        assert_eq!(worst, 2);
    }

    #[test]
    fn test_pending_not_counted_in_hard_states() {
        let pending = [Service {
            state: 2,
            has_been_checked: 0,
            ..Service::default()
        }];
        assert_eq!(
            service_list_state(pending.iter(), ServiceListState::NumHardCrit),
            0
        );
        assert_eq!(
            service_list_state(pending.iter(), ServiceListState::NumPending),
            1
        );
    }

    #[test]
    fn test_host_file_blob_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(host_file_blob(Some(dir.path()), "nohost", "").is_empty());

        let mut f = std::fs::File::create(dir.path().join("my_host")).unwrap();
        f.write_all(b"inventory").unwrap();
        assert_eq!(
            host_file_blob(Some(dir.path()), "my host", "").as_ref(),
            b"inventory"
        );
    }

    #[test]
    fn test_logwatch_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("web01")).unwrap();
        std::fs::write(dir.path().join("web01").join("b.log"), b"").unwrap();
        std::fs::write(dir.path().join("web01").join("a.log"), b"").unwrap();
        assert_eq!(
            logwatch_files(Some(dir.path()), "web01"),
            vec!["a.log", "b.log"]
        );
        assert!(logwatch_files(None, "web01").is_empty());
    }
}
