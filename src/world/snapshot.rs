//! A serde-loadable, self-contained [`DaemonView`]
//!
//! `StaticWorld` backs the standalone server binary and the test suite: a
//! full world snapshot is deserialized from JSON, name indexes are built
//! once, and the result serves queries without a live daemon behind it.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::world::{
    Command, Comment, Contact, Contactgroup, DaemonView, Downtime, Host, Hostgroup, LogEntry,
    Service, Servicegroup, StatusInfo, Timeperiod,
};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StaticWorld {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub hostgroups: Vec<Hostgroup>,
    #[serde(default)]
    pub servicegroups: Vec<Servicegroup>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub contactgroups: Vec<Contactgroup>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub timeperiods: Vec<Timeperiod>,
    #[serde(default)]
    pub downtimes: Vec<Downtime>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Must be sorted by time ascending.
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub status: StatusInfo,

    #[serde(default)]
    pub pnp_path: Option<PathBuf>,
    #[serde(default)]
    pub mk_inventory_path: Option<PathBuf>,
    #[serde(default)]
    pub logwatch_path: Option<PathBuf>,
    #[serde(default)]
    pub event_console_path: Option<PathBuf>,

    #[serde(skip)]
    host_index: HashMap<String, usize>,
    #[serde(skip)]
    hostgroup_index: HashMap<String, usize>,
    #[serde(skip)]
    servicegroup_index: HashMap<String, usize>,
    #[serde(skip)]
    contact_index: HashMap<String, usize>,
    #[serde(skip)]
    contactgroup_index: HashMap<String, usize>,

    /// Commands received through `submit_command`, kept for inspection.
    #[serde(skip)]
    submitted: Mutex<Vec<String>>,
}

impl StaticWorld {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let world: StaticWorld = serde_json::from_reader(BufReader::new(file))?;
        world.finish()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let world: StaticWorld = serde_json::from_str(json)?;
        world.finish()
    }

    /// Validate cross references and build the name indexes.
    pub fn finish(mut self) -> Result<Self> {
        for (i, svc) in self.services.iter().enumerate() {
            if svc.host >= self.hosts.len() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "service #{} '{}' references host #{} out of range",
                    i, svc.description, svc.host
                )));
            }
        }
        for host in &self.hosts {
            if let Some(&s) = host.services.iter().find(|&&s| s >= self.services.len()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "host '{}' references service #{} out of range",
                    host.name, s
                )));
            }
        }
        for dt in &self.downtimes {
            if dt.host >= self.hosts.len() || dt.service.is_some_and(|s| s >= self.services.len()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "downtime #{} references an unknown object",
                    dt.id
                )));
            }
        }
        for c in &self.comments {
            if c.host >= self.hosts.len() || c.service.is_some_and(|s| s >= self.services.len()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "comment #{} references an unknown object",
                    c.id
                )));
            }
        }

        self.host_index = index_of(&self.hosts, |h| &h.name);
        self.hostgroup_index = index_of(&self.hostgroups, |g| &g.name);
        self.servicegroup_index = index_of(&self.servicegroups, |g| &g.name);
        self.contact_index = index_of(&self.contacts, |c| &c.name);
        self.contactgroup_index = index_of(&self.contactgroups, |g| &g.name);
        Ok(self)
    }
}

fn index_of<T>(items: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (key(item).clone(), i))
        .collect()
}

impl DaemonView for StaticWorld {
    fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    fn services(&self) -> &[Service] {
        &self.services
    }

    fn hostgroups(&self) -> &[Hostgroup] {
        &self.hostgroups
    }

    fn servicegroups(&self) -> &[Servicegroup] {
        &self.servicegroups
    }

    fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    fn contactgroups(&self) -> &[Contactgroup] {
        &self.contactgroups
    }

    fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn timeperiods(&self) -> &[Timeperiod] {
        &self.timeperiods
    }

    fn downtimes(&self) -> &[Downtime] {
        &self.downtimes
    }

    fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn log_entries(&self, since: i64, until: i64) -> &[LogEntry] {
        let lo = self.log.partition_point(|e| e.time < since);
        let hi = self.log.partition_point(|e| e.time < until);
        &self.log[lo..hi]
    }

    fn status(&self) -> &StatusInfo {
        &self.status
    }

    fn find_host(&self, name: &str) -> Option<usize> {
        self.host_index.get(name).copied()
    }

    fn find_hostgroup(&self, name: &str) -> Option<usize> {
        self.hostgroup_index.get(name).copied()
    }

    fn find_servicegroup(&self, name: &str) -> Option<usize> {
        self.servicegroup_index.get(name).copied()
    }

    fn find_contact(&self, name: &str) -> Option<usize> {
        self.contact_index.get(name).copied()
    }

    fn find_contactgroup(&self, name: &str) -> Option<usize> {
        self.contactgroup_index.get(name).copied()
    }

    fn find_service(&self, host: &str, description: &str) -> Option<usize> {
        let h = self.find_host(host)?;
        self.hosts[h]
            .services
            .iter()
            .copied()
            .find(|&s| self.services[s].description == description)
    }

    fn timeperiod_active(&self, name: &str, _at: i64) -> bool {
        if name.is_empty() {
            return true;
        }
        self.timeperiods
            .iter()
            .find(|tp| tp.name == name)
            .map(|tp| tp.active)
            .unwrap_or(true)
    }

    fn pnp_path(&self) -> Option<&Path> {
        self.pnp_path.as_deref()
    }

    fn mk_inventory_path(&self) -> Option<&Path> {
        self.mk_inventory_path.as_deref()
    }

    fn logwatch_path(&self) -> Option<&Path> {
        self.logwatch_path.as_deref()
    }

    fn event_console_path(&self) -> Option<&Path> {
        self.event_console_path.as_deref()
    }

    fn submit_command(&self, command: &str) {
        self.submitted.lock().unwrap().push(command.to_string());
    }
}

impl StaticWorld {
    /// Commands received so far, oldest first.
    pub fn submitted_commands(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_snapshot() {
        let world = StaticWorld::from_json(
            r#"{
                "hosts": [{"name": "h1", "state": 0, "services": [0]}],
                "services": [{"description": "ping", "host": 0, "state": 2}]
            }"#,
        )
        .unwrap();
        assert_eq!(world.hosts().len(), 1);
        assert_eq!(world.find_host("h1"), Some(0));
        assert_eq!(world.find_service("h1", "ping"), Some(0));
        assert_eq!(world.find_service("h1", "nope"), None);
    }

    #[test]
    fn test_dangling_service_host_rejected() {
        let err = StaticWorld::from_json(
            r#"{"services": [{"description": "ping", "host": 3}]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_log_window() {
        let mut world = StaticWorld::default();
        for t in [10, 20, 30, 40] {
            world.log.push(LogEntry {
                time: t,
                ..LogEntry::default()
            });
        }
        let world = world.finish().unwrap();
        let window = world.log_entries(15, 40);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].time, 20);
        assert_eq!(window[1].time, 30);
    }

    #[test]
    fn test_host_by_designation_case_insensitive() {
        let mut world = StaticWorld::default();
        world.hosts.push(Host {
            name: "Web01".into(),
            address: "10.1.2.3".into(),
            ..Host::default()
        });
        let world = world.finish().unwrap();
        assert_eq!(world.host_by_designation("web01"), Some(0));
        assert_eq!(world.host_by_designation("10.1.2.3"), Some(0));
        assert_eq!(world.host_by_designation("other"), None);
    }
}
