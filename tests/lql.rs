//! End-to-end protocol tests
//!
//! Every test drives a full request through `Engine::serve_connection`
//! against a small static world and checks the exact wire bytes.

use std::io::Cursor;
use std::sync::Arc;

use monq::{Engine, EngineConfig, StaticWorld};

fn world_json() -> &'static str {
    r#"{
        "hosts": [
            {"name": "h1", "alias": "first", "state": 0, "has_been_checked": 1,
             "groups": ["web"], "contacts": [], "contact_groups": ["all"],
             "services": [0], "last_check": 1000, "latency": 1.0},
            {"name": "h2", "alias": "second", "state": 1, "has_been_checked": 1,
             "groups": ["linux"], "contacts": ["bob"],
             "services": [1], "last_check": 2000, "latency": 2.0},
            {"name": "h3", "alias": "third", "state": 0, "has_been_checked": 1,
             "groups": [], "contacts": [],
             "services": [], "last_check": 3000, "latency": 4.0}
        ],
        "services": [
            {"description": "ping", "host": 0, "state": 0, "has_been_checked": 1,
             "groups": ["net"]},
            {"description": "ssh", "host": 1, "state": 2, "has_been_checked": 1,
             "state_type": 1, "groups": ["net"]}
        ],
        "hostgroups": [
            {"name": "web", "alias": "Web servers", "members": [0]},
            {"name": "linux", "alias": "Linux boxes", "members": [1]}
        ],
        "servicegroups": [
            {"name": "net", "alias": "Network", "members": [0, 1]}
        ],
        "contacts": [
            {"name": "alice"},
            {"name": "bob"}
        ],
        "contactgroups": [
            {"name": "all", "members": ["alice"]}
        ],
        "commands": [
            {"name": "check-ping", "line": "/usr/lib/check_ping $HOSTADDRESS$"}
        ],
        "timeperiods": [
            {"name": "24x7", "alias": "Always", "active": true},
            {"name": "never", "alias": "Never", "active": false}
        ],
        "downtimes": [
            {"id": 17, "author": "alice", "comment": "maintenance",
             "start_time": 100, "end_time": 200, "host": 1}
        ],
        "comments": [
            {"id": 5, "author": "bob", "comment": "known issue", "host": 1,
             "service": 1, "entry_type": 1}
        ],
        "log": [
            {"time": 100, "class": 1, "type": "HOST ALERT", "host_name": "h2",
             "state": 0, "message": "[100] HOST ALERT: h2;UP", "plugin_output": "up"},
            {"time": 150, "class": 5, "type": "EXTERNAL COMMAND",
             "message": "[150] EXTERNAL COMMAND: X"},
            {"time": 200, "class": 1, "type": "HOST ALERT", "host_name": "h2",
             "state": 1, "message": "[200] HOST ALERT: h2;DOWN", "plugin_output": "down"},
            {"time": 300, "class": 1, "type": "HOST ALERT", "host_name": "h2",
             "state": 0, "message": "[300] HOST ALERT: h2;UP", "plugin_output": "up"}
        ],
        "status": {"program_start": 500, "pid": 42, "enable_notifications": 1,
                   "program_version": "5.0.1"}
    }"#
}

fn engine() -> Engine {
    let world = StaticWorld::from_json(world_json()).unwrap();
    Engine::new(Arc::new(world), EngineConfig::default())
}

fn run(engine: &Engine, request: &str) -> String {
    let mut response = Vec::new();
    engine
        .serve_connection(Cursor::new(request.to_string()), &mut response)
        .unwrap();
    String::from_utf8(response).unwrap()
}

#[test]
fn filter_on_state_renders_matching_row() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name state\nFilter: state = 1\nOutputFormat: csv\n\n",
    );
    assert_eq!(response, "h2;1\n");
}

#[test]
fn case_insensitive_regex_matches_all() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: name ~~ ^H\nOutputFormat: csv\n\n",
    );
    assert_eq!(response, "h1\nh2\nh3\n");
}

#[test]
fn stats_group_by_name() {
    let response = run(
        &engine(),
        "GET hosts\nStats: state = 0\nStats: state = 1\nStatsGroupBy: name\n\n",
    );
    assert_eq!(response, "h1;1;0\nh2;0;1\nh3;1;0\n");
}

#[test]
fn or_of_two_filters() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: state = 0\nFilter: state = 1\nOr: 2\n\n",
    );
    assert_eq!(response, "h1\nh2\nh3\n");
}

#[test]
fn group_membership_uses_index() {
    let response = run(&engine(), "GET hosts\nColumns: name\nFilter: groups >= linux\n\n");
    assert_eq!(response, "h2\n");
    // An unknown group short-circuits to an empty result.
    let response = run(&engine(), "GET hosts\nColumns: name\nFilter: groups >= nope\n\n");
    assert_eq!(response, "");
}

#[test]
fn index_and_linear_scan_agree() {
    // Membership via `>=` is pushed down to the group index; an anchored
    // regex on the same list is not, but selects the same hosts.
    let indexed = run(&engine(), "GET hosts\nColumns: name\nFilter: groups >= linux\n\n");
    let linear = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: groups ~ ^linux$\n\n",
    );
    assert_eq!(indexed, linear);
}

#[test]
fn event_console_unreachable_is_502() {
    let mut world = StaticWorld::from_json(world_json()).unwrap();
    world.event_console_path = Some("/nonexistent/mkeventd/status".into());
    let engine = Engine::new(Arc::new(world), EngineConfig::default());
    let response = run(
        &engine,
        "GET eventconsoleevents\nColumns: event_id\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("502 "), "got: {}", response);
    let body = &response[16..];
    assert_eq!(body.lines().count(), 1);
}

#[test]
fn event_console_disabled_is_empty() {
    let response = run(&engine(), "GET eventconsoleevents\nColumns: event_id\n\n");
    assert_eq!(response, "");
}

#[test]
fn fixed16_header_carries_length() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: state = 1\nResponseHeader: fixed16\n\n",
    );
    assert_eq!(&response[..16], "200 00000000003\n");
    assert_eq!(&response[16..], "h2\n");
}

#[test]
fn negate_inverts_filter() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: state = 1\nNegate:\n\n",
    );
    assert_eq!(response, "h1\nh3\n");
}

#[test]
fn limit_yields_prefix() {
    let full = run(&engine(), "GET hosts\nColumns: name\n\n");
    let limited = run(&engine(), "GET hosts\nColumns: name\nLimit: 2\n\n");
    assert_eq!(limited, "h1\nh2\n");
    assert!(full.starts_with(&limited));
    let zero = run(&engine(), "GET hosts\nColumns: name\nLimit: 0\n\n");
    assert_eq!(zero, "");
}

#[test]
fn auth_user_sees_only_own_hosts() {
    // alice is in contactgroup "all", which is attached to h1 only.
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nAuthUser: alice\n\n",
    );
    assert_eq!(response, "h1\n");
    // unknown contacts see nothing
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nAuthUser: nobody\n\n",
    );
    assert_eq!(response, "");
}

#[test]
fn auth_user_service_through_host() {
    // Loose service authorization grants "ping" through h1's contactgroup.
    let response = run(
        &engine(),
        "GET services\nColumns: description\nAuthUser: alice\n\n",
    );
    assert_eq!(response, "ping\n");
}

#[test]
fn json_output_is_nested_arrays() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name state groups\nFilter: name = h2\nOutputFormat: json\n\n",
    );
    assert_eq!(response, "[[\"h2\",1,[\"linux\"]]]\n");
}

#[test]
fn wrapped_json_names_columns() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: name = h1\nOutputFormat: wrapped_json\n\n",
    );
    assert_eq!(
        response,
        "{\"columns\":[\"name\"],\"rows\":[[\"h1\"]]}\n"
    );
}

#[test]
fn python_output() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name state\nFilter: name = h1\nOutputFormat: python\n\n",
    );
    assert_eq!(response, "[['h1',0]]\n");
}

#[test]
fn custom_separators() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name groups\nFilter: name = h2\nSeparators: 10 9 44 124\n\n",
    );
    assert_eq!(response, "h2\tlinux\n");
}

#[test]
fn default_columns_include_header_row() {
    let response = run(&engine(), "GET commands\n\n");
    assert_eq!(response, "name;line\ncheck-ping;/usr/lib/check_ping $HOSTADDRESS$\n");
}

#[test]
fn column_header_suppressed_with_explicit_columns() {
    let response = run(&engine(), "GET commands\nColumns: name\n\n");
    assert_eq!(response, "check-ping\n");
}

#[test]
fn prefix_stripped_column_names() {
    let a = run(&engine(), "GET hosts\nColumns: name\n\n");
    let b = run(&engine(), "GET hosts\nColumns: host_name\n\n");
    assert_eq!(a, b);
}

#[test]
fn unknown_column_is_404() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: nonsense\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("404 "), "got: {}", response);
}

#[test]
fn unknown_header_is_400() {
    let response = run(
        &engine(),
        "GET hosts\nBogus: yes\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("400 "), "got: {}", response);
}

#[test]
fn list_equal_nonempty_reference_is_rejected() {
    let response = run(
        &engine(),
        "GET hosts\nFilter: groups = linux\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("400 "), "got: {}", response);
}

#[test]
fn list_empty_check() {
    let response = run(&engine(), "GET hosts\nColumns: name\nFilter: groups = \n\n");
    assert_eq!(response, "h3\n");
    let response = run(&engine(), "GET hosts\nColumns: name\nFilter: groups != \n\n");
    assert_eq!(response, "h1\nh2\n");
}

#[test]
fn stats_without_group_reports_zero_on_empty_scan() {
    let response = run(
        &engine(),
        "GET hosts\nFilter: name = missing\nStats: state = 0\n\n",
    );
    assert_eq!(response, "0\n");
}

#[test]
fn stats_aggregators() {
    let response = run(&engine(), "GET hosts\nStats: sum latency\nStats: avg latency\n\n");
    assert_eq!(response, "7;2.3333333333333335\n");
    let response = run(&engine(), "GET hosts\nStats: min latency\nStats: max latency\n\n");
    assert_eq!(response, "1;4\n");
}

#[test]
fn stats_and_combination() {
    // hosts that are up AND named h1
    let response = run(
        &engine(),
        "GET hosts\nStats: state = 0\nStats: name = h1\nStatsAnd: 2\n\n",
    );
    assert_eq!(response, "1\n");
}

#[test]
fn servicegroups_members_pairs() {
    let response = run(
        &engine(),
        "GET servicegroups\nColumns: name members\n\n",
    );
    assert_eq!(response, "net;h1|ping,h2|ssh\n");
}

#[test]
fn hostgroup_rollups() {
    let response = run(
        &engine(),
        "GET hostgroups\nColumns: name num_hosts num_hosts_down num_services\nFilter: name = linux\n\n",
    );
    assert_eq!(response, "linux;1;1;1\n");
}

#[test]
fn log_table_respects_time_window() {
    let response = run(
        &engine(),
        "GET log\nColumns: time type state\nFilter: time >= 150\nFilter: time < 250\nFilter: class = 1\n\n",
    );
    assert_eq!(response, "200;HOST ALERT;1\n");
}

#[test]
fn statehistory_builds_spans() {
    let response = run(
        &engine(),
        "GET statehistory\nColumns: from until duration state host_name\nFilter: time >= 100\nFilter: time <= 300\n\n",
    );
    assert_eq!(response, "100;200;100;0;h2\n200;300;100;1;h2\n300;301;1;0;h2\n");
}

#[test]
fn downtimes_join_host_columns() {
    let response = run(
        &engine(),
        "GET downtimes\nColumns: id author host_name is_service\n\n",
    );
    assert_eq!(response, "17;alice;h2;0\n");
}

#[test]
fn comments_join_service_columns() {
    let response = run(
        &engine(),
        "GET comments\nColumns: id service_description is_service\n\n",
    );
    assert_eq!(response, "5;ssh;1\n");
}

#[test]
fn host_downtime_ids_column() {
    let response = run(&engine(), "GET hosts\nColumns: name downtimes\nFilter: name = h2\n\n");
    assert_eq!(response, "h2;17\n");
}

#[test]
fn timeperiods_in_column() {
    let response = run(&engine(), "GET timeperiods\nColumns: name in\n\n");
    assert_eq!(response, "24x7;1\nnever;0\n");
}

#[test]
fn status_table_single_row() {
    let response = run(
        &engine(),
        "GET status\nColumns: pid program_version num_hosts num_services requests\n\n",
    );
    assert_eq!(response, "42;5.0.1;3;2;1\n");
}

#[test]
fn columns_metatable_lists_tables() {
    let response = run(
        &engine(),
        "GET columns\nColumns: table name\nFilter: table = commands\n\n",
    );
    assert_eq!(response, "commands;name\ncommands;line\n");
}

#[test]
fn wait_timeout_falls_through() {
    let start = std::time::Instant::now();
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: name = h2\nWaitObject: h2\nWaitCondition: state = 0\nWaitTimeout: 50\nWaitTrigger: state\n\n",
    );
    assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    assert_eq!(response, "h2\n");
}

#[test]
fn wait_condition_already_true_returns_immediately() {
    let start = std::time::Instant::now();
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nFilter: name = h2\nWaitObject: h2\nWaitCondition: state = 1\nWaitTimeout: 5000\n\n",
    );
    assert!(start.elapsed() < std::time::Duration::from_secs(2));
    assert_eq!(response, "h2\n");
}

#[test]
fn command_is_forwarded() {
    let world = Arc::new(StaticWorld::from_json(world_json()).unwrap());
    let engine = Engine::new(Arc::clone(&world) as Arc<dyn monq::DaemonView>, EngineConfig::default());
    let response = run(&engine, "COMMAND [123] DISABLE_NOTIFICATIONS\n\n");
    assert_eq!(response, "");
    assert_eq!(
        world.submitted_commands(),
        vec!["[123] DISABLE_NOTIFICATIONS".to_string()]
    );
}

#[test]
fn response_size_cap_is_413() {
    let world = StaticWorld::from_json(world_json()).unwrap();
    let config = EngineConfig {
        max_response_size: 4,
        ..EngineConfig::default()
    };
    let engine = Engine::new(Arc::new(world), config);
    let mut out = monq::OutputBuffer::new(4);
    let lines: Vec<String> = ["GET hosts", "Columns: name"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    engine.answer_request(&lines, &mut out);
    assert_eq!(out.code(), monq::ResponseCode::TooLarge);
}

#[test]
fn keepalive_two_requests_one_connection() {
    let engine = engine();
    let request = "GET hosts\nColumns: name\nFilter: state = 1\nKeepAlive: on\n\nGET status\nColumns: pid\n\n";
    let response = run(&engine, request);
    assert_eq!(response, "h2\n42\n");
}

#[test]
fn modified_attributes_filter_accepts_names() {
    let mut world = StaticWorld::from_json(world_json()).unwrap();
    world.hosts[0].modified_attributes = 1; // notifications_enabled
    let engine = Engine::new(Arc::new(world), EngineConfig::default());
    let response = run(
        &engine,
        "GET hosts\nColumns: name modified_attributes_list\nFilter: modified_attributes = notifications_enabled\n\n",
    );
    assert_eq!(response, "h1;notifications_enabled\n");
}

#[test]
fn time_limit_zero_aborts_with_452() {
    let response = run(
        &engine(),
        "GET hosts\nColumns: name\nTimelimit: 0\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("452 "), "got: {}", response);
}

#[test]
fn localtime_shifts_time_columns() {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let request = format!(
        "GET hosts\nColumns: last_check\nFilter: name = h1\nLocaltime: {}\n\n",
        now + 1800
    );
    let response = run(&engine(), &request);
    assert_eq!(response, "2800\n");
}

#[test]
fn encoding_header_selects_blob_lift() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("h1"), [0xe4u8]).unwrap();
    let mut world = StaticWorld::from_json(world_json()).unwrap();
    world.mk_inventory_path = Some(dir.path().to_path_buf());
    let engine = Engine::new(Arc::new(world), EngineConfig::default());

    let latin1 = run(
        &engine,
        "GET hosts\nColumns: mk_inventory\nFilter: name = h1\nOutputFormat: json\nEncoding: latin1\n\n",
    );
    assert_eq!(latin1, "[[\"\u{e4}\"]]\n");

    // Without the header the configured default (utf8) decodes lossily.
    let utf8 = run(
        &engine,
        "GET hosts\nColumns: mk_inventory\nFilter: name = h1\nOutputFormat: json\n\n",
    );
    assert_eq!(utf8, "[[\"\u{fffd}\"]]\n");
}

#[test]
fn invalid_encoding_is_400() {
    let response = run(
        &engine(),
        "GET hosts\nEncoding: ebcdic\nResponseHeader: fixed16\n\n",
    );
    assert!(response.starts_with("400 "), "got: {}", response);
}
