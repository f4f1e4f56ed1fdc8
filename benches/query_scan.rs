//! Scan and filter benchmarks over a synthetic world

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monq::world::{Host, Service};
use monq::{Engine, EngineConfig, OutputBuffer, StaticWorld};

fn synthetic_world(num_hosts: usize, services_per_host: usize) -> StaticWorld {
    let mut world = StaticWorld::default();
    for h in 0..num_hosts {
        let first_service = world.services.len();
        for s in 0..services_per_host {
            world.services.push(Service {
                description: format!("svc{}", s),
                host: h,
                state: (s % 4) as i64,
                has_been_checked: 1,
                ..Service::default()
            });
        }
        world.hosts.push(Host {
            name: format!("host{:05}", h),
            state: (h % 3) as i64,
            has_been_checked: 1,
            latency: h as f64 * 0.01,
            groups: if h % 10 == 0 {
                vec!["every-tenth".to_string()]
            } else {
                Vec::new()
            },
            services: (first_service..first_service + services_per_host).collect(),
            ..Host::default()
        });
    }
    world.hostgroups.push(monq::world::Hostgroup {
        name: "every-tenth".to_string(),
        members: (0..num_hosts).step_by(10).collect(),
        ..monq::world::Hostgroup::default()
    });
    world.finish().unwrap()
}

fn run_query(engine: &Engine, request: &[&str]) -> usize {
    let lines: Vec<String> = request.iter().map(|s| s.to_string()).collect();
    let mut out = OutputBuffer::new(usize::MAX);
    engine.answer_request(&lines, &mut out);
    out.len()
}

fn bench_scans(c: &mut Criterion) {
    let world = synthetic_world(5_000, 10);
    let engine = Engine::new(Arc::new(world), EngineConfig::default());

    c.bench_function("scan_filter_state", |b| {
        b.iter(|| {
            black_box(run_query(
                &engine,
                &["GET hosts", "Columns: name state", "Filter: state = 1"],
            ))
        })
    });

    c.bench_function("scan_group_indexed", |b| {
        b.iter(|| {
            black_box(run_query(
                &engine,
                &["GET hosts", "Columns: name", "Filter: groups >= every-tenth"],
            ))
        })
    });

    c.bench_function("stats_grouped", |b| {
        b.iter(|| {
            black_box(run_query(
                &engine,
                &[
                    "GET services",
                    "Stats: state = 0",
                    "Stats: state = 2",
                    "StatsGroupBy: description",
                ],
            ))
        })
    });

    c.bench_function("rollup_columns", |b| {
        b.iter(|| {
            black_box(run_query(
                &engine,
                &["GET hosts", "Columns: name num_services_crit worst_service_state"],
            ))
        })
    });
}

criterion_group!(benches, bench_scans);
criterion_main!(benches);
