//! End-to-end tests of the sampling pipeline against scripted process tables.
//!
//! Each test drives the public API the way the exporter does: a sampler over
//! a `TestDataProvider`, wrapped in a `Worker` that feeds the text and metric
//! sinks.

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nickstat_exporter::process::{Classifier, TestDataProvider, TestProcess, TestTick};
use nickstat_exporter::sink::{MetricsSink, TextSink, HEADER};
use nickstat_exporter::{EntityKey, LabelMode, Sampler, Worker};

/// Writer whose contents stay readable after it has been moved into a sink.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("capture lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("capture lock").clone();
        String::from_utf8(bytes)
            .expect("utf8")
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Data lines only, without headers and separators.
    fn data_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| !l.is_empty() && l != HEADER)
            .collect()
    }
}

fn default_rules() -> BTreeMap<String, String> {
    [
        ("NOCMD", "^$"),
        ("SYSTEMD", "^(/usr)?/lib/systemd"),
        ("SBIN", "^(/usr)?/sbin"),
        ("BASH", "^-bash$"),
        ("MXOS", "^[^ ]*java .*/mxos/server/bin"),
        ("CASS", "^[^ ]*java .*service.CassandraDaemon"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_reduce() -> BTreeSet<String> {
    ["NOCMD", "SYSTEMD", "SBIN", "BASH"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn sampler(ticks: Vec<TestTick>) -> Sampler<TestDataProvider> {
    Sampler::new(
        TestDataProvider::from_ticks(ticks),
        Classifier::new(&default_rules()).expect("default rules compile"),
        default_reduce(),
        "web01",
    )
}

/// Tick times whose windows start at 12:00:00, 12:00:10, ...
fn tick_at(n: i64) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid local time")
        + ChronoDuration::seconds(10 * (n + 1))
}

fn text_worker(
    sampler: Sampler<TestDataProvider>,
    mode: LabelMode,
) -> (Worker<TestDataProvider>, Captured) {
    let out = Captured::default();
    let mut text = TextSink::new(out.clone(), mode, 0);
    text.write_header().expect("header");
    let worker = Worker::new(sampler, Duration::from_secs(10)).with_sink(Box::new(text));
    (worker, out)
}

#[test]
fn test_sshd_and_reduced_cron() {
    let s = sampler(vec![TestTick {
        processes: vec![
            TestProcess::new(901, "sshd", "sshd: /usr/bin/sshd -D").with_threads(1),
            TestProcess::new(812, "cron", "/usr/sbin/cron -f").with_threads(1),
        ],
    }]);
    let (mut worker, out) = text_worker(s, LabelMode::Slot);

    worker.run_tick(tick_at(0));

    assert_eq!(
        out.lines(),
        vec![
            HEADER.to_string(),
            "2024-03-01T12:00:00 web01 SBIN cron 0 0.0 0 0 0 1 0 0 ^(/usr)?/sbin".to_string(),
            "2024-03-01T12:00:00 web01 sshd sshd 0 0.0 0 0 0 1 0 0 sshd: /usr/bin/sshd -D"
                .to_string(),
            String::new(),
            HEADER.to_string(),
        ]
    );
}

#[test]
fn test_primed_replay_starts_with_first_tick() {
    let s = sampler(vec![
        TestTick {
            processes: vec![TestProcess::new(901, "sshd", "sshd: /usr/bin/sshd -D")],
        },
        TestTick {
            processes: vec![TestProcess::new(950, "nginx", "nginx: master process")],
        },
    ]);
    let (mut worker, out) = text_worker(s, LabelMode::Pid);

    worker.sampler_mut().prime();
    worker.run_tick(tick_at(0));
    worker.run_tick(tick_at(1));

    let lines = out.data_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("2024-03-01T12:00:00 web01 sshd sshd 901 "));
    assert!(lines[1].starts_with("2024-03-01T12:00:10 web01 nginx nginx 950 "));
}

#[test]
fn test_three_sbin_processes_are_summed() {
    let s = sampler(vec![TestTick {
        processes: vec![
            TestProcess::new(812, "cron", "/usr/sbin/cron -f")
                .with_cpu(1.0, 0.6, 0.4, 0.0)
                .with_threads(1)
                .with_memory(4096 * 1024, 100 * 1024),
            TestProcess::new(820, "rsyslogd", "/usr/sbin/rsyslogd -n")
                .with_cpu(2.5, 2.0, 0.5, 0.0)
                .with_threads(4)
                .with_memory(8192 * 1024, 100 * 1024),
            TestProcess::new(830, "agetty", "/sbin/agetty tty1")
                .with_cpu(0.5, 0.0, 0.5, 0.0)
                .with_threads(1)
                .with_memory(2048 * 1024, 100 * 1024),
        ],
    }]);
    let (mut worker, out) = text_worker(s, LabelMode::Pid);

    let stats = worker.run_tick(tick_at(0));
    assert_eq!(stats.scanned, 3);
    assert_eq!(stats.records, 1);

    assert_eq!(
        out.data_lines(),
        vec!["2024-03-01T12:00:00 web01 SBIN cron 812 4.0 3 1 0 6 14336 300 ^(/usr)?/sbin"]
    );
}

#[test]
fn test_reduced_group_keeps_slot_across_member_changes() {
    let mut s = sampler(vec![
        TestTick {
            processes: vec![
                TestProcess::new(812, "cron", "/usr/sbin/cron -f"),
                TestProcess::new(820, "rsyslogd", "/usr/sbin/rsyslogd -n"),
            ],
        },
        TestTick {
            processes: vec![TestProcess::new(820, "rsyslogd", "/usr/sbin/rsyslogd -n")],
        },
    ]);

    let first = s.tick("t0");
    let second = s.tick("t1");
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.records[0].members, 2);
    assert_eq!(second.records[0].members, 1);
    assert_eq!(second.records[0].name, "rsyslogd");
    assert_eq!(second.records[0].slot, 0);
    assert_eq!(s.registry().slot_for("SBIN", EntityKey::Group), Some(0));
}

#[test]
fn test_vanished_process_and_slot_reuse() {
    let app = |pid: u32| TestProcess::new(pid, "app", &format!("/opt/app --worker {pid}"));
    let s = sampler(vec![
        TestTick {
            processes: vec![app(100), app(101)],
        },
        // 100 exits and 102 starts in the same tick.
        TestTick {
            processes: vec![app(101), app(102)],
        },
        TestTick {
            processes: vec![app(101), app(102), app(103)],
        },
    ]);
    let (mut worker, out) = text_worker(s, LabelMode::Slot);

    worker.run_tick(tick_at(0));
    worker.run_tick(tick_at(1));
    worker.run_tick(tick_at(2));

    let slots_of = |ts: &str| -> Vec<(String, String)> {
        out.data_lines()
            .iter()
            .filter(|l| l.starts_with(ts))
            .map(|l| {
                let cols: Vec<&str> = l.split(' ').collect();
                (cols[4].to_string(), cols[cols.len() - 1].to_string())
            })
            .collect()
    };

    assert_eq!(
        slots_of("2024-03-01T12:00:00"),
        vec![
            ("0".to_string(), "100".to_string()),
            ("1".to_string(), "101".to_string())
        ]
    );
    // 100 is gone; its slot is still held while 102 is placed.
    assert_eq!(
        slots_of("2024-03-01T12:00:10"),
        vec![
            ("1".to_string(), "101".to_string()),
            ("2".to_string(), "102".to_string())
        ]
    );
    // Slot 0 was released at the end of the previous tick.
    assert_eq!(
        slots_of("2024-03-01T12:00:20"),
        vec![
            ("1".to_string(), "101".to_string()),
            ("2".to_string(), "102".to_string()),
            ("0".to_string(), "103".to_string())
        ]
    );
}

#[test]
fn test_failed_query_on_known_process_drops_it() {
    let s = sampler(vec![
        TestTick {
            processes: vec![TestProcess::new(4242, "java", "/usr/bin/java -jar app.jar")],
        },
        TestTick {
            processes: vec![
                TestProcess::new(4242, "java", "/usr/bin/java -jar app.jar").failing("memory")
            ],
        },
    ]);
    let (mut worker, out) = text_worker(s, LabelMode::Pid);

    let first = worker.run_tick(tick_at(0));
    let second = worker.run_tick(tick_at(1));
    assert_eq!(first.records, 1);
    assert_eq!(second.records, 0);
    assert_eq!(second.vanished, 1);
    assert_eq!(out.data_lines().len(), 1);
    assert_eq!(worker.stats().snapshot().vanished_total, 1);
}

#[test]
fn test_metrics_follow_latest_tick() {
    let s = sampler(vec![
        TestTick {
            processes: vec![
                TestProcess::new(901, "sshd", "sshd: /usr/bin/sshd -D").with_cpu(1.5, 1.0, 0.5, 0.0),
                TestProcess::new(950, "nginx", "nginx: master process").with_threads(2),
            ],
        },
        TestTick {
            processes: vec![
                TestProcess::new(901, "sshd", "sshd: /usr/bin/sshd -D").with_cpu(0.5, 0.5, 0.0, 0.0)
            ],
        },
    ]);
    let metrics = MetricsSink::new(LabelMode::Slot).expect("metrics register");
    let mut worker = Worker::new(s, Duration::from_secs(10))
        .with_sink(Box::new(metrics.clone()))
        .with_telemetry(metrics.telemetry().clone());

    worker.run_tick(tick_at(0));
    let first = metrics.render().expect("render");
    assert!(first.contains(r#"nickstat_cpu_percent{hostname="web01",nickname="sshd",slot="0"} 1.5"#));
    assert!(first.contains(r#"nickstat_num_threads{hostname="web01",nickname="nginx",slot="0"} 2"#));

    worker.run_tick(tick_at(1));
    let second = metrics.render().expect("render");
    assert!(second.contains(r#"nickstat_cpu_percent{hostname="web01",nickname="sshd",slot="0"} 0.5"#));
    assert!(!second.contains(r#"nickname="nginx""#));
    assert!(second.contains("nickstat_exporter_ticks_total 2"));
}

#[test]
fn test_script_loaded_from_json_file() {
    let json = r#"{
        "version": "1",
        "ticks": [
            { "processes": [
                { "pid": 1, "name": "systemd", "cmdline": "/usr/lib/systemd/systemd --system", "num_threads": 1 },
                { "pid": 2, "name": "kthreadd", "cmdline": "" },
                { "pid": 3, "name": "rcu_gp", "cmdline": "" },
                { "pid": 640, "name": "bash", "cmdline": "-bash", "uid": 1000 }
            ] }
        ]
    }"#;
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(json.as_bytes()).expect("write script");

    let provider = TestDataProvider::from_file(file.path()).expect("load script");
    let s = Sampler::new(
        provider,
        Classifier::new(&default_rules()).expect("default rules compile"),
        default_reduce(),
        "web01",
    );
    let (mut worker, out) = text_worker(s, LabelMode::Pid);
    worker.run_tick(tick_at(0));

    let lines = out.data_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("2024-03-01T12:00:00 web01 SYSTEMD systemd 1 "));
    assert!(lines[0].ends_with(" ^(/usr)?/lib/systemd"));
    // Kernel threads fold into one NOCMD row.
    assert!(lines[1].starts_with("2024-03-01T12:00:00 web01 NOCMD kthreadd 2 "));
    assert!(lines[1].ends_with(" ^$"));
    assert!(lines[2].starts_with("2024-03-01T12:00:00 web01 BASH bash 640 "));
}
