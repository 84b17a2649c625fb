use fsjob_runner::{
    config::{local_hostname, propagated_env, Context, RunnerConfig},
    executors::{Executors, LocalExecutor},
    launcher::Launcher,
    terminator::Terminator,
    waiter::{WaitOutcome, Waiter},
};
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use tempfile::{tempdir, TempDir};

const WORKER: &str = r#"#!/bin/sh
run_dir=$(dirname "$1")
stem=$(printf 'worker-s%04d' "$2")
echo "worker $2 starting"
echo "group=worker idx=$2 hostname=$(uname -n) pid=$$" > "$run_dir/pids/$stem.pid"
touch "$run_dir/logs/$stem.finished"
"#;

const SLEEPER: &str = r#"#!/bin/sh
run_dir=$(dirname "$1")
stem=$(printf 'sleeper-s%04d' "$2")
echo "group=sleeper idx=$2 hostname=$(uname -n) pid=$$" > "$run_dir/pids/$stem.pid"
exec sleep 60
"#;

fn setup(programs: &[(&str, &str)]) -> (TempDir, RunnerConfig) {
    let dir = tempdir().unwrap();
    for sub in ["run/logs", "run/pids", "bin"] {
        fs::create_dir_all(dir.path().join(sub)).unwrap();
    }
    fs::write(dir.path().join("run/config.yaml"), "workers: 2\n").unwrap();

    for (name, script) in programs {
        let path = dir.path().join("bin").join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    let config = RunnerConfig {
        rootdir: dir.path().to_path_buf(),
        rundir: "run".into(),
        poll_interval_ms: 50,
        propagate_env: vec!["PATH".to_string()],
        ..RunnerConfig::default()
    };

    (dir, config)
}

fn context(config: &RunnerConfig) -> Context {
    Context::new(
        "tester",
        local_hostname().unwrap(),
        propagated_env(&config.propagate_env),
    )
    .unwrap()
}

fn wait_for_file(path: &Path) {
    let start = Instant::now();
    while !path.exists() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "{path:?} never appeared"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn launch_two_local_jobs_and_wait() {
    let (dir, config) = setup(&[("worker", WORKER)]);
    let mut launcher = Launcher::new(
        &config,
        context(&config),
        Executors::Local(LocalExecutor::load(&config)),
    );

    launcher.launch("worker", &["local", "local"], None).unwrap();

    let records = launcher.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].index, 0);
    assert_eq!(records[1].index, 1);

    let outcome = Waiter::new(&config)
        .with_deadline(Some(Duration::from_secs(10)))
        .wait(records)
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Completed);

    for index in 0..2 {
        let log: PathBuf = dir.path().join(format!("run/logs/worker_{index}.log"));
        assert!(log.is_file());
        assert!(fs::read_to_string(&log)
            .unwrap()
            .contains(&format!("worker {index} starting")));
    }
}

#[test]
fn kill_a_running_local_job() {
    let (dir, config) = setup(&[("sleeper", SLEEPER)]);
    let mut launcher = Launcher::new(
        &config,
        context(&config),
        Executors::Local(LocalExecutor::load(&config)),
    );

    launcher.launch("sleeper", &["local"], None).unwrap();
    wait_for_file(&dir.path().join("run/pids/sleeper-s0000.pid"));

    let mut terminator = Terminator::new(
        &config,
        context(&config),
        Executors::Local(LocalExecutor::load(&config)),
    );
    let report = terminator
        .kill_all(Some(launcher.finished_files().as_slice()))
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(
        report.outcomes[0].command,
        format!("kill -9 {}", report.outcomes[0].record.pid)
    );
    assert!(report.outcomes[0].success());
}
