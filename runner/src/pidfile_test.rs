use crate::{
    layout::RunLayout,
    pidfile::{read_pid_file, write_pid_file, PidFileError, PidRecord},
};
use std::fs;
use tempfile::tempdir;

fn parse(line: &str) -> Result<PidRecord, PidFileError> {
    line.parse()
}

#[test]
pub fn canonical_line() {
    assert_eq!(
        parse("group=foo idx=3 hostname=box1 pid=4242").unwrap(),
        PidRecord {
            group: "foo".to_string(),
            index: 3,
            hostname: "box1".to_string(),
            pid: 4242,
        }
    );
}

#[test]
pub fn free_form_prefix_and_trailing_newline() {
    let record = parse("2016-03-01 12:00:01 ana_daq started: group=daq idx=0 hostname=psana1101 pid=17\n")
        .unwrap();

    assert_eq!(record.group, "daq");
    assert_eq!(record.index, 0);
    assert_eq!(record.hostname, "psana1101");
    assert_eq!(record.pid, 17);
}

#[test]
pub fn prefix_glued_to_the_group_marker() {
    for line in [
        "started:group=foo idx=3 hostname=box1 pid=4242",
        "2016-03-01 12:00:01 ana_daq:group=foo idx=3 hostname=box1 pid=4242",
    ] {
        let record = parse(line).unwrap();

        assert_eq!(record.group, "foo");
        assert_eq!(record.pid, 4242);
    }

    assert!(matches!(
        parse("idx=3:group=foo hostname=box1 pid=4242"),
        Err(PidFileError::OutOfOrder { expected: "group", .. })
    ));
}

#[test]
pub fn reordered_fields() {
    for line in [
        "idx=3 group=foo hostname=box1 pid=4242",
        "group=foo hostname=box1 idx=3 pid=4242",
        "group=foo idx=3 pid=4242 hostname=box1",
        "pid=4242 group=foo idx=3 hostname=box1",
    ] {
        assert!(
            matches!(parse(line), Err(PidFileError::OutOfOrder { .. })),
            "{line}"
        );
    }
}

#[test]
pub fn more_than_one_line() {
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1 pid=4242\ngroup=foo idx=4 hostname=box1 pid=4243"),
        Err(PidFileError::MultipleLines(2))
    ));
}

#[test]
pub fn missing_markers() {
    assert!(matches!(parse(""), Err(PidFileError::Empty)));
    assert!(matches!(
        parse("idx=3 hostname=box1 pid=4242"),
        Err(PidFileError::MissingField("group"))
    ));
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1"),
        Err(PidFileError::MissingField("pid"))
    ));
}

#[test]
pub fn trailing_garbage() {
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1 pid=4242 extra"),
        Err(PidFileError::UnexpectedToken(_))
    ));
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1 pid=4242 pid=1"),
        Err(PidFileError::UnexpectedToken(_))
    ));
}

#[test]
pub fn bad_values() {
    assert!(matches!(
        parse("group= idx=3 hostname=box1 pid=4242"),
        Err(PidFileError::EmptyValue("group"))
    ));
    assert!(matches!(
        parse("group=foo idx=three hostname=box1 pid=4242"),
        Err(PidFileError::InvalidInteger { field: "idx", .. })
    ));
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1 pid=-1"),
        Err(PidFileError::InvalidInteger { field: "pid", .. })
    ));
    assert!(matches!(
        parse("group=foo idx=3 hostname=box1 pid=0"),
        Err(PidFileError::NonPositivePid)
    ));
}

#[test]
pub fn written_file_reads_back() {
    let dir = tempdir().unwrap();
    let layout = RunLayout::new(dir.path(), "run", "bin");
    let record = PidRecord {
        group: "worker".to_string(),
        index: 2,
        hostname: "box7".to_string(),
        pid: 999,
    };

    let path = write_pid_file(&layout, &record).unwrap();

    assert_eq!(path, dir.path().join("run/pids/worker-s0002.pid"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "group=worker idx=2 hostname=box7 pid=999\n"
    );
    assert_eq!(read_pid_file(&path).unwrap(), record);
    // only the pid file itself is left behind
    assert_eq!(fs::read_dir(layout.pid_dir()).unwrap().count(), 1);
}
