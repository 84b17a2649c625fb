//! Pid file codec.
//!
//! A pid file holds exactly one line
//!
//! ```text
//! <free form prefix>group=<group> idx=<index> hostname=<hostname> pid=<pid>
//! ```
//!
//! written by the worker itself once it runs. Everything before the first
//! `group=` is the prefix, it may be glued to the marker and is ignored as
//! long as it holds no field. The rest is split into whitespace separated
//! tokens which must be exactly the four fields in that order, any deviation
//! rejects the whole file.

use crate::layout::{JobId, RunLayout};
use itertools::{EitherOrBoth, Itertools};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

pub const GROUP: &str = "group";
pub const INDEX: &str = "idx";
pub const HOSTNAME: &str = "hostname";
pub const PID: &str = "pid";

/// field keys in the order they have to appear
pub const FIELDS: [&str; 4] = [GROUP, INDEX, HOSTNAME, PID];

#[derive(Error, Debug)]
pub enum PidFileError {
    #[error("Failed to read pid file")]
    Io(#[from] io::Error),
    #[error("Pid file is empty")]
    Empty,
    #[error("Pid file has {0} lines, expected exactly one")]
    MultipleLines(usize),
    #[error("Missing field `{0}=`")]
    MissingField(&'static str),
    #[error("Expected field `{expected}=` but found {found:?}")]
    OutOfOrder {
        expected: &'static str,
        found: String,
    },
    #[error("Unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("Field `{0}=` has an empty value")]
    EmptyValue(&'static str),
    #[error("Field `{field}=` is not a valid integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("Pid must be positive")]
    NonPositivePid,
}

/// Where a worker says it runs, the hostname is authoritative for kills
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PidRecord {
    pub group: String,
    pub index: usize,
    pub hostname: String,
    pub pid: u32,
}

impl PidRecord {
    pub fn job(&self) -> JobId {
        JobId::new(self.group.clone(), self.index)
    }
}

fn field_key(token: &str) -> Option<&'static str> {
    let (key, _) = token.split_once('=')?;
    FIELDS.into_iter().find(|field| *field == key)
}

fn parse_integer<T: FromStr>(field: &'static str, value: &str) -> Result<T, PidFileError> {
    value.parse().map_err(|_| PidFileError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

impl FromStr for PidRecord {
    type Err = PidFileError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let content = content.trim();

        if content.is_empty() {
            return Err(PidFileError::Empty);
        }

        let lines = content.lines().count();
        if lines != 1 {
            return Err(PidFileError::MultipleLines(lines));
        }

        let start = content
            .find(&format!("{GROUP}="))
            .ok_or(PidFileError::MissingField(GROUP))?;

        let (prefix, fields) = content.split_at(start);
        let fields = fields.split_whitespace().collect_vec();

        // a field in the prefix means the fields were reordered
        if let Some(token) = prefix
            .split_whitespace()
            .find(|token| field_key(token).is_some())
        {
            return Err(PidFileError::OutOfOrder {
                expected: GROUP,
                found: token.to_string(),
            });
        }

        let mut values = Vec::with_capacity(FIELDS.len());

        for pair in FIELDS.into_iter().zip_longest(fields.iter()) {
            match pair {
                EitherOrBoth::Both(expected, token) => match token.split_once('=') {
                    Some((key, value)) if key == expected => {
                        if value.is_empty() {
                            return Err(PidFileError::EmptyValue(expected));
                        }

                        values.push(value);
                    }
                    _ if field_key(token).is_some() => {
                        return Err(PidFileError::OutOfOrder {
                            expected,
                            found: token.to_string(),
                        })
                    }
                    _ => return Err(PidFileError::UnexpectedToken(token.to_string())),
                },
                EitherOrBoth::Left(expected) => return Err(PidFileError::MissingField(expected)),
                EitherOrBoth::Right(token) => {
                    return Err(PidFileError::UnexpectedToken(token.to_string()))
                }
            }
        }

        let pid: u32 = parse_integer(PID, values[3])?;
        if pid == 0 {
            return Err(PidFileError::NonPositivePid);
        }

        Ok(Self {
            group: values[0].to_string(),
            index: parse_integer(INDEX, values[1])?,
            hostname: values[2].to_string(),
            pid,
        })
    }
}

impl fmt::Display for PidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{GROUP}={} {INDEX}={} {HOSTNAME}={} {PID}={}",
            self.group, self.index, self.hostname, self.pid
        )
    }
}

pub fn read_pid_file(path: &Path) -> Result<PidRecord, PidFileError> {
    let content = fs::read_to_string(path)?;

    content.parse()
}

/// Write `record` to its pid file below the layout's pid directory.
///
/// The line is written to a temporary file first and renamed into place so
/// readers on other hosts never observe a partial line.
pub fn write_pid_file(layout: &RunLayout, record: &PidRecord) -> io::Result<PathBuf> {
    let path = layout.pid_file(&record.job());
    let mut temporary = path.clone();
    temporary.set_file_name(format!(".{}.tmp", record.job().stem()));

    fs::create_dir_all(layout.pid_dir())?;
    fs::write(&temporary, format!("{record}\n"))?;
    fs::rename(&temporary, &path)?;

    debug!(path = ?path, "Wrote pid file");

    Ok(path)
}
