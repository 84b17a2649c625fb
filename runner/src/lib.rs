//! Launch a fixed group of worker processes on local or remote hosts, wait
//! for their finished markers and kill them through their pid files. All
//! coordination goes through the run directory on a shared filesystem.

pub mod command;
pub mod config;
pub mod executors;
pub mod launcher;
pub mod layout;
pub mod pidfile;
pub mod terminator;
pub mod waiter;

#[cfg(test)]
mod command_test;
#[cfg(test)]
mod pidfile_test;
