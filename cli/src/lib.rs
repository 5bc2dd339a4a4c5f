//! deskjob-cli library, exposes the command modules for tests.

pub mod commands;
