//! This module provides various utility functions needed throughout modterm.
//!
//! These include running external commands, naming rules for modules and containers, and host port
//! checks.

pub(crate) mod commands;
pub(crate) mod names;
pub(crate) mod ports;
