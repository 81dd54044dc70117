// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Agent orchestration server: HTTP/WebSocket front door for a pool of agent
/// sessions, backed by persistence, vector memory, and a scheduler.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
pub struct Cli {
    /// Path to the config file. Overrides the usual search path
    /// (`/etc/relay`, `$XDG_CONFIG_HOME/relay`, `./relay.yaml`, ...).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server: bootstraps every subsystem and serves HTTP/WS
    /// until a shutdown signal arrives.
    Serve,

    /// Print the fully resolved configuration (file + env overrides) and exit.
    ShowConfig,

    /// Load and validate the configuration without starting anything.
    Validate,
}
