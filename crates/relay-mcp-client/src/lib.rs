// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod client;
mod error;
mod manager;
mod protocol;
mod proxy;
mod transport;

pub use client::McpClient;
pub use error::{McpError, Result};
pub use manager::{connect_and_register, disconnect_all};
pub use protocol::{McpToolDescriptor, DEFAULT_REQUEST_TIMEOUT_SECS, SUPPORTED_PROTOCOL_VERSIONS};
pub use proxy::McpToolProxy;
