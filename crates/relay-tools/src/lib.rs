// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod blocklist;
pub mod builtin;
pub mod registry;
pub mod tool;

pub use blocklist::{filter_blocked, is_blocked};
pub use builtin::memory::{MemorySearchTool, MemoryStoreTool};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};
