#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Numeric casts: intentional in status sampling
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Control flow style
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Self usage
#![allow(clippy::unused_self)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Async functions that may not await yet
#![allow(clippy::unused_async)]

//! Beacon - MQTT device agent for remotely managed displays.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing, env overrides, live settings
//! - `core::identity` - Device identity bootstrap and persistence
//! - `core::telemetry` - Logging initialization
//!
//! ## Protocol
//! - `protocol::envelope` - The JSON message envelope shared by all topics
//! - `protocol::messages` - Typed payloads and outbound message builders
//!
//! ## Session
//! - `session` - Broker session manager and transport poll loop
//! - `session::lifecycle` - Connection state machine
//! - `session::heartbeat` - Periodic heartbeat scheduler
//! - `session::topics` - Topic constants and inbound classification
//!
//! ## Dispatch
//! - `dispatch` - Inbound routing and command handling
//!
//! ## Content
//! - `content` - Content push orchestration and status reporting
//! - `content::fetch` - Media download cache with in-flight sharing
//! - `content::surface` - Presentation surface seam
//!
//! ## Status
//! - `status` - Device status snapshots for heartbeats and registration

pub mod cli;
pub mod content;
pub mod core;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod status;
