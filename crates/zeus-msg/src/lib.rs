// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Library half of the `zeus-msg` CLI.
//!
//! Command logic lives here so it can be tested without spawning the
//! binary; `main.rs` only parses arguments and maps errors to exit codes.

pub mod send;
