// SPDX-License-Identifier: MIT
//
// folio-tasks — single-shot background execution for Folio engine operations.
//
// The Presentation Layer submits one engine call per user action and receives
// one TaskOutcome back; everything the workers touch is owned by the call.

pub mod runner;

pub use runner::{TaskHandle, TaskId, TaskOutcome, submit};
