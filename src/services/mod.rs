// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod aggregate;
pub mod engine;
pub mod enrichment;
pub mod orchestrator;
pub mod scanner;
