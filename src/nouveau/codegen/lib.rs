// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

//! Local instruction scheduling for the nv50 codegen IR
//!
//! The scheduler works on one basic block at a time.  It builds a dependency
//! graph out of register, memory and control hazards and then list-schedules
//! the block, greedily issuing whichever instruction's operands become
//! available the earliest.

pub mod api;
pub mod ir;
pub mod opt_instr_sched;
pub mod sched_deps;
pub mod target;
