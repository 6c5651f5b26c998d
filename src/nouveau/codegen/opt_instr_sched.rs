// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

use crate::api::{GetDebugFlags, DEBUG};
use crate::ir::*;
use crate::sched_deps::DepGraph;
use crate::target::Target;

use std::cmp::max;

/// Picks the ready node with the earliest available time
///
/// Returns an index into `ready`.  Ties go to whichever node became ready
/// first, which is what keeps the schedule deterministic.
fn choose_instr(g: &DepGraph, ready: &[usize]) -> usize {
    let mut chosen = 0;
    let mut min_time = g.nodes[ready[0]].avail_time;
    for (i, &n) in ready.iter().enumerate().skip(1) {
        if g.nodes[n].avail_time < min_time {
            chosen = i;
            min_time = g.nodes[n].avail_time;
        }
    }
    chosen
}

fn log_graphviz(func: &Function, g: &DepGraph) {
    let mut dot = Vec::new();
    match g.write_graphviz(func, &mut dot) {
        Ok(()) => tracing::trace!("{}", String::from_utf8_lossy(&dot)),
        Err(err) => tracing::warn!("Failed to write dependency graph: {err}"),
    }
}

impl Function {
    /// Reorders the instructions of a single block
    ///
    /// This is a classic greedy list scheduler.  At each step it issues the
    /// ready instruction which can start the earliest, given the latencies of
    /// the instructions it depends on.  The issue clock advances by one for
    /// every instruction, stalls are not modeled.
    ///
    /// The dependency graph must be acyclic.  Register values must be
    /// single-assignment, since only read-after-write hazards are tracked for
    /// registers.
    pub fn sched_block(&mut self, block_idx: usize, target: &dyn Target) {
        self.sched_block_with(block_idx, target, &DEBUG);
    }

    /// Same as [`Function::sched_block`] but with explicit debug flags
    pub fn sched_block_with(
        &mut self,
        block_idx: usize,
        target: &dyn Target,
        debug: &dyn GetDebugFlags,
    ) {
        let mut g = DepGraph::new(self, block_idx, target);
        debug_assert!(g.is_acyclic(), "Dependency graph has a cycle");

        tracing::trace!(
            block = block_idx,
            instrs = g.nodes.len(),
            edges = g.num_edges(),
            "Built dependency graph"
        );
        if debug.dot() {
            log_graphviz(self, &g);
        }

        let num_instrs = g.nodes.len();
        self.empty_block(block_idx);

        let (mut ready, pending): (Vec<usize>, Vec<usize>) =
            (0..num_instrs).partition(|&n| g.nodes[n].parent_count == 0);
        tracing::trace!(
            block = block_idx,
            ready = ready.len(),
            pending = pending.len(),
            "Initial ready list"
        );

        let mut time = 0;
        let mut serial = 0;
        while !ready.is_empty() {
            let n = ready.remove(choose_instr(&g, &ready));

            let ip = g.nodes[n].instr;
            let instr = self.instr_mut(ip);
            instr.serial = serial;
            instr.snode = None;
            serial += 1;
            self.insert_tail(block_idx, ip);

            let children = std::mem::take(&mut g.nodes[n].children);
            for edge in children {
                let child = &mut g.nodes[edge.child];
                child.avail_time =
                    max(child.avail_time, time + edge.latency);
                child.parent_count -= 1;
                if child.parent_count == 0 {
                    ready.push(edge.child);
                }
            }
            time += 1;
        }
        debug_assert_eq!(
            self.block(block_idx).len(),
            num_instrs,
            "Not every instruction was scheduled"
        );

        if debug.print() {
            for &ip in self.block(block_idx).instrs() {
                tracing::debug!(
                    function = %self.name,
                    block = block_idx,
                    "{}",
                    self.fmt_instr(ip)
                );
            }
        }
    }

    pub fn sched_instrs(&mut self, target: &dyn Target) {
        self.sched_instrs_with(target, &DEBUG);
    }

    pub fn sched_instrs_with(
        &mut self,
        target: &dyn Target,
        debug: &dyn GetDebugFlags,
    ) {
        for block_idx in 0..self.blocks().len() {
            self.sched_block_with(block_idx, target, debug);
        }
    }
}

impl Program {
    pub fn sched_instrs(&mut self) {
        self.sched_instrs_with(&DEBUG);
    }

    pub fn sched_instrs_with(&mut self, debug: &dyn GetDebugFlags) {
        if debug.nosched() {
            return;
        }

        for f in &mut self.functions {
            f.sched_instrs_with(self.target.as_ref(), debug);
        }
    }
}
