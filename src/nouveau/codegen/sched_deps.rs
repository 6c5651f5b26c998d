// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

use crate::ir::*;
use crate::target::Target;

use std::io;

pub fn is_value_reg(file: DataFile) -> bool {
    matches!(
        file,
        DataFile::Gpr
            | DataFile::Predicate
            | DataFile::Flags
            | DataFile::Address
    )
}

/// Returns true for the memory spaces which can be written and therefore need
/// hazard tracking
pub fn is_value_wmem(file: DataFile) -> bool {
    MemSpace::from_file(file).is_some()
}

/// A writable memory space
///
/// Each space is tracked separately so that, for instance, shared memory
/// stores never get ordered against global memory loads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemSpace {
    Buffer,
    Global,
    Shared,
    Local,
}

impl MemSpace {
    pub const COUNT: usize = 4;

    pub fn from_file(file: DataFile) -> Option<MemSpace> {
        match file {
            DataFile::MemoryBuffer => Some(MemSpace::Buffer),
            DataFile::MemoryGlobal => Some(MemSpace::Global),
            DataFile::MemoryShared => Some(MemSpace::Shared),
            DataFile::MemoryLocal => Some(MemSpace::Local),
            _ => None,
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DepEdge {
    pub child: usize,
    pub latency: u32,
}

pub struct SchedNode {
    pub instr: usize,
    pub children: Vec<DepEdge>,

    /// Number of parents which have not been scheduled yet
    pub parent_count: u32,

    /// The earliest time this node can be issued without stalling
    pub avail_time: u32,
}

impl SchedNode {
    fn new(instr: usize) -> SchedNode {
        SchedNode {
            instr,
            children: Vec::new(),
            parent_count: 0,
            avail_time: 0,
        }
    }
}

/// The dependency graph of a single basic block
///
/// Nodes are indexed by the position of their instruction in the block at the
/// time the graph was built.
pub struct DepGraph {
    pub nodes: Vec<SchedNode>,
}

impl DepGraph {
    /// Creates one node per instruction in the block and adds an edge for
    /// every ordering constraint between them.
    ///
    /// Each instruction's `snode` is pointed at its node.  Register values
    /// are assumed to be defined exactly once so only read-after-write
    /// dependencies are tracked for registers.
    pub fn new(
        func: &mut Function,
        block_idx: usize,
        target: &dyn Target,
    ) -> DepGraph {
        let mut g = DepGraph { nodes: Vec::new() };
        for &ip in func.block(block_idx).instrs() {
            g.nodes.push(SchedNode::new(ip));
        }
        for (n, node) in g.nodes.iter().enumerate() {
            func.instr_mut(node.instr).snode = Some(n);
        }

        g.calc_deps(func, block_idx, target);
        g
    }

    pub fn add_dep(&mut self, before: usize, after: usize, latency: u32) {
        // An instruction which writes the same memory space twice would
        // otherwise wait on itself forever
        if before == after {
            return;
        }
        self.nodes[before].children.push(DepEdge {
            child: after,
            latency,
        });
        self.nodes[after].parent_count += 1;
    }

    fn calc_deps(
        &mut self,
        func: &Function,
        block_idx: usize,
        target: &dyn Target,
    ) {
        let num_nodes = self.nodes.len();
        let Some(last) = num_nodes.checked_sub(1) else {
            return;
        };

        let mut last_mem_write: [Option<usize>; MemSpace::COUNT] =
            [None; MemSpace::COUNT];
        let mut next_mem_write: [Option<usize>; MemSpace::COUNT] =
            [None; MemSpace::COUNT];

        for n in 0..num_nodes {
            let instr = func.instr(self.nodes[n].instr);

            if instr.fixed {
                for before in 0..n {
                    self.add_dep(before, n, 0);
                }
                for after in (n + 1)..num_nodes {
                    self.add_dep(n, after, 0);
                }
            }

            // Memory RAW
            for &src in &instr.srcs {
                if let Some(space) = MemSpace::from_file(func.value(src).file) {
                    if let Some(w) = last_mem_write[space.idx()] {
                        self.add_dep(w, n, 0);
                    }
                }
            }

            let latency = target.latency(func, instr);
            for &def in &instr.defs {
                let val = func.value(def);
                if is_value_reg(val.file) {
                    for &use_ip in &val.uses {
                        let use_instr = func.instr(use_ip);
                        if use_instr.bb != Some(block_idx) {
                            continue;
                        }
                        if let Some(use_node) = use_instr.snode {
                            self.add_dep(n, use_node, latency);
                        }
                    }
                } else if let Some(space) = MemSpace::from_file(val.file) {
                    // Memory WAW
                    if let Some(w) = last_mem_write[space.idx()] {
                        self.add_dep(w, n, 0);
                    }
                    last_mem_write[space.idx()] = Some(n);
                }
            }

            // Keep the block's final (usually control flow) instruction last
            if n != last {
                self.add_dep(n, last, 0);
            }
        }

        // Memory WAR
        for n in (0..num_nodes).rev() {
            let instr = func.instr(self.nodes[n].instr);
            for &src in &instr.srcs {
                if let Some(space) = MemSpace::from_file(func.value(src).file) {
                    if let Some(w) = next_mem_write[space.idx()] {
                        self.add_dep(n, w, 0);
                    }
                }
            }
            for &def in &instr.defs {
                if let Some(space) = MemSpace::from_file(func.value(def).file) {
                    next_mem_write[space.idx()] = Some(n);
                }
            }
        }
    }

    /// Nodes with no unscheduled parents
    pub fn heads(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent_count == 0)
            .map(|(n, _)| n)
    }

    pub fn num_edges(&self) -> usize {
        self.nodes.iter().map(|node| node.children.len()).sum()
    }

    /// Checks that every node can be reached by resolving dependencies
    pub fn is_acyclic(&self) -> bool {
        let mut parent_count: Vec<u32> =
            self.nodes.iter().map(|node| node.parent_count).collect();
        let mut stack: Vec<usize> = self.heads().collect();
        let mut visited = 0;
        while let Some(n) = stack.pop() {
            visited += 1;
            for edge in &self.nodes[n].children {
                parent_count[edge.child] -= 1;
                if parent_count[edge.child] == 0 {
                    stack.push(edge.child);
                }
            }
        }
        visited == self.nodes.len()
    }

    pub fn write_graphviz(
        &self,
        func: &Function,
        w: &mut impl io::Write,
    ) -> io::Result<()> {
        // dot graph.dot -Tsvg > graph.svg
        writeln!(w, "digraph {{")?;
        for (n, node) in self.nodes.iter().enumerate() {
            writeln!(
                w,
                "    {n} [label=\"{}\"];",
                func.fmt_instr(node.instr)
            )?;
        }
        for (n, node) in self.nodes.iter().enumerate() {
            for edge in &node.children {
                writeln!(
                    w,
                    "    {n} -> {} [label=\"{}\"];",
                    edge.child, edge.latency
                )?;
            }
        }
        writeln!(w, "}}")?;
        w.flush()
    }
}
