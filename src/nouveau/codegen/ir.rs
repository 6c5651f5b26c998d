// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

use crate::target::{get_target, Target};

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

/// The storage class of a [`Value`]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataFile {
    Gpr,
    Predicate,
    Flags,
    Address,
    Immediate,
    MemoryConst,
    MemoryBuffer,
    MemoryGlobal,
    MemoryShared,
    MemoryLocal,
}

impl DataFile {
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            DataFile::MemoryConst
                | DataFile::MemoryBuffer
                | DataFile::MemoryGlobal
                | DataFile::MemoryShared
                | DataFile::MemoryLocal
        )
    }

    fn fmt_prefix(&self) -> &'static str {
        match self {
            DataFile::Gpr => "r",
            DataFile::Predicate => "p",
            DataFile::Flags => "c",
            DataFile::Address => "a",
            DataFile::Immediate => "imm",
            DataFile::MemoryConst => "c",
            DataFile::MemoryBuffer => "b",
            DataFile::MemoryGlobal => "g",
            DataFile::MemoryShared => "s",
            DataFile::MemoryLocal => "l",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataType {
    Pred,
    U32,
    S32,
    F32,
    F64,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Pred => write!(f, "pred"),
            DataType::U32 => write!(f, "u32"),
            DataType::S32 => write!(f, "s32"),
            DataType::F32 => write!(f, "f32"),
            DataType::F64 => write!(f, "f64"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    Mov,
    Add,
    Mul,
    Mad,
    Set,
    Linterp,
    Pinterp,
    Load,
    Store,
    VFetch,
    Export,
    Atom,
    Tex,
    Txf,
    MemBar,
    Bar,
    Bra,
    Exit,
    Nop,
}

impl Op {
    pub fn is_texture(&self) -> bool {
        matches!(self, Op::Tex | Op::Txf)
    }

    /// Ops which are always pinned in place by the scheduler
    pub fn is_fixed(&self) -> bool {
        matches!(self, Op::MemBar | Op::Bar)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Mov => "mov",
            Op::Add => "add",
            Op::Mul => "mul",
            Op::Mad => "mad",
            Op::Set => "set",
            Op::Linterp => "linterp",
            Op::Pinterp => "pinterp",
            Op::Load => "ld",
            Op::Store => "st",
            Op::VFetch => "vfetch",
            Op::Export => "export",
            Op::Atom => "atom",
            Op::Tex => "tex",
            Op::Txf => "txf",
            Op::MemBar => "membar",
            Op::Bar => "bar",
            Op::Bra => "bra",
            Op::Exit => "exit",
            Op::Nop => "nop",
        };
        f.write_str(name)
    }
}

/// A value read or written by instructions
///
/// Register-class values are expected to have exactly one definition.  Memory
/// values stand for a whole address space and may be written any number of
/// times.
pub struct Value {
    pub file: DataFile,
    /// Instructions reading this value, from any block in the function
    pub uses: Vec<usize>,
}

pub struct Instruction {
    pub op: Op,
    pub dtype: DataType,
    pub srcs: Vec<usize>,
    pub defs: Vec<usize>,

    /// The instruction may not move relative to any other instruction
    pub fixed: bool,

    /// Position in the block after scheduling
    pub serial: u32,

    pub bb: Option<usize>,

    /// The scheduling node for this instruction, only set while its block is
    /// being scheduled
    pub snode: Option<usize>,
}

impl Instruction {
    pub fn new(op: Op, dtype: DataType) -> Instruction {
        Instruction {
            op,
            dtype,
            srcs: Vec::new(),
            defs: Vec::new(),
            fixed: op.is_fixed(),
            serial: 0,
            bb: None,
            snode: None,
        }
    }

    pub fn def(mut self, val_idx: usize) -> Self {
        self.defs.push(val_idx);
        self
    }

    pub fn src(mut self, val_idx: usize) -> Self {
        self.srcs.push(val_idx);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn is_fp64(&self) -> bool {
        self.dtype == DataType::F64
    }
}

#[derive(Default)]
pub struct BasicBlock {
    instrs: Vec<usize>,
}

impl BasicBlock {
    pub fn instrs(&self) -> &[usize] {
        &self.instrs
    }

    pub fn entry(&self) -> Option<usize> {
        self.instrs.first().copied()
    }

    pub fn exit(&self) -> Option<usize> {
        self.instrs.last().copied()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IrError {
    #[error("value {value} does not exist")]
    InvalidValue { value: usize },
    #[error("block {block} does not exist")]
    InvalidBlock { block: usize },
    #[error("register value {value} is defined more than once")]
    MultipleDefs { value: usize },
    #[error("use list of value {value} disagrees with instr {instr}")]
    UseListMismatch { value: usize, instr: usize },
    #[error("instr {instr} is listed in a block it does not belong to")]
    NotInBlock { instr: usize },
}

/// A function: arenas of values, instructions and basic blocks
///
/// Values, instructions and blocks are referred to by their index in the
/// respective arena.  Indices are stable for the lifetime of the function.
pub struct Function {
    pub name: String,
    values: Vec<Value>,
    instrs: Vec<Instruction>,
    blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Function {
        Function {
            name: name.into(),
            values: Vec::new(),
            instrs: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn new_value(&mut self, file: DataFile) -> usize {
        self.values.push(Value {
            file,
            uses: Vec::new(),
        });
        self.values.len() - 1
    }

    pub fn new_block(&mut self) -> usize {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    /// Appends `instr` to the end of a block and records its uses
    pub fn push_instr(
        &mut self,
        block_idx: usize,
        mut instr: Instruction,
    ) -> Result<usize, IrError> {
        if block_idx >= self.blocks.len() {
            return Err(IrError::InvalidBlock { block: block_idx });
        }
        if let Some(&value) = instr
            .srcs
            .iter()
            .chain(instr.defs.iter())
            .find(|&&v| v >= self.values.len())
        {
            return Err(IrError::InvalidValue { value });
        }

        let ip = self.instrs.len();
        for &src in &instr.srcs {
            self.values[src].uses.push(ip);
        }
        instr.bb = Some(block_idx);
        self.instrs.push(instr);
        self.blocks[block_idx].instrs.push(ip);
        Ok(ip)
    }

    pub fn value(&self, val_idx: usize) -> &Value {
        &self.values[val_idx]
    }

    pub fn instr(&self, ip: usize) -> &Instruction {
        &self.instrs[ip]
    }

    pub fn instr_mut(&mut self, ip: usize) -> &mut Instruction {
        &mut self.instrs[ip]
    }

    pub fn block(&self, block_idx: usize) -> &BasicBlock {
        &self.blocks[block_idx]
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn num_instrs(&self) -> usize {
        self.instrs.len()
    }

    /// Appends an already existing, detached instruction to a block
    pub fn insert_tail(&mut self, block_idx: usize, ip: usize) {
        debug_assert!(self.instrs[ip].bb.is_none());
        self.instrs[ip].bb = Some(block_idx);
        self.blocks[block_idx].instrs.push(ip);
    }

    /// Detaches every instruction from a block, leaving it empty
    pub fn empty_block(&mut self, block_idx: usize) -> Vec<usize> {
        let instrs = std::mem::take(&mut self.blocks[block_idx].instrs);
        for &ip in &instrs {
            self.instrs[ip].bb = None;
        }
        instrs
    }

    /// Checks the invariants the passes over this function rely on
    pub fn validate(&self) -> Result<(), IrError> {
        for (block_idx, b) in self.blocks.iter().enumerate() {
            for &ip in &b.instrs {
                if self.instrs[ip].bb != Some(block_idx) {
                    return Err(IrError::NotInBlock { instr: ip });
                }
            }
        }

        let mut def_count: FxHashMap<usize, u32> = Default::default();
        let mut uses: Vec<Vec<usize>> = vec![Vec::new(); self.values.len()];
        for (ip, instr) in self.instrs.iter().enumerate() {
            for &src in &instr.srcs {
                if src >= self.values.len() {
                    return Err(IrError::InvalidValue { value: src });
                }
                uses[src].push(ip);
            }
            for &def in &instr.defs {
                if def >= self.values.len() {
                    return Err(IrError::InvalidValue { value: def });
                }
                if self.values[def].file.is_memory() {
                    continue;
                }
                let count = def_count.entry(def).or_default();
                *count += 1;
                if *count > 1 {
                    return Err(IrError::MultipleDefs { value: def });
                }
            }
        }

        for (val_idx, (val, expected)) in
            self.values.iter().zip(uses.iter_mut()).enumerate()
        {
            let mut actual = val.uses.clone();
            actual.sort_unstable();
            expected.sort_unstable();
            if actual != *expected {
                let instr = actual
                    .iter()
                    .zip(expected.iter())
                    .find(|(a, e)| a != e)
                    .map(|(a, _)| *a)
                    .or_else(|| {
                        let n = actual.len().min(expected.len());
                        actual.get(n).or(expected.get(n)).copied()
                    })
                    .unwrap_or_default();
                return Err(IrError::UseListMismatch {
                    value: val_idx,
                    instr,
                });
            }
        }

        Ok(())
    }

    pub fn fmt_instr(&self, ip: usize) -> FmtInstr<'_> {
        FmtInstr { func: self, ip }
    }

    fn fmt_value(
        &self,
        f: &mut fmt::Formatter<'_>,
        val_idx: usize,
    ) -> fmt::Result {
        let file = self.values[val_idx].file;
        if file.is_memory() {
            write!(f, "{}[%{}]", file.fmt_prefix(), val_idx)
        } else {
            write!(f, "%{}{}", file.fmt_prefix(), val_idx)
        }
    }
}

pub struct FmtInstr<'a> {
    func: &'a Function,
    ip: usize,
}

impl fmt::Display for FmtInstr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instr = &self.func.instrs[self.ip];
        write!(f, "{}: ", instr.serial)?;
        if instr.fixed {
            write!(f, "fixed ")?;
        }
        write!(f, "{} {}", instr.op, instr.dtype)?;
        for &def in &instr.defs {
            write!(f, " ")?;
            self.func.fmt_value(f, def)?;
        }
        for &src in &instr.srcs {
            write!(f, " ")?;
            self.func.fmt_value(f, src)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for (block_idx, b) in self.blocks.iter().enumerate() {
            writeln!(f, "  block {block_idx}:")?;
            for &ip in &b.instrs {
                writeln!(f, "    {}", self.fmt_instr(ip))?;
            }
        }
        write!(f, "}}")
    }
}

pub struct Program {
    pub target: Box<dyn Target>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(chipset: u16) -> Program {
        Program {
            target: get_target(chipset),
            functions: Vec::new(),
        }
    }
}
