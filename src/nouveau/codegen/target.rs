// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

use crate::ir::{DataFile, DataType, Function, Instruction, Op};

pub trait Target {
    fn chipset(&self) -> u16;

    /// Number of cycles before the results of `instr` can be read by another
    /// instruction
    fn latency(&self, func: &Function, instr: &Instruction) -> u32;
}

fn load_file(func: &Function, instr: &Instruction) -> Option<DataFile> {
    instr.srcs.first().map(|&src| func.value(src).file)
}

/// Tesla
pub struct TargetNV50 {
    chipset: u16,
}

impl TargetNV50 {
    pub fn new(chipset: u16) -> Self {
        TargetNV50 { chipset }
    }
}

impl Target for TargetNV50 {
    fn chipset(&self) -> u16 {
        self.chipset
    }

    fn latency(&self, func: &Function, instr: &Instruction) -> u32 {
        // Rough guesses.  Uncached memory is really 400 to 800 cycles.
        if instr.op == Op::Load {
            match load_file(func, instr) {
                Some(
                    DataFile::MemoryLocal
                    | DataFile::MemoryGlobal
                    | DataFile::MemoryBuffer,
                ) => return 100,
                _ => (),
            }
        }
        22
    }
}

/// Fermi and Kepler
pub struct TargetNVC0 {
    chipset: u16,
}

impl TargetNVC0 {
    pub fn new(chipset: u16) -> Self {
        TargetNVC0 { chipset }
    }

    fn is_kepler_b(&self) -> bool {
        self.chipset >= 0xe4
    }
}

impl Target for TargetNVC0 {
    fn chipset(&self) -> u16 {
        self.chipset
    }

    fn latency(&self, func: &Function, instr: &Instruction) -> u32 {
        if !self.is_kepler_b() {
            return match instr.op {
                Op::Load => 48,
                _ => 24,
            };
        }

        if instr.is_fp64() {
            return 20;
        }

        match instr.op {
            Op::Linterp | Op::Pinterp => 15,
            Op::Load => {
                if load_file(func, instr) == Some(DataFile::MemoryConst) {
                    9
                } else {
                    24
                }
            }
            Op::VFetch => 24,
            op if op.is_texture() => 17,
            Op::Mul if instr.dtype != DataType::F32 => 15,
            _ => 9,
        }
    }
}

pub fn get_target(chipset: u16) -> Box<dyn Target> {
    if chipset >= 0xc0 {
        Box::new(TargetNVC0::new(chipset))
    } else {
        Box::new(TargetNV50::new(chipset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency_of(
        target: &dyn Target,
        op: Op,
        dtype: DataType,
        src_file: Option<DataFile>,
    ) -> u32 {
        let mut f = Function::new("lat");
        let b = f.new_block();
        let dst = f.new_value(DataFile::Gpr);
        let mut instr = Instruction::new(op, dtype).def(dst);
        if let Some(file) = src_file {
            instr = instr.src(f.new_value(file));
        }
        let ip = f.push_instr(b, instr).unwrap();
        target.latency(&f, f.instr(ip))
    }

    #[test]
    fn test_nv50_latencies() {
        let t = get_target(0x50);
        assert_eq!(t.chipset(), 0x50);
        for file in [
            DataFile::MemoryLocal,
            DataFile::MemoryGlobal,
            DataFile::MemoryBuffer,
        ] {
            assert_eq!(
                latency_of(&*t, Op::Load, DataType::U32, Some(file)),
                100
            );
        }
        assert_eq!(
            latency_of(
                &*t,
                Op::Load,
                DataType::U32,
                Some(DataFile::MemoryShared)
            ),
            22
        );
        assert_eq!(latency_of(&*t, Op::Add, DataType::F32, None), 22);
    }

    #[test]
    fn test_fermi_latencies() {
        let t = get_target(0xc0);
        assert_eq!(t.chipset(), 0xc0);
        assert_eq!(
            latency_of(
                &*t,
                Op::Load,
                DataType::U32,
                Some(DataFile::MemoryConst)
            ),
            48
        );
        assert_eq!(latency_of(&*t, Op::Add, DataType::F64, None), 24);
    }

    #[test]
    fn test_kepler_latencies() {
        let t = get_target(0xf0);
        assert_eq!(latency_of(&*t, Op::Add, DataType::F64, None), 20);
        assert_eq!(latency_of(&*t, Op::Linterp, DataType::F32, None), 15);
        assert_eq!(
            latency_of(
                &*t,
                Op::Load,
                DataType::U32,
                Some(DataFile::MemoryConst)
            ),
            9
        );
        assert_eq!(
            latency_of(
                &*t,
                Op::Load,
                DataType::U32,
                Some(DataFile::MemoryGlobal)
            ),
            24
        );
        assert_eq!(latency_of(&*t, Op::VFetch, DataType::F32, None), 24);
        assert_eq!(latency_of(&*t, Op::Tex, DataType::F32, None), 17);
        assert_eq!(latency_of(&*t, Op::Mul, DataType::S32, None), 15);
        assert_eq!(latency_of(&*t, Op::Mul, DataType::F32, None), 9);
        assert_eq!(latency_of(&*t, Op::Mov, DataType::U32, None), 9);
    }
}
