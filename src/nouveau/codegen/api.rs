// Copyright © 2025 Collabora, Ltd.
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::OnceLock;

enum DebugFlags {
    Print,
    Dot,
    NoSched,
}

pub struct Debug {
    flags: u32,
}

impl Debug {
    fn new() -> Debug {
        match env::var("NV50_PROG_DEBUG") {
            Ok(s) => Debug::parse(&s),
            Err(_) => Debug { flags: 0 },
        }
    }

    /// Parses a comma-separated list of debug flags
    pub fn parse(debug_str: &str) -> Debug {
        let mut flags = 0;
        for flag in debug_str.split(',') {
            match flag.trim() {
                "print" => flags |= 1 << DebugFlags::Print as u8,
                "dot" => flags |= 1 << DebugFlags::Dot as u8,
                "nosched" => flags |= 1 << DebugFlags::NoSched as u8,
                "" => (),
                unk => {
                    tracing::warn!("Unknown NV50_PROG_DEBUG flag \"{unk}\"")
                }
            }
        }
        Debug { flags }
    }
}

pub trait GetDebugFlags {
    fn debug_flags(&self) -> u32;

    /// Log each block after it has been scheduled
    fn print(&self) -> bool {
        self.debug_flags() & (1 << DebugFlags::Print as u8) != 0
    }

    /// Log the dependency graph of each block in Graphviz format
    fn dot(&self) -> bool {
        self.debug_flags() & (1 << DebugFlags::Dot as u8) != 0
    }

    /// Leave instructions in their original order
    fn nosched(&self) -> bool {
        self.debug_flags() & (1 << DebugFlags::NoSched as u8) != 0
    }
}

impl GetDebugFlags for Debug {
    fn debug_flags(&self) -> u32 {
        self.flags
    }
}

pub static DEBUG: OnceLock<Debug> = OnceLock::new();

impl GetDebugFlags for OnceLock<Debug> {
    fn debug_flags(&self) -> u32 {
        self.get_or_init(Debug::new).flags
    }
}
