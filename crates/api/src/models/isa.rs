use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instruction sets artifacts can be compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionSet {
    Arm,
    Arm64,
    Riscv64,
    X86,
    X86_64,
}

impl InstructionSet {
    pub const ALL: [InstructionSet; 5] = [
        InstructionSet::Arm,
        InstructionSet::Arm64,
        InstructionSet::Riscv64,
        InstructionSet::X86,
        InstructionSet::X86_64,
    ];

    /// Directory name used under `oat/` and the system cache.
    pub fn name(self) -> &'static str {
        match self {
            InstructionSet::Arm => "arm",
            InstructionSet::Arm64 => "arm64",
            InstructionSet::Riscv64 => "riscv64",
            InstructionSet::X86 => "x86",
            InstructionSet::X86_64 => "x86_64",
        }
    }

    /// Instruction set of the machine this binary was built for, if it is one we know.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "arm" => Some(InstructionSet::Arm),
            "aarch64" => Some(InstructionSet::Arm64),
            "riscv64" => Some(InstructionSet::Riscv64),
            "x86" => Some(InstructionSet::X86),
            "x86_64" => Some(InstructionSet::X86_64),
            _ => None,
        }
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InstructionSet {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstructionSet::ALL
            .into_iter()
            .find(|isa| isa.name() == s)
            .ok_or_else(|| ApiError::UnknownInstructionSet(s.to_string()))
    }
}
