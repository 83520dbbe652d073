#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Unknown compiler filter: {0}")]
    UnknownCompilerFilter(String),
    #[error("Instruction set '{0}' is invalid")]
    UnknownInstructionSet(String),
    #[error("Unknown dexopt trigger preset: {0}")]
    UnknownTrigger(String),
}
