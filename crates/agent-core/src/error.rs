use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
