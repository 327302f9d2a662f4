use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("A message is already streaming; finish or cancel it first")]
    StreamAlreadyActive,
    #[error("No message is streaming")]
    NotStreaming,
}
