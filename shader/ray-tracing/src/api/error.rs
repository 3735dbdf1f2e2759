use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccelerationStructureError {
  #[error("unsupported geometry: {0}")]
  UnsupportedGeometry(String),
  #[error("out of device memory, requested {requested} bytes but only {available} bytes available")]
  OutOfDeviceMemory { requested: u64, available: u64 },
  #[error("invalid acceleration structure reference: {0}")]
  InvalidReference(String),
  #[error("invalid instance: {0}")]
  InvalidInstance(String),
  #[error("the device requires at least one instance to build a top level structure")]
  EmptyInstanceSet,
  #[error("incompatible update: {0}")]
  IncompatibleUpdate(String),
  #[error("pipeline mismatch: {0}")]
  PipelineMismatch(String),
  #[error("resource in use: {0}")]
  ResourceInUse(String),
  #[error("timeout when waiting for device completion")]
  Timeout,
  #[error("device lost")]
  DeviceLost,
}

impl AccelerationStructureError {
  /// A fatal error invalidates the device context, every structure must be rebuilt against a new one.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::DeviceLost)
  }
}

pub type AccelerationStructureResult<T> = Result<T, AccelerationStructureError>;
