use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluidError {
    /// No graphics context capable of running the solver.
    #[error("unsupported environment: {0}")]
    Unsupported(String),

    #[error("device request failed: {0}")]
    DeviceRequest(String),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
