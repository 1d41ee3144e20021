use crate::engine::SamplerMode;
use crate::format::Format;

/// 初始化阶段的错误，最终只表现为 `is_available() == false`
#[derive(thiserror::Error, Debug)]
pub enum NrdError {
    #[error("failed to create denoiser instance: {0}")]
    InstanceCreation(String),

    #[error("unsupported sampler mode {0:?}")]
    UnsupportedSampler(SamplerMode),

    #[error("unsupported format {format:?} for {name}")]
    UnsupportedFormat { format: Format, name: String },

    #[error("{what}: {message}")]
    Gfx { what: String, message: String },
}

impl NrdError {
    pub(crate) fn gfx(what: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Gfx {
            what: what.into(),
            message: format!("{err:#}"),
        }
    }
}
