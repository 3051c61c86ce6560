// Renderer error kinds
//
// Every failure is fatal: nothing here is retried. The variants only exist
// so the message printed on exit says what broke and where.

use ash::prelude::VkResult;
use ash::vk;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type RendererResult<T> = std::result::Result<T, RendererError>;

#[derive(Debug, Error)]
pub enum RendererError {
    /// The API rejected the creation of a GPU object.
    #[error("failed to create {object}: {result}")]
    InitializationFailure {
        object: &'static str,
        result: vk::Result,
    },

    /// No GPU, no suitable queue family, or no Vulkan loader.
    #[error("{0}")]
    ResourceUnavailable(String),

    /// A precompiled shader blob is missing or unreadable.
    #[error("shader asset {path:?} is unavailable: {source}")]
    ShaderAsset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Recording, submission, acquisition or presentation was rejected.
    #[error("failed to {operation}: {result}")]
    SubmissionFailure {
        operation: &'static str,
        result: vk::Result,
    },

    /// A surface configuration this renderer deliberately does not handle.
    #[error("unsupported surface: {0}")]
    UnsupportedSurface(&'static str),
}

/// Attach the object or operation name to a raw API result.
pub trait VkResultExt<T> {
    fn creating(self, object: &'static str) -> RendererResult<T>;
    fn submitting(self, operation: &'static str) -> RendererResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn creating(self, object: &'static str) -> RendererResult<T> {
        self.map_err(|result| RendererError::InitializationFailure { object, result })
    }

    fn submitting(self, operation: &'static str) -> RendererResult<T> {
        self.map_err(|result| RendererError::SubmissionFailure { operation, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_errors_name_the_object() {
        let result: VkResult<()> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = result.creating("render pass").unwrap_err();

        assert!(matches!(
            err,
            RendererError::InitializationFailure { object: "render pass", .. }
        ));
        assert!(err.to_string().starts_with("failed to create render pass"));
    }

    #[test]
    fn submission_errors_name_the_operation() {
        let result: VkResult<u32> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = result.submitting("submit draw commands").unwrap_err();

        assert!(matches!(
            err,
            RendererError::SubmissionFailure { result: vk::Result::ERROR_DEVICE_LOST, .. }
        ));
    }

    #[test]
    fn success_passes_through() {
        let result: VkResult<u32> = Ok(7);
        assert_eq!(result.creating("fence").unwrap(), 7);
    }
}
