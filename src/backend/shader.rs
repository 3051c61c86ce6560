// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. The two blobs are produced
// offline and read verbatim from disk at startup.

use super::error::{RendererError, RendererResult, VkResultExt};
use ash::vk;
use std::fs::File;
use std::io;
use std::path::Path;

/// Read a SPIR-V file into 4-byte words.
///
/// A missing file, a read error or a length that isn't a whole number of
/// words are all reported as an unavailable asset.
pub fn read_spirv(path: &Path) -> RendererResult<Vec<u32>> {
    let asset_error = |source: io::Error| RendererError::ShaderAsset {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(asset_error)?;
    ash::util::read_spv(&mut file).map_err(asset_error)
}

/// Create a shader module from SPIR-V words.
pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> RendererResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.create_shader_module(&create_info, None) }.creating("shader module")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "triangle-renderer-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn missing_file_is_a_shader_asset_error() {
        let path = std::env::temp_dir().join("triangle-renderer-does-not-exist.spv");

        let err = read_spirv(&path).unwrap_err();

        match err {
            RendererError::ShaderAsset { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn words_are_read_verbatim() {
        // SPIR-V magic number followed by a version word, little endian.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0723_0203u32.to_le_bytes());
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let path = scratch_file("words.spv", &bytes);

        let words = read_spirv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let path = scratch_file("truncated.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);

        let result = read_spirv(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(RendererError::ShaderAsset { .. })));
    }
}
