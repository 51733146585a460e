//! Shader bytecode lookup.

use std::path::{Path, PathBuf};

use tessera_gpu::{Result, ShaderModule};

/// Directory compiled shaders are read from, relative to the working directory.
pub const SHADER_DIR: &str = "shaders";

/// Path of the compiled shader `name` inside `dir`.
pub fn shader_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    dir.as_ref().join(format!("{name}.spv"))
}

/// Load `shaders/<name>.spv`.
pub fn load_shader(name: &str) -> Result<ShaderModule> {
    ShaderModule::load(shader_path(SHADER_DIR, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_gpu::GpuError;

    #[test]
    fn path_uses_spv_extension() {
        assert_eq!(
            shader_path(SHADER_DIR, "vertex"),
            Path::new("shaders").join("vertex.spv")
        );
    }

    #[test]
    fn missing_shader_is_a_load_error() {
        let result = load_shader("no-such-shader");
        assert!(matches!(result, Err(GpuError::ShaderLoad { .. })));
    }
}
