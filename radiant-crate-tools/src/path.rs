use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = RadiantPath::config_path("pathtracer.toml"); // config/pathtracer.toml
/// ```
pub struct RadiantPath {}
// 核心路径
impl RadiantPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 当前 crate 位于工作区根目录下一层
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| manifest_dir.to_path_buf())
    }

    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_under_workspace() {
        let path = RadiantPath::config_path("pathtracer.toml");
        assert!(path.starts_with(RadiantPath::workspace_path()));
        assert!(path.ends_with("config/pathtracer.toml"));
    }
}
