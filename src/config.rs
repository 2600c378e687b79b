use anyhow::Result;
use std::path::PathBuf;

/// 分类模型默认文件名
pub const CLASSIFIER_FILE: &str = "emotion_classifier.onnx";

/// 人脸级联检测器默认文件名
pub const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 显式指定的分类模型路径
    pub classifier_override: Option<PathBuf>,

    /// 显式指定的级联检测器路径
    pub cascade_override: Option<PathBuf>,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别 (0-3)
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        if workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            classifier_override: None,
            cascade_override: None,
            workers,
            dev_mode,
            onnx_config,
            server_config,
        })
    }

    pub fn with_classifier_path(mut self, path: Option<String>) -> Self {
        self.classifier_override = path.map(PathBuf::from);
        self
    }

    pub fn with_cascade_path(mut self, path: Option<String>) -> Self {
        self.cascade_override = path.map(PathBuf::from);
        self
    }

    /// 获取情绪分类模型路径
    pub fn classifier_model_path(&self) -> PathBuf {
        self.classifier_override
            .clone()
            .unwrap_or_else(|| self.models_dir.join(CLASSIFIER_FILE))
    }

    /// 获取Haar级联文件路径
    pub fn cascade_path(&self) -> PathBuf {
        self.cascade_override
            .clone()
            .unwrap_or_else(|| self.models_dir.join(CASCADE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_live_under_models_dir() {
        let config = Config::new("0.0.0.0:5001".into(), "models".into(), Some(2), false).unwrap();

        assert_eq!(config.classifier_model_path(), PathBuf::from("models/emotion_classifier.onnx"));
        assert_eq!(
            config.cascade_path(),
            PathBuf::from("models/haarcascade_frontalface_default.xml")
        );
        assert_eq!(config.workers, 2);
        assert_eq!(config.server_config.request_timeout, 60);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = Config::new("127.0.0.1:0".into(), "models".into(), None, true)
            .unwrap()
            .with_classifier_path(Some("/opt/fer.onnx".into()))
            .with_cascade_path(Some("/opt/face.xml".into()));

        assert_eq!(config.classifier_model_path(), PathBuf::from("/opt/fer.onnx"));
        assert_eq!(config.cascade_path(), PathBuf::from("/opt/face.xml"));
        assert_eq!(config.server_config.request_timeout, 300);
        assert!(config.onnx_config.intra_threads >= 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Config::new("0.0.0.0:5001".into(), "models".into(), Some(0), false).is_err());
    }
}
