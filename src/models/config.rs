// ============================================================================
// Offload - 配置数据模型
// ============================================================================
//
// 文件: src/models/config.rs
// 职责: 配置文件数据结构定义和全局配置访问
// 边界:
//   - ✅ 配置文件数据结构定义
//   - ✅ 配置序列化/反序列化
//   - ✅ 配置默认值与环境变量覆盖
//   - ✅ 运行时参数合并
//   - ❌ 不应包含捕获、派发或分块逻辑
//   - ❌ 不应包含 CLI 参数解析
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};

/// 全局配置管理器
static GLOBAL_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

/// 默认配置文件名
pub const CONFIG_FILE: &str = "offload.toml";
/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "OFFLOAD_CONFIG";
/// 暂存目录环境变量
pub const SCRATCH_ENV: &str = "OFFLOAD_SCRATCH_DIR";

/// Offload 配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 输出捕获配置
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 分块配置
    #[serde(default)]
    pub partition: PartitionConfig,
    /// 派发配置
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,
}

/// 输出捕获配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// 临时文件与暂存目录所在位置（为空时使用默认值）
    #[serde(default)]
    pub scratch_dir: Option<String>,
}

/// 分块配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// 默认任务数
    #[serde(default = "Config::default_tasks")]
    pub default_tasks: usize,
    /// 默认块大小（代价上限）
    #[serde(default = "Config::default_blocksize")]
    pub blocksize: f64,
}

/// 派发配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 派发模式
    #[serde(default)]
    pub mode: DispatchMode,
}

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 是否详细输出
    #[serde(default)]
    pub verbose: bool,
    /// 界面语言
    #[serde(default = "Config::default_language")]
    pub language: String,
}

/// CLI 运行时参数（用于覆盖配置文件）
#[derive(Debug, Clone, Default)]
pub struct RuntimeArgs {
    pub verbose: Option<bool>,
    pub language: Option<String>,
    pub scratch_dir: Option<String>,
    pub dispatch_mode: Option<DispatchMode>,
}

/// 派发模式枚举
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// 根据运行环境探测
    #[default]
    Auto,
    /// 总是使用后台线程
    Concurrent,
    /// 总是同步执行
    Synchronous,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Auto => "auto",
            DispatchMode::Concurrent => "concurrent",
            DispatchMode::Synchronous => "synchronous",
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DispatchMode::Auto),
            "concurrent" | "thread" | "threads" => Ok(DispatchMode::Concurrent),
            "synchronous" | "sync" => Ok(DispatchMode::Synchronous),
            _ => Err(format!(
                "unsupported dispatch mode: {} (expected auto, concurrent or synchronous)",
                s
            )),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 配置默认值 trait - 不依赖全局配置初始化
pub trait ConfigDefaults {
    /// 默认暂存目录：可用时使用内存文件系统
    fn default_scratch_dir() -> PathBuf {
        let shm = Path::new("/dev/shm");
        let writable = shm
            .metadata()
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false);
        if writable {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        }
    }

    /// 默认任务数
    fn default_tasks() -> usize {
        num_cpus::get()
    }

    /// 默认块大小
    fn default_blocksize() -> f64 {
        300.0
    }

    /// 默认语言
    fn default_language() -> String {
        "en_us".to_string()
    }
}

impl ConfigDefaults for Config {}

impl Config {
    /// 初始化全局配置（程序启动时调用）
    pub fn initialize() -> anyhow::Result<()> {
        let config = Self::load_config()?;
        GLOBAL_CONFIG
            .set(Arc::new(RwLock::new(config)))
            .map_err(|_| anyhow::anyhow!("Global config already initialized"))?;
        Ok(())
    }

    /// 加载配置文件
    fn load_config() -> anyhow::Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE));
        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            // 如果配置文件不存在，使用默认配置
            Ok(Self::default())
        }
    }

    /// 从指定文件读取配置
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 合并运行时参数
    pub fn merge_runtime_args(args: RuntimeArgs) -> anyhow::Result<()> {
        let global_config = GLOBAL_CONFIG
            .get()
            .ok_or_else(|| anyhow::anyhow!("Global config not initialized"))?;

        let mut config = global_config
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire config write lock"))?;

        config.apply(args);
        Ok(())
    }

    fn apply(&mut self, args: RuntimeArgs) {
        if let Some(verbose) = args.verbose {
            self.output.verbose = verbose;
        }
        if let Some(language) = args.language {
            self.output.language = language;
        }
        if let Some(scratch_dir) = args.scratch_dir {
            self.capture.scratch_dir = Some(scratch_dir);
        }
        if let Some(mode) = args.dispatch_mode {
            self.dispatch.mode = mode;
        }
    }

    /// 生效的暂存目录：环境变量 > 配置文件 > 默认值
    pub fn resolved_scratch_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(SCRATCH_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        match &self.capture.scratch_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Self::default_scratch_dir(),
        }
    }

    /// 读取全局配置快照
    fn with_global<T>(read: impl FnOnce(&Config) -> T) -> anyhow::Result<T> {
        let global_config = GLOBAL_CONFIG
            .get()
            .ok_or_else(|| anyhow::anyhow!("Global config not initialized"))?;

        let config = global_config
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire config read lock"))?;

        Ok(read(&config))
    }

    /// 获取暂存目录（带默认值）
    pub fn get_scratch_dir() -> PathBuf {
        match Self::with_global(Config::resolved_scratch_dir) {
            Ok(dir) => dir,
            _ => Self::default().resolved_scratch_dir(),
        }
    }

    /// 获取派发模式（带默认值）
    pub fn get_dispatch_mode() -> DispatchMode {
        Self::with_global(|c| c.dispatch.mode).unwrap_or_default()
    }

    /// 获取默认任务数（带默认值）
    pub fn get_default_tasks() -> usize {
        match Self::with_global(|c| c.partition.default_tasks) {
            Ok(n) if n > 0 => n,
            _ => Self::default_tasks(),
        }
    }

    /// 获取默认块大小（带默认值）
    pub fn get_blocksize() -> f64 {
        Self::with_global(|c| c.partition.blocksize).unwrap_or_else(|_| Self::default_blocksize())
    }

    /// 获取详细输出设置（带默认值）
    pub fn get_verbose() -> bool {
        Self::with_global(|c| c.output.verbose).unwrap_or(false)
    }

    /// 获取界面语言
    pub fn get_language() -> anyhow::Result<String> {
        Self::with_global(|c| c.output.language.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            partition: PartitionConfig::default(),
            dispatch: DispatchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { scratch_dir: None }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            default_tasks: Config::default_tasks(),
            blocksize: Config::default_blocksize(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            language: Config::default_language(),
        }
    }
}
