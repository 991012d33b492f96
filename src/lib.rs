//! 后台任务、输出捕获与代价均衡分块。
//!
//! - [`core::partition`]：把单调增长的累积代价序列切成均衡分块
//! - [`core::task`]：一次性后台线程/进程任务，join 时返回结果或传播失败
//! - [`core::dispatcher`]：每个入口最多一个在途调用的异步派发器
//! - [`core::capture`]：作用域化的进程级标准输出重定向

pub mod cli;
pub mod core;
pub mod error;
pub mod i18n;
pub mod models;
pub mod utils;

pub use error::{BackgroundTaskError, OffloadError, Result};
