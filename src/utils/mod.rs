//! Utils: 日志、URL 校验和命令行重试策略

pub mod logger;
pub mod retry;
pub mod validator;
