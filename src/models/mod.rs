//! 数据模型模块

pub mod grant;
pub mod permission;
pub mod role;
pub mod scenario;
