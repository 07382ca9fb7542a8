//! 站点授权引擎
//! 角色与授权存储、判定、角色模板、包含分析与导出

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;
