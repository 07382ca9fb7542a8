//! Business logic services layer

pub mod export_service;
pub mod grant_service;
pub mod inclusion_service;
pub mod permission_service;
pub mod template_service;

pub use export_service::{ExportFormat, ExportService};
pub use grant_service::{GrantService, PurgeReport};
pub use inclusion_service::InclusionService;
pub use permission_service::{Decision, DecisionReason, PermissionService};
pub use template_service::{ApplyReport, RoleDiff, SyncReport, TemplateService};
