//! 授权管理命令行入口

use clap::{Args, Parser, Subcommand};
use site_authz::{
    catalog,
    config::AppConfig,
    db,
    error::AppError,
    models::grant::{PermissionRequest, Subject},
    models::role::{RoleId, UserId},
    models::scenario::ScenarioCatalog,
    repository::{AuthzStore, PostgresStore},
    services::{
        ExportFormat, ExportService, GrantService, InclusionService, PermissionService,
        TemplateService,
    },
    services::template_service::summarize,
    telemetry,
};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(
    name = "site-authz",
    version,
    about = "基于授权记录的站点角色管理",
    after_help = "环境变量:\n  AUTHZ_DATABASE__URL        数据库连接 URL（访问角色或授权的命令需要）\n  AUTHZ_LOGGING__LEVEL       日志级别（默认 info）\n  AUTHZ_LOGGING__FORMAT      日志格式 json|pretty|compact\n  AUTHZ_TEMPLATES__PATH      额外的角色模板文件"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// 角色模板
    #[command(subcommand)]
    Template(TemplateCommand),
    /// 角色
    #[command(subcommand)]
    Role(RoleCommand),
    /// 授权
    #[command(subcommand)]
    Grant(GrantCommand),
    /// 用户
    #[command(subcommand)]
    User(UserCommand),
    /// 检查权限判定
    Check(CheckArgs),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum TemplateCommand {
    /// 列出角色模板
    List,
    /// 显示模板定义
    Explain { name: String },
    /// 在单个事务中应用模板
    Apply { name: String },
    /// 比较模板与当前角色
    Diff { name: String },
    /// 只重新应用模板中的一个角色
    Reset { name: String, role: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum RoleCommand {
    /// 角色属性、成员、授权与包含关系
    Inspect { name: String },
    /// 导出角色授权
    Export {
        name: String,
        #[arg(default_value = "json", value_parser = parse_format)]
        format: ExportFormat,
    },
    /// 为用户分配角色
    Assign { user_id: i32, role: String },
    /// 撤销用户的角色
    Revoke { user_id: i32, role: String },
    /// 列出所有角色间的包含关系
    Matrix,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum GrantCommand {
    /// 列出可授予的权限
    ListAvailable {
        #[arg(long)]
        json: bool,
    },
    /// 清理某个资源实例上的授权
    PurgeScope {
        section: String,
        item: String,
        item_id: i32,
        /// 只列出将被删除的授权
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum UserCommand {
    /// 用户的角色
    #[command(subcommand)]
    Roles(UserRolesCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum UserRolesCommand {
    /// 把现有用户的角色收敛到模板中的角色
    Sync {
        template: String,
        /// 只打印计划，不修改
        #[arg(long)]
        dry_run: bool,
    },
}

/// `*` 或具体值
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern<T> {
    Any,
    Exact(T),
}

impl<T: FromStr> FromStr for Pattern<T> {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Pattern::Any);
        }
        s.parse()
            .map(Pattern::Exact)
            .map_err(|_| format!("expected * or a value, got {}", s))
    }
}

impl<T> Pattern<T> {
    fn into_option(self) -> Option<T> {
        match self {
            Pattern::Any => None,
            Pattern::Exact(value) => Some(value),
        }
    }
}

#[derive(Args, Debug, PartialEq, Eq)]
struct CheckArgs {
    /// 以该用户的身份（未给 --roles 时读取其角色）
    #[arg(long)]
    user: Option<i32>,
    /// 逗号分隔的角色 ID，覆盖用户的角色
    #[arg(long, value_delimiter = ',')]
    roles: Option<Vec<i32>>,
    section: String,
    /// 条目，`*` 表示整个板块
    item: Pattern<String>,
    /// 实例 ID，`*` 表示任意
    item_id: Pattern<i32>,
    action: String,
}

impl CheckArgs {
    fn request(&self) -> PermissionRequest {
        let mut request = PermissionRequest::new(self.section.as_str(), self.action.as_str());
        if let Some(item) = self.item.clone().into_option() {
            request = request.item(item);
        }
        if let Some(item_id) = self.item_id.clone().into_option() {
            request = request.item_id(item_id);
        }
        request
    }

    fn user_id(&self) -> Option<UserId> {
        self.user.map(UserId)
    }

    fn role_ids(&self) -> Option<Vec<RoleId>> {
        self.roles
            .as_ref()
            .map(|ids| ids.iter().copied().map(RoleId).collect())
    }
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: AppError| e.user_message())
}

impl Command {
    /// 是否需要数据库
    fn needs_store(&self) -> bool {
        !matches!(
            self,
            Command::Template(TemplateCommand::List | TemplateCommand::Explain { .. })
                | Command::Grant(GrantCommand::ListAvailable { .. })
        )
    }
}

/// 错误码映射为进程退出码
fn exit_code(err: &AppError) -> i32 {
    match err.code() {
        400 | 422 => 2,
        404 => 3,
        403 => 4,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Grant(GrantCommand::ListAvailable { json }) = cli.command {
        list_available(json)?;
        return Ok(());
    }

    // 加载 .env 文件（开发环境）
    if let Ok(env) = std::env::var("AUTHZ_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    // 3. 角色模板
    let scenarios = Arc::new(ScenarioCatalog::load(&config.templates)?);

    // 4. 数据库连接池 + 迁移
    let store: Option<Arc<dyn AuthzStore>> = if cli.command.needs_store() {
        let pool = db::connect(&config.database).await?;
        let store: Arc<dyn AuthzStore> = Arc::new(PostgresStore::new(pool));
        Some(store)
    } else {
        None
    };

    if let Err(e) = run(cli.command, store, scenarios).await {
        tracing::error!(error = %e, code = e.code(), "Command failed");
        eprintln!("error: {}", e.user_message());
        std::process::exit(exit_code(&e));
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn require_store(store: Option<Arc<dyn AuthzStore>>) -> Result<Arc<dyn AuthzStore>, AppError> {
    store.ok_or_else(|| AppError::internal_error("command requires a database"))
}

async fn run(
    command: Command,
    store: Option<Arc<dyn AuthzStore>>,
    scenarios: Arc<ScenarioCatalog>,
) -> Result<(), AppError> {
    match command {
        Command::Template(command) => run_template(command, store, scenarios).await,
        Command::Role(command) => run_role(command, require_store(store)?).await,
        Command::Grant(GrantCommand::ListAvailable { json }) => list_available(json),
        Command::Grant(GrantCommand::PurgeScope {
            section,
            item,
            item_id,
            dry_run,
        }) => {
            let grants = GrantService::new(require_store(store)?);
            print_json(&grants.purge_scope(&section, &item, item_id, dry_run).await?)
        }
        Command::User(UserCommand::Roles(UserRolesCommand::Sync { template, dry_run })) => {
            let templates = TemplateService::new(require_store(store)?, scenarios);
            let report = templates.sync_user_roles(&template, dry_run).await?;
            if report.changes.is_empty() {
                println!("{}: no changes", report.scenario);
            }
            for change in &report.changes {
                println!("user {}:", change.user_id);
                for name in &change.add {
                    println!("  + {}", name);
                }
                for name in &change.remove {
                    println!("  - {}", name);
                }
            }
            if report.dry_run {
                println!("(dry run, nothing changed)");
            }
            Ok(())
        }
        Command::Check(args) => {
            let permissions = PermissionService::new(require_store(store)?);
            let subject = match (args.user_id(), args.role_ids()) {
                (user_id, Some(role_ids)) => Subject::new(role_ids, user_id),
                (Some(user_id), None) => permissions.subject_for_user(user_id).await?,
                (None, None) => Subject::default(),
            };
            let request = args.request();
            let decision = permissions.check_permission(&subject, &request).await?;
            println!(
                "{} {}: {:?}",
                if decision.allowed { "allow" } else { "deny" },
                request,
                decision.reason
            );
            if !decision.allowed {
                std::process::exit(exit_code(&AppError::Forbidden));
            }
            Ok(())
        }
    }
}

async fn run_template(
    command: TemplateCommand,
    store: Option<Arc<dyn AuthzStore>>,
    scenarios: Arc<ScenarioCatalog>,
) -> Result<(), AppError> {
    match command {
        TemplateCommand::List => {
            for summary in summarize(&scenarios) {
                println!("{:<20} {}", summary.name, summary.description);
                println!("{:<20} roles: {}", "", summary.roles.join(", "));
            }
        }
        TemplateCommand::Explain { name } => {
            let scenario = scenarios.get(&name)?;
            println!("{}: {}", scenario.name, scenario.description);
            for role in &scenario.roles {
                println!();
                println!(
                    "Role {} (can_login={}, is_admin={})",
                    role.name, role.can_login, role.is_admin
                );
                if !role.description.is_empty() {
                    println!("  {}", role.description);
                }
                for grant in &role.grants {
                    println!("  - {}", grant);
                }
            }
        }
        TemplateCommand::Apply { name } => {
            let templates = TemplateService::new(require_store(store)?, scenarios);
            print_json(&templates.apply(&name).await?)?;
        }
        TemplateCommand::Reset { name, role } => {
            let templates = TemplateService::new(require_store(store)?, scenarios);
            print_json(&templates.reset_role(&name, &role).await?)?;
        }
        TemplateCommand::Diff { name } => {
            let templates = TemplateService::new(require_store(store)?, scenarios);
            for diff in templates.diff(&name).await? {
                if diff.is_empty() {
                    println!("{}: no changes", diff.role);
                    continue;
                }
                if diff.is_new {
                    println!("{}: new role", diff.role);
                } else {
                    println!("{}:", diff.role);
                }
                for change in &diff.property_changes {
                    println!("  ~ {}", change);
                }
                for added in &diff.additions {
                    println!("  + {}", added);
                }
                for removed in &diff.removals {
                    println!("  - {}", removed);
                }
                for change in &diff.rule_changes {
                    println!("  * {}", change);
                }
            }
        }
    }
    Ok(())
}

async fn run_role(command: RoleCommand, store: Arc<dyn AuthzStore>) -> Result<(), AppError> {
    match command {
        RoleCommand::Inspect { name } => {
            print_json(&InclusionService::new(store).inspect(&name).await?)?;
        }
        RoleCommand::Matrix => {
            for pair in InclusionService::new(store).redundancy_matrix().await? {
                println!("{} includes {}", pair.includer, pair.included);
            }
        }
        RoleCommand::Export { name, format } => {
            print!("{}", ExportService::new(store).export(&name, format).await?);
            if format == ExportFormat::Json {
                println!();
            }
        }
        RoleCommand::Assign { user_id, role } => {
            let user_id = UserId(user_id);
            let found = store
                .find_role_by_name(&role)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("role {}", role)))?;
            let added = store.assign_role(user_id, found.id).await?;
            tracing::info!(user_id = %user_id, role = %role, added, "Role assigned");
            println!("{} -> {}{}", user_id, role, if added { "" } else { " (already assigned)" });
        }
        RoleCommand::Revoke { user_id, role } => {
            let user_id = UserId(user_id);
            let found = store
                .find_role_by_name(&role)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("role {}", role)))?;
            let removed = store.revoke_role(user_id, found.id).await?;
            tracing::info!(user_id = %user_id, role = %role, removed, "Role revoked");
            println!("{} -x {}{}", user_id, role, if removed { "" } else { " (not assigned)" });
        }
    }
    Ok(())
}

fn list_available(json: bool) -> Result<(), AppError> {
    if json {
        return print_json(&catalog::grouped());
    }
    for def in catalog::definitions() {
        let item = if def.item.is_empty() { "*" } else { def.item };
        println!(
            "{:<14} {:<18} {:<8} {}",
            def.section, item, def.action, def.description
        );
    }
    Ok(())
}
