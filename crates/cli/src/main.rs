//! Dev harness: seeds an in-memory store with demo accounts and runs one
//! auth operation against it.
//!
//! ```text
//! clinic-auth catalog
//! clinic-auth login <username> <password>
//! clinic-auth explain <username> <password> <permission>
//! ```

use std::sync::Arc;

use anyhow::{Context, bail};
use serde_json::json;

use clinic_auth::{
    AuthConfig, AuthContext, AuthService, InMemoryCredentialStore, PasswordHashing, Permission, Role, UserRecord,
};
use clinic_core::{Clock, SystemClock};

type Store = Arc<InMemoryCredentialStore>;

const DEMO_ACCOUNTS: &[(&str, &str, Role, &str)] = &[
    ("admin", "admin1234", Role::SuperAdmin, "Clinic Administrator"),
    ("drjane", "secret123", Role::Doctor, "Jane Doe"),
    ("sam.assist", "assist123", Role::Assistant, "Sam Carter"),
];

fn main() -> anyhow::Result<()> {
    clinic_observability::init();

    let config = AuthConfig::from_env().context("invalid auth configuration")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let service = build_service(config)?;

    let output = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["catalog"] => serde_json::to_value(service.catalog().describe())?,
        ["login", username, password] => {
            let mut ctx = service.context();
            login(&service, &mut ctx, username, password)?
        }
        ["explain", username, password, permission] => {
            let permission: Permission = permission.parse()?;
            let mut ctx = service.context();
            login(&service, &mut ctx, username, password)?;
            serde_json::to_value(ctx.explain(permission)?)?
        }
        _ => bail!("usage: clinic-auth catalog | login <username> <password> | explain <username> <password> <permission>"),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_service(config: AuthConfig) -> anyhow::Result<Arc<AuthService<Store>>> {
    let store = InMemoryCredentialStore::arc();
    let hashing = PasswordHashing::standard();
    let now = SystemClock.now();

    for (username, password, role, full_name) in DEMO_ACCOUNTS {
        let hash = hashing.hash(password)?;
        let record = UserRecord::new(*username, hash, *role, *full_name, now)?;
        store.insert(record)?;
    }
    tracing::info!(accounts = store.len(), "demo accounts seeded");

    Ok(AuthService::builder(store)
        .config(config)
        .password_hashing(hashing)
        .build())
}

fn login(
    service: &AuthService<Store>,
    ctx: &mut AuthContext<Store>,
    username: &str,
    password: &str,
) -> anyhow::Result<serde_json::Value> {
    let principal = ctx.login(username, password)?.clone();
    let mut permissions: Vec<&'static str> = service
        .catalog()
        .permissions_for(principal.role)
        .iter()
        .map(|p| p.as_str())
        .collect();
    permissions.sort_unstable();
    let remaining = ctx
        .session()
        .remaining()
        .map(|d| d.num_minutes())
        .unwrap_or_default();

    Ok(json!({
        "principal": principal,
        "permissions": permissions,
        "session_expires_in_minutes": remaining,
    }))
}
