use anyhow::Context;

use fieldops_auth::Actor;
use fieldops_core::UserId;
use fieldops_infra::EngineConfig;

const USAGE: &str = "usage: fieldops [matrix | navigation <role> | rls <role> <entity> | check]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fieldops_observability::init();

    let config = EngineConfig::from_env()?;
    let engine = fieldops_app::bootstrap(&config).await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = match args.as_slice() {
        [] | ["matrix"] => serde_json::to_value(engine.permission_matrix())?,
        ["navigation", role] => {
            let actor = Actor::new(UserId::new(0), role.to_string());
            serde_json::to_value(engine.navigation_for(&actor))?
        }
        ["rls", role, entity] => serde_json::json!({
            "role": role,
            "entity": entity,
            "scope": engine.row_level_security(role, entity).map(|s| s.as_str()),
        }),
        ["check"] => serde_json::to_value(&engine.snapshot().report)?,
        _ => anyhow::bail!(USAGE),
    };

    let rendered = serde_json::to_string_pretty(&output).context("rendering output")?;
    println!("{rendered}");
    Ok(())
}
