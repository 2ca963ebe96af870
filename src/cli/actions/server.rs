use crate::{
    api,
    auth::AuthConfig,
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            access_token_minutes,
            refresh_token_days,
        } => {
            let config = AuthConfig::new()
                .with_access_token_minutes(access_token_minutes)
                .with_refresh_token_days(refresh_token_days);

            api::serve(port, dsn, globals, config).await?;
        }
    }

    Ok(())
}
