use std::sync::Arc;

use uis_http::{ApiRequest, FileTokenStore, UisClient, UisError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let username = std::env::var("UIS_USERNAME")?;
    let password = std::env::var("UIS_PASSWORD")?;
    let path = std::env::var("UIS_TOKEN_FILE").unwrap_or_else(|_| "uis-tokens.json".to_owned());

    let client = UisClient::from_env(Arc::new(FileTokenStore::open(path)?))?;

    if !client.is_authenticated()? {
        client.login(&username, &password).await?;
    }

    match client
        .send_json::<serde_json::Value>(ApiRequest::get("/api/student/profile"))
        .await
    {
        Ok(profile) => println!("{profile:#}"),
        Err(err) if err.is_auth() => {
            client.logout()?;
            eprintln!("session expired, log in again: {err}");
        }
        Err(UisError::Http { status, body }) => eprintln!("server answered {status}: {body}"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
