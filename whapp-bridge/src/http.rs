use reqwest::{Client, StatusCode};

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub fn client(user_agent: &str) -> reqwest::Result<Client> {
    Client::builder().user_agent(user_agent).build()
}

/// Download an encrypted media blob. Errors are rendered for the controller.
pub async fn fetch(client: &Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|x| describe(url, &x))?;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        return Err(match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                format!("{} (HTTP {}, media expired from the server)", url, status)
            }
            _ => format!("{} (HTTP {})", url, status),
        });
    }

    let data = response.bytes().await.map_err(|x| describe(url, &x))?;
    Ok(data.to_vec())
}

fn describe(url: &str, error: &reqwest::Error) -> String {
    if error.is_connect() {
        format!("{} (connection error)", url)
    } else if error.is_timeout() {
        format!("{} (timeout)", url)
    } else {
        format!("{} ({})", url, error)
    }
}
