use super::{Chat, MessageGroup, Session, SessionError};
use crate::http;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{fmt::Display, path::PathBuf, sync::Arc, thread, time::Duration};
use tokio::{task, time};
use tokio_util::sync::CancellationToken;
use whapp_media::MediaDescriptor;

const WEB_URL: &str = "https://web.whatsapp.com";
const INJECT_SCRIPT: &str = include_str!("inject.js");
const QR_SELECTOR: &str = "[data-ref]";
const LOGGED_IN_SELECTOR: &str = "#pane-side";
const POLL_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct ChromeOptions {
    /// Launch browser without a window.
    pub headless: bool,
    /// Keeps the login across runs.
    pub user_data_dir: Option<PathBuf>,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_data_dir: None,
            chrome_path: None,
            user_agent: http::USER_AGENT.to_owned(),
        }
    }
}

/// [`Session`] driving the web client in a Chrome tab.
///
/// Page calls go through the `WAPI` helper injected after login. The CDP
/// client is blocking, so every call is moved to the blocking pool.
pub struct ChromeSession {
    options: ChromeOptions,
    client: Client,
    /// Closing it kills the tab.
    _browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeSession {
    pub fn new(options: ChromeOptions) -> Result<Self, SessionError> {
        Ok(Self {
            client: http::client(&options.user_agent).map_err(driver)?,
            options,
            _browser: None,
            tab: None,
        })
    }

    fn tab(&self) -> Result<Arc<Tab>, SessionError> {
        self.tab
            .clone()
            .ok_or_else(|| SessionError::Driver("browser is not connected".to_owned()))
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        info!(
            "launching browser in {} mode",
            if self.options.headless {
                "headless (no window)"
            } else {
                "headful (window)"
            }
        );

        let options = self.options.clone();
        let (browser, tab) = task::spawn_blocking(move || {
            let browser = Browser::new(
                LaunchOptionsBuilder::default()
                    .headless(options.headless)
                    .path(options.chrome_path)
                    .user_data_dir(options.user_data_dir)
                    .idle_browser_timeout(Duration::from_secs(24 * 60 * 60))
                    .build()
                    .map_err(driver)?,
            )
            .map_err(driver)?;

            let tab = browser.new_tab().map_err(driver)?;
            tab.set_user_agent(&options.user_agent, None, None)
                .map_err(driver)?;
            tab.navigate_to(WEB_URL).map_err(driver)?;
            tab.wait_until_navigated().map_err(driver)?;
            Ok::<_, SessionError>((browser, tab))
        })
        .await
        .map_err(driver)??;

        debug!("navigated to {}", WEB_URL);
        self._browser = Some(browser);
        self.tab = Some(tab);
        Ok(())
    }

    fn request_login_code(&mut self, cancel: &CancellationToken) -> Result<String, SessionError> {
        let tab = self.tab()?;
        let script = format!(
            "(() => {{ if (document.querySelector({})) return {{ loggedIn: true }}; \
             const x = document.querySelector({}); \
             return {{ code: x ? x.getAttribute('data-ref') : null }}; }})()",
            json!(LOGGED_IN_SELECTOR),
            json!(QR_SELECTOR),
        );

        while !cancel.is_cancelled() {
            let value = evaluate_blocking(&tab, &script)?;

            if value["loggedIn"].as_bool() == Some(true) {
                return Err(SessionError::LoggedIn);
            }

            if let Some(code) = value["code"].as_str().filter(|x| !x.is_empty()) {
                return Ok(code.to_owned());
            }

            thread::sleep(POLL_DELAY);
        }

        Err(SessionError::Cancelled)
    }

    async fn await_login(&mut self) -> Result<(), SessionError> {
        let tab = self.tab()?;
        let script = format!("!!document.querySelector({})", json!(LOGGED_IN_SELECTOR));

        while evaluate(tab.clone(), script.clone()).await? != Value::Bool(true) {
            time::sleep(POLL_DELAY * 2).await;
        }

        info!("logged in, injecting page helper");
        evaluate(tab, INJECT_SCRIPT.to_owned()).await?;
        Ok(())
    }

    fn list_chats(&mut self) -> BoxStream<'_, Result<Chat, SessionError>> {
        let tab = self.tab();

        stream::once(async move {
            let value = evaluate(tab?, call_script("getAllChats", &[])).await?;
            serde_json::from_value::<Vec<Chat>>(value)
                .map_err(|x| SessionError::Driver(format!("unexpected chat list: {}", x)))
        })
        .flat_map(|result| {
            stream::iter(match result {
                Ok(chats) => chats.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
        })
        .boxed()
    }

    async fn list_unread(
        &mut self,
        include_me: bool,
        include_notifications: bool,
    ) -> Result<Vec<MessageGroup>, SessionError> {
        call(
            self.tab()?,
            "getUnreadMessages",
            &[json!(include_me), json!(include_notifications)],
        )
        .await
    }

    async fn send_message(
        &mut self,
        chat_id: &str,
        content: &str,
        reply_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let sent: bool = call(
            self.tab()?,
            "sendMessage",
            &[json!(chat_id), json!(content), json!(reply_id)],
        )
        .await?;

        if !sent {
            return Err(SessionError::Driver(format!("chat {} not found", chat_id)));
        }

        Ok(())
    }

    async fn fetch_media_bytes(
        &mut self,
        media: &MediaDescriptor,
    ) -> Result<Vec<u8>, SessionError> {
        http::fetch(&self.client, &media.source_url)
            .await
            .map_err(SessionError::Fetch)
    }
}

/// `window.WAPI.<function>(<args>)` with json quoted arguments.
fn call_script(function: &str, args: &[Value]) -> String {
    let args = args.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    format!("window.WAPI.{}({})", function, args.join(", "))
}

async fn call<T>(tab: Arc<Tab>, function: &str, args: &[Value]) -> Result<T, SessionError>
where
    T: DeserializeOwned,
{
    let value = evaluate(tab, call_script(function, args)).await?;
    serde_json::from_value(value)
        .map_err(|x| SessionError::Driver(format!("unexpected result of {}: {}", function, x)))
}

async fn evaluate(tab: Arc<Tab>, script: String) -> Result<Value, SessionError> {
    task::spawn_blocking(move || evaluate_blocking(&tab, &script))
        .await
        .map_err(driver)?
}

fn evaluate_blocking(tab: &Tab, script: &str) -> Result<Value, SessionError> {
    let object = tab.evaluate(script, true).map_err(driver)?;
    Ok(object.value.unwrap_or(Value::Null))
}

fn driver(error: impl Display) -> SessionError {
    SessionError::Driver(error.to_string())
}
