//! Heroku Platform API v3 client.
//!
//! Calls block to completion on an internal tokio runtime so the rest of
//! the crate keeps a single logical thread of control. The authenticated
//! session is established lazily on the first call and memoized for the
//! remainder of the run.

use std::cell::RefCell;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::debug;
use url::Url;

use super::{AppInfo, Dyno, Formation, FormationUpdate, Platform, PlatformError};

/// Environment variable holding the deploy credential.
pub const DEPLOY_TOKEN_VAR: &str = "HEROKU_DEPLOY_TOKEN";

const DEFAULT_API_URL: &str = "https://api.heroku.com/";
const ACCEPT_HEADER: &str = "application/vnd.heroku+json; version=3";

pub struct HerokuPlatform {
    base_url: Url,
    session: RefCell<Option<Session>>,
}

struct Session {
    runtime: Runtime,
    http: reqwest::Client,
}

impl HerokuPlatform {
    pub fn new() -> Self {
        let base_url = Url::parse(DEFAULT_API_URL).expect("default API URL is valid");
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            session: RefCell::new(None),
        }
    }

    /// Establish the authenticated session if this is the first call.
    ///
    /// A missing or rejected `HEROKU_DEPLOY_TOKEN` is an authorization
    /// failure; the token is probed once against the account endpoint and
    /// never re-checked.
    fn ensure_session(&self) -> Result<(), PlatformError> {
        if self.session.borrow().is_some() {
            return Ok(());
        }

        let token =
            std::env::var(DEPLOY_TOKEN_VAR).map_err(|_| PlatformError::Unauthorized)?;
        let runtime = Runtime::new()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| PlatformError::Unauthorized)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        let url = self.base_url.join("account")?;
        let status = runtime.block_on(async {
            Ok::<_, reqwest::Error>(http.get(url).send().await?.status())
        })?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PlatformError::Unauthorized);
        }

        debug!("Heroku session established");
        *self.session.borrow_mut() = Some(Session { runtime, http });
        Ok(())
    }

    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, PlatformError> {
        self.ensure_session()?;
        let session = self.session.borrow();
        let session = session.as_ref().expect("session established above");

        let url = self.base_url.join(path)?;
        debug!(%method, %url, "Heroku API request");

        let (status, text) = session.runtime.block_on(async {
            let mut request = session.http.request(method, url);
            if let Some(body) = &body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PlatformError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound {
                resource: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message: text.trim().to_string(),
            });
        }
        if text.is_empty() {
            Ok(serde_json::from_value(serde_json::Value::Null)?)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    fn request_discard(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), PlatformError> {
        let _: serde_json::Value = self.request(method, path, body)?;
        Ok(())
    }
}

impl Default for HerokuPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HerokuPlatform {
    fn app_info(&self, app_name: &str) -> Result<AppInfo, PlatformError> {
        self.request(Method::GET, &format!("apps/{app_name}"), None)
    }

    fn set_maintenance(&self, app_name: &str, enabled: bool) -> Result<(), PlatformError> {
        self.request_discard(
            Method::PATCH,
            &format!("apps/{app_name}"),
            Some(json!({ "maintenance": enabled })),
        )
    }

    fn formation(&self, app_name: &str) -> Result<Vec<Formation>, PlatformError> {
        self.request(Method::GET, &format!("apps/{app_name}/formation"), None)
    }

    fn scale(&self, app_name: &str, updates: &[FormationUpdate]) -> Result<(), PlatformError> {
        self.request_discard(
            Method::PATCH,
            &format!("apps/{app_name}/formation"),
            Some(json!({ "updates": updates })),
        )
    }

    fn run_one_off(&self, app_name: &str, command: &str) -> Result<Dyno, PlatformError> {
        self.request(
            Method::POST,
            &format!("apps/{app_name}/dynos"),
            Some(json!({ "command": command, "attach": false })),
        )
    }

    fn dyno_info(&self, app_name: &str, dyno_id: &str) -> Result<Dyno, PlatformError> {
        self.request(
            Method::GET,
            &format!("apps/{app_name}/dynos/{dyno_id}"),
            None,
        )
    }

    fn list_dynos(&self, app_name: &str) -> Result<Vec<Dyno>, PlatformError> {
        self.request(Method::GET, &format!("apps/{app_name}/dynos"), None)
    }

    fn restart(&self, app_name: &str, dyno_id: &str) -> Result<(), PlatformError> {
        self.request_discard(
            Method::DELETE,
            &format!("apps/{app_name}/dynos/{dyno_id}"),
            None,
        )
    }

    fn restart_all(&self, app_name: &str) -> Result<(), PlatformError> {
        self.request_discard(Method::DELETE, &format!("apps/{app_name}/dynos"), None)
    }
}
