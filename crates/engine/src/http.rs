//! Blocking HTTP+JSON client for the remote note service.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ideaflash_core::FlashId;

use crate::remote::{RemoteDraft, RemoteError, RemoteNote, RemoteNotes, RemoteUpdate};
use crate::session::{Session, SessionUser};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthSession {
    access_token: String,
}

/// `{session: {access_token}, user}` as returned by login and register.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    session: AuthSession,
    user: SessionUser,
}

impl From<AuthResponse> for Session {
    fn from(resp: AuthResponse) -> Self {
        Session {
            access_token: resp.session.access_token,
            user: resp.user,
        }
    }
}

pub struct HttpRemote {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpRemote {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::Transport(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!("{base_url} cannot be a base url")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            access_token: None,
        })
    }

    pub fn with_session(mut self, session: &Session) -> Self {
        self.access_token = Some(session.access_token.clone());
        self
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Appends path segments to the base url, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| {
                RemoteError::Transport(format!("{} cannot be a base url", self.base_url))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<Session, RemoteError> {
        self.authenticate("login", email, password)
    }

    pub fn register(&mut self, email: &str, password: &str) -> Result<Session, RemoteError> {
        self.authenticate("register", email, password)
    }

    /// Drops the token even if the server call fails.
    pub fn logout(&mut self) -> Result<(), RemoteError> {
        let result = match self.sign_out() {
            Err(RemoteError::Unauthenticated) => Ok(()),
            other => other,
        };
        self.access_token = None;
        result
    }

    fn authenticate(
        &mut self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let request = self
            .client
            .post(self.endpoint(&["auth", action])?)
            .json(&Credentials { email, password });
        let resp: AuthResponse = decode(send(request)?)?;
        let session = Session::from(resp);
        self.access_token = Some(session.access_token.clone());
        log::info!("authenticated as {}", session.user.id);
        Ok(session)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let token = self.access_token.as_ref().ok_or(RemoteError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }
}

fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
    let resp = request.send().map_err(|e| {
        if e.is_timeout() {
            RemoteError::Transport(format!("timed out: {e}"))
        } else {
            RemoteError::Transport(e.to_string())
        }
    })?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    resp.json::<T>().map_err(|e| RemoteError::Decode(e.to_string()))
}

impl RemoteNotes for HttpRemote {
    fn create_note(&self, draft: &RemoteDraft) -> Result<RemoteNote, RemoteError> {
        let request = self.authorized(self.client.post(self.endpoint(&["posts"])?))?;
        decode(send(request.json(draft))?)
    }

    fn list_notes(&self) -> Result<Vec<RemoteNote>, RemoteError> {
        let request = self.authorized(self.client.get(self.endpoint(&["posts"])?))?;
        decode(send(request)?)
    }

    fn update_note(
        &self,
        flash_id: &FlashId,
        update: &RemoteUpdate,
    ) -> Result<RemoteNote, RemoteError> {
        let url = self.endpoint(&["posts", flash_id.as_str()])?;
        let request = self.authorized(self.client.put(url))?;
        decode(send(request.json(update))?)
    }

    fn delete_note(&self, flash_id: &FlashId) -> Result<(), RemoteError> {
        let url = self.endpoint(&["posts", flash_id.as_str()])?;
        let request = self.authorized(self.client.delete(url))?;
        send(request)?;
        Ok(())
    }

    fn sign_out(&self) -> Result<(), RemoteError> {
        let url = self.endpoint(&["auth", "logout"])?;
        let request = self.authorized(self.client.post(url))?;
        send(request)?;
        Ok(())
    }
}
