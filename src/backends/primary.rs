//! Primary envelope API.
//!
//! # Responsibilities
//! - Decorate requests with the primary token pair and the academic cookie
//! - Unwrap `{code, message, data}` envelopes
//! - Pick up rotated `access-token` / `refresh-token` response headers
//! - Refresh an expired token pair
//!
//! # Design Decisions
//! - The primary credential is a JSON-encoded [`TokenPair`]; the academic
//!   credential is a JSON-encoded [`AcademicCookie`]
//! - Non-success envelopes are returned raw for the classifier to interpret

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::classify::{BackendResponse, RawFailure};
use crate::facade::{BackendCall, Reply};
use crate::reauth::{ReauthError, ReauthStrategy};
use crate::session::{BackendId, Credential, CredentialView, Session};

const ACCESS_TOKEN_HEADER: &str = "access-token";
const REFRESH_TOKEN_HEADER: &str = "refresh-token";

/// Access and refresh tokens of the primary API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    pub fn to_credential(&self) -> Credential {
        Credential::new(json!({"access": self.access, "refresh": self.refresh}).to_string())
    }

    pub fn from_credential(credential: &Credential) -> Option<Self> {
        serde_json::from_str(credential.expose()).ok()
    }

    /// Apply rotated token headers; `None` when the response carried none.
    fn rotated(current: Option<Self>, headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let (access, refresh) = (header(ACCESS_TOKEN_HEADER), header(REFRESH_TOKEN_HEADER));
        if access.is_none() && refresh.is_none() {
            return None;
        }

        let current = current.unwrap_or_else(|| Self::new("", ""));
        Some(Self {
            access: access.unwrap_or(current.access),
            refresh: refresh.unwrap_or(current.refresh),
        })
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair(<redacted>)")
    }
}

/// Academic-system session forwarded through the primary API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicCookie {
    pub id: String,
    pub cookies: String,
}

impl AcademicCookie {
    pub fn new(id: impl Into<String>, cookies: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cookies: cookies.into(),
        }
    }

    pub fn to_credential(&self) -> Credential {
        Credential::new(json!({"id": self.id, "cookies": self.cookies}).to_string())
    }

    pub fn from_credential(credential: &Credential) -> Option<Self> {
        serde_json::from_str(credential.expose()).ok()
    }
}

impl fmt::Debug for AcademicCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcademicCookie")
            .field("id", &self.id)
            .field("cookies", &"<redacted>")
            .finish()
    }
}

/// HTTP client bound to the primary API.
#[derive(Debug, Clone)]
pub struct PrimaryApi {
    client: Client,
    base: Url,
    success_code: String,
}

impl PrimaryApi {
    pub fn new(
        base: Url,
        timeout: Duration,
        success_code: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            success_code: success_code.into(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RawFailure> {
        let url = self.base.join(path).map_err(|err| RawFailure::Malformed {
            backend: BackendId::Primary,
            detail: format!("invalid path {path}: {err}"),
        })?;
        Ok(self.client.request(method, url))
    }

    fn decorate(&self, mut builder: RequestBuilder, view: &CredentialView) -> RequestBuilder {
        if let Some(tokens) = view
            .credential(BackendId::Primary)
            .and_then(TokenPair::from_credential)
        {
            builder = builder
                .header(AUTHORIZATION, tokens.access.as_str())
                .header("Access-Token", tokens.access.as_str());
        }
        if let Some(academic) = view
            .credential(BackendId::Academic)
            .and_then(AcademicCookie::from_credential)
        {
            builder = builder
                .header("Id", academic.id.as_str())
                .header("Cookies", academic.cookies.as_str());
        }
        builder
    }

    /// Send a decorated request and unwrap the envelope's `data`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        view: &CredentialView,
    ) -> Result<Reply<T>, RawFailure> {
        let response = self
            .decorate(builder, view)
            .send()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;

        let status = response.status();
        let current = view
            .credential(BackendId::Primary)
            .and_then(TokenPair::from_credential);
        let rotated = TokenPair::rotated(current, response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;

        let response = BackendResponse::new(BackendId::Primary, status.as_u16(), body);
        let data = match &response.envelope {
            Some(envelope) if status.is_success() && envelope.code == self.success_code => {
                envelope.data.clone()
            }
            _ => return Err(response.into()),
        };

        let value = serde_json::from_value(data).map_err(|err| RawFailure::Malformed {
            backend: BackendId::Primary,
            detail: format!("unexpected data shape: {err}"),
        })?;
        let mut reply = Reply::new(value);
        if let Some(tokens) = rotated {
            tracing::debug!("Primary API rotated the token pair");
            reply = reply.rotate(BackendId::Primary, tokens.to_credential());
        }
        Ok(reply)
    }
}

/// A typed call to one primary API endpoint.
///
/// `GET` sends the params as a query string, every other method as a JSON body.
pub struct EnvelopeCall<P, T> {
    api: PrimaryApi,
    name: String,
    method: Method,
    path: String,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T> EnvelopeCall<P, T> {
    pub fn new(api: PrimaryApi, method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            api,
            name: format!("{method} {path}"),
            method,
            path,
            _marker: PhantomData,
        }
    }

    pub fn get(api: PrimaryApi, path: impl Into<String>) -> Self {
        Self::new(api, Method::GET, path)
    }

    pub fn post(api: PrimaryApi, path: impl Into<String>) -> Self {
        Self::new(api, Method::POST, path)
    }
}

#[async_trait]
impl<P, T> BackendCall for EnvelopeCall<P, T>
where
    P: Serialize + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Params = P;
    type Output = T;

    fn backend(&self) -> BackendId {
        BackendId::Primary
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, params: &P, credentials: &CredentialView) -> Result<Reply<T>, RawFailure> {
        let builder = self.api.request(self.method.clone(), &self.path)?;
        let builder = if self.method == Method::GET {
            builder.query(params)
        } else {
            builder.json(params)
        };
        self.api.send(builder, credentials).await
    }
}

/// Re-login for the primary API using the stored refresh token.
pub struct RefreshTokenStrategy {
    api: PrimaryApi,
    refresh_path: String,
    auth_codes: HashSet<String>,
}

impl RefreshTokenStrategy {
    pub fn new(
        api: PrimaryApi,
        refresh_path: impl Into<String>,
        auth_codes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            api,
            refresh_path: refresh_path.into(),
            auth_codes: auth_codes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ReauthStrategy for RefreshTokenStrategy {
    async fn reauthenticate(
        &self,
        _backend: BackendId,
        session: &Session,
    ) -> Result<Credential, ReauthError> {
        let tokens = session
            .credential()
            .and_then(TokenPair::from_credential)
            .filter(|tokens| !tokens.refresh.is_empty())
            .ok_or_else(|| ReauthError::InvalidCredentials("no refresh token stored".to_string()))?;

        let builder = self
            .api
            .request(Method::GET, &self.refresh_path)
            .map_err(|raw| ReauthError::Unreachable(format!("{raw:?}")))?
            .header(AUTHORIZATION, tokens.refresh.as_str());
        let response = builder
            .send()
            .await
            .map_err(|err| ReauthError::Unreachable(err.to_string()))?;

        let status = response.status();
        let rotated = TokenPair::rotated(Some(tokens), response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| ReauthError::Unreachable(err.to_string()))?;
        let response = BackendResponse::new(BackendId::Primary, status.as_u16(), body);

        match &response.envelope {
            Some(envelope) if envelope.code == self.api.success_code => {}
            Some(envelope) if self.auth_codes.contains(&envelope.code) => {
                return Err(ReauthError::InvalidCredentials(format!(
                    "refresh rejected with code {}",
                    envelope.code
                )))
            }
            _ if matches!(status.as_u16(), 401 | 403) => {
                return Err(ReauthError::InvalidCredentials(format!("refresh rejected with HTTP {status}")))
            }
            Some(envelope) => {
                return Err(ReauthError::Unreachable(format!(
                    "refresh failed with code {}: {}",
                    envelope.code, envelope.message
                )))
            }
            None => return Err(ReauthError::Unreachable(format!("refresh failed with HTTP {status}"))),
        }

        rotated
            .filter(|tokens| !tokens.access.is_empty())
            .map(|tokens| tokens.to_credential())
            .ok_or_else(|| ReauthError::Unreachable("refresh response carried no access token".to_string()))
    }
}
