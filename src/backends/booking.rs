//! Seat-booking service and the SSO token exchange that feeds it.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::classify::{BackendResponse, RawFailure};
use crate::facade::{BackendCall, Reply};
use crate::reauth::{ReauthError, ReauthStrategy};
use crate::session::{BackendId, Credential, CredentialView, Session, SessionStore};

const SUCCESS_CODE: &str = "0";
const MAX_REDIRECTS: usize = 8;

/// HTTP client bound to the booking service.
#[derive(Debug, Clone)]
pub struct BookingApi {
    client: Client,
    base: Url,
}

impl BookingApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }
}

/// A JSON `POST` to one booking endpoint, authenticated by the `token` header.
pub struct BookingCall<P, T> {
    api: BookingApi,
    path: String,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T> BookingCall<P, T> {
    pub fn new(api: BookingApi, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P, T> BackendCall for BookingCall<P, T>
where
    P: Serialize + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Params = P;
    type Output = T;

    fn backend(&self) -> BackendId {
        BackendId::Booking
    }

    fn name(&self) -> &str {
        &self.path
    }

    async fn call(&self, params: &P, credentials: &CredentialView) -> Result<Reply<T>, RawFailure> {
        let url = self.api.base.join(&self.path).map_err(|err| RawFailure::Malformed {
            backend: BackendId::Booking,
            detail: format!("invalid path {}: {err}", self.path),
        })?;
        let token = credentials
            .credential(BackendId::Booking)
            .map(Credential::expose)
            .unwrap_or_default();

        let response = self
            .api
            .client
            .post(url)
            .header("token", token)
            .json(params)
            .send()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;

        let response = BackendResponse::new(BackendId::Booking, status.as_u16(), body);
        let data = match &response.envelope {
            Some(envelope) if status.is_success() && envelope.code == SUCCESS_CODE => {
                envelope.data.clone()
            }
            _ => return Err(response.into()),
        };
        serde_json::from_value(data)
            .map(Reply::new)
            .map_err(|err| RawFailure::Malformed {
                backend: BackendId::Booking,
                detail: format!("unexpected data shape: {err}"),
            })
    }
}

/// Obtains a booking token by walking the SSO authorize redirects with the
/// SSO cookie.
pub struct TokenExchangeStrategy {
    client: Client,
    exchange_url: Url,
    token_param: String,
    sessions: Arc<SessionStore>,
}

impl TokenExchangeStrategy {
    pub fn new(
        exchange_url: Url,
        token_param: impl Into<String>,
        sessions: Arc<SessionStore>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            exchange_url,
            token_param: token_param.into(),
            sessions,
        })
    }

    fn token_in(&self, url: &Url) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == self.token_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}

/// Merge `name=value` pairs from `Set-Cookie` headers into a cookie string.
///
/// A cookie the server sets again replaces the old value in place.
fn merge_cookies(cookie: &mut String, set_cookies: impl Iterator<Item = String>) {
    let mut jar: Vec<(String, String)> = cookie
        .split(';')
        .filter_map(|pair| split_pair(pair.trim()))
        .collect();

    for set_cookie in set_cookies {
        let Some((name, value)) = set_cookie.split(';').next().and_then(|p| split_pair(p.trim())) else {
            continue;
        };
        match jar.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => jar.push((name, value)),
        }
    }

    *cookie = jar
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
}

fn split_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

#[async_trait]
impl ReauthStrategy for TokenExchangeStrategy {
    async fn reauthenticate(
        &self,
        _backend: BackendId,
        _session: &Session,
    ) -> Result<Credential, ReauthError> {
        let sso = self.sessions.get(BackendId::Sso);
        let mut cookie = sso
            .credential()
            .map(|c| c.expose().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ReauthError::InvalidCredentials("no SSO session".to_string()))?;

        let mut url = self.exchange_url.clone();
        for hop in 0..MAX_REDIRECTS {
            let response = self
                .client
                .get(url.clone())
                .header(COOKIE, cookie.as_str())
                .send()
                .await
                .map_err(|err| ReauthError::Unreachable(err.to_string()))?;

            merge_cookies(
                &mut cookie,
                response
                    .headers()
                    .get_all(SET_COOKIE)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .map(str::to_string),
            );

            let status = response.status();
            if !status.is_redirection() {
                return Err(if matches!(status.as_u16(), 401 | 403) || status.is_success() {
                    // Landing on a page instead of a redirect means SSO wants a login.
                    ReauthError::InvalidCredentials(format!("SSO stopped redirecting with HTTP {status}"))
                } else {
                    ReauthError::Unreachable(format!("SSO exchange failed with HTTP {status}"))
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| ReauthError::Unreachable("redirect without Location".to_string()))?;
            url = url
                .join(location)
                .map_err(|err| ReauthError::Unreachable(format!("bad redirect {location}: {err}")))?;

            if let Some(token) = self.token_in(&url) {
                tracing::debug!(hops = hop + 1, "Booking token obtained from SSO");
                return Ok(Credential::new(token));
            }
        }

        Err(ReauthError::Unreachable(format!(
            "no booking token after {MAX_REDIRECTS} redirects"
        )))
    }
}
