//! Identity one-code service: payment and campus-card QR codes.
//!
//! Calls carry `Authorization: Bearer <token>`. The token comes from a
//! username/password login, so re-login goes through
//! [`StoredAccountStrategy`](crate::reauth::StoredAccountStrategy) with
//! [`IdentityLogin`] as its flow.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::{BackendResponse, Envelope, RawFailure};
use crate::facade::{BackendCall, Reply};
use crate::reauth::{LoginFlow, ReauthError};
use crate::session::{Account, BackendId, Credential, CredentialView};

const SUCCESS_CODE: &str = "0";

/// HTTP client bound to the identity service.
#[derive(Debug, Clone)]
pub struct IdentityApi {
    client: Client,
    base: Url,
}

impl IdentityApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }
}

/// A JSON `POST` to one identity endpoint with the bearer token.
pub struct IdentityCall<P, T> {
    api: IdentityApi,
    path: String,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T> IdentityCall<P, T> {
    pub fn new(api: IdentityApi, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P, T> BackendCall for IdentityCall<P, T>
where
    P: Serialize + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Params = P;
    type Output = T;

    fn backend(&self) -> BackendId {
        BackendId::Identity
    }

    fn name(&self) -> &str {
        &self.path
    }

    async fn call(&self, params: &P, credentials: &CredentialView) -> Result<Reply<T>, RawFailure> {
        let url = self.api.endpoint(&self.path).map_err(|err| RawFailure::Malformed {
            backend: BackendId::Identity,
            detail: format!("invalid path {}: {err}", self.path),
        })?;
        let token = credentials
            .credential(BackendId::Identity)
            .map(Credential::expose)
            .unwrap_or_default();

        let response = self
            .api
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(params)
            .send()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RawFailure::from_reqwest(&err))?;

        let response = BackendResponse::new(BackendId::Identity, status.as_u16(), body);
        let data = match &response.envelope {
            Some(envelope) if status.is_success() && envelope.code == SUCCESS_CODE => {
                envelope.data.clone()
            }
            _ => return Err(response.into()),
        };
        serde_json::from_value(data)
            .map(Reply::new)
            .map_err(|err| RawFailure::Malformed {
                backend: BackendId::Identity,
                detail: format!("unexpected data shape: {err}"),
            })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    is_not_permanent: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginData {
    #[serde(default)]
    name: String,
    access_token: String,
}

/// Username/password login against the identity service.
pub struct IdentityLogin {
    api: IdentityApi,
    login_path: String,
}

impl IdentityLogin {
    pub fn new(api: IdentityApi, login_path: impl Into<String>) -> Self {
        Self {
            api,
            login_path: login_path.into(),
        }
    }
}

#[async_trait]
impl LoginFlow for IdentityLogin {
    async fn login(&self, account: &Account) -> Result<Credential, ReauthError> {
        if account.id.is_empty() || account.password.is_empty() {
            return Err(ReauthError::InvalidCredentials(
                "student id and password are required".to_string(),
            ));
        }

        let url = self
            .api
            .endpoint(&self.login_path)
            .map_err(|err| ReauthError::Unreachable(format!("invalid login path: {err}")))?;
        let response = self
            .api
            .client
            .post(url)
            .json(&LoginRequest {
                is_not_permanent: "false",
                username: &account.id,
                password: &account.password,
            })
            .send()
            .await
            .map_err(|err| ReauthError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReauthError::Unreachable(format!(
                "identity login failed with HTTP {status}"
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|err| ReauthError::Unreachable(err.to_string()))?;

        let envelope = Envelope::parse(&body)
            .ok_or_else(|| ReauthError::Unreachable("login reply is not an envelope".to_string()))?;
        if envelope.code != SUCCESS_CODE {
            return Err(ReauthError::InvalidCredentials(envelope.message));
        }

        let data: LoginData = serde_json::from_value(envelope.data)
            .map_err(|err| ReauthError::Unreachable(format!("unexpected login data: {err}")))?;
        tracing::debug!(account = %account.id, name = %data.name, "Identity login succeeded");
        Ok(Credential::new(data.access_token))
    }
}
