//! gRPC client for the Directory Service

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::debug;

use super::{AccessTokenLookup, AccessTokenRecord, DirectoryError, UserLookup, UserRecord};
use crate::{Error, Result};

/// Generated Directory Service protocol types
#[allow(clippy::pedantic, missing_docs)]
pub mod proto {
    tonic::include_proto!("directory.v1");
}

use proto::directory_service_client::DirectoryServiceClient;

/// Directory client over a lazily connected channel
#[derive(Clone)]
pub struct GrpcDirectoryClient {
    client: DirectoryServiceClient<Channel>,
}

impl GrpcDirectoryClient {
    /// Build a client; no connection is attempted until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid endpoint URI.
    pub fn connect_lazy(url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::from_shared(url.to_string())
            .map_err(|e| Error::Config(format!("invalid directory url {url}: {e}")))?
            .timeout(timeout)
            .connect_timeout(timeout);
        Ok(Self::new(endpoint.connect_lazy()))
    }

    /// Wrap an existing channel
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            client: DirectoryServiceClient::new(channel),
        }
    }
}

fn map_status(status: Status) -> DirectoryError {
    if status.code() == Code::NotFound {
        DirectoryError::NotFound
    } else {
        DirectoryError::Unavailable(status)
    }
}

fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        None
    } else {
        DateTime::from_timestamp(secs, 0)
    }
}

fn to_epoch(time: Option<DateTime<Utc>>) -> i64 {
    time.map_or(0, |t| t.timestamp())
}

impl From<proto::User> for UserRecord {
    fn from(user: proto::User) -> Self {
        Self {
            id: user.id,
            external_id: user.external_id,
            organization_ids: user.organization_ids,
            email: Some(user.email).filter(|e| !e.is_empty()),
            last_logout: from_epoch(user.last_logout_date),
            current_login: from_epoch(user.current_login_date),
            previous_login: from_epoch(user.previous_login_date),
        }
    }
}

impl From<proto::PersonalAccessToken> for AccessTokenRecord {
    fn from(token: proto::PersonalAccessToken) -> Self {
        Self {
            id: token.id,
            user_id: token.user_id,
            organization_id: Some(token.organization_id).filter(|o| !o.is_empty()),
            expires_at: from_epoch(token.expires_at),
            status: token.status,
        }
    }
}

#[async_trait]
impl UserLookup for GrpcDirectoryClient {
    async fn user_by_external_id(
        &self,
        external_id: &str,
    ) -> std::result::Result<UserRecord, DirectoryError> {
        debug!(external_id = %external_id, "Directory lookup: user");
        let request = proto::GetUserByExternalIdRequest {
            external_id: external_id.to_string(),
        };
        let response = self
            .client
            .clone()
            .get_user_by_external_id(request)
            .await
            .map_err(map_status)?;
        Ok(response.into_inner().into())
    }

    async fn update_login_time(&self, user: &UserRecord) -> std::result::Result<(), DirectoryError> {
        let request = proto::UpdateUserLoginTimeRequest {
            user_id: user.id.clone(),
            current_login_date: to_epoch(user.current_login),
            previous_login_date: to_epoch(user.previous_login),
        };
        self.client
            .clone()
            .update_user_login_time(request)
            .await
            .map_err(map_status)?;
        Ok(())
    }
}

#[async_trait]
impl AccessTokenLookup for GrpcDirectoryClient {
    async fn access_token_by_hash(
        &self,
        hash: &str,
    ) -> std::result::Result<AccessTokenRecord, DirectoryError> {
        debug!("Directory lookup: access token");
        let request = proto::GetPersonalAccessTokenByHashRequest {
            hash: hash.to_string(),
        };
        let response = self
            .client
            .clone()
            .get_personal_access_token_by_hash(request)
            .await
            .map_err(map_status)?;
        Ok(response.into_inner().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        assert!(matches!(
            map_status(Status::not_found("nope")),
            DirectoryError::NotFound
        ));
        assert!(matches!(
            map_status(Status::unavailable("down")),
            DirectoryError::Unavailable(_)
        ));
    }

    #[test]
    fn zero_timestamps_mean_never() {
        let record: UserRecord = proto::User {
            id: "u-1".into(),
            external_id: "ext".into(),
            organization_ids: vec!["org".into()],
            last_logout_date: 0,
            current_login_date: 100,
            previous_login_date: 0,
            email: String::new(),
        }
        .into();

        assert_eq!(record.last_logout, None);
        assert_eq!(record.current_login.map(|t| t.timestamp()), Some(100));
        assert_eq!(record.email, None);
        assert_eq!(to_epoch(record.previous_login), 0);
    }

    #[test]
    fn empty_organization_is_absent() {
        let record: AccessTokenRecord = proto::PersonalAccessToken {
            id: "pat".into(),
            user_id: "u".into(),
            organization_id: String::new(),
            expires_at: 10,
            status: "active".into(),
        }
        .into();

        assert_eq!(record.organization_id, None);
    }

    #[tokio::test]
    async fn rejects_invalid_url() {
        assert!(GrpcDirectoryClient::connect_lazy("not a uri", Duration::from_secs(1)).is_err());
    }
}
