use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Failure of a single fetch attempt. Retry policy lives in the sequence
/// generator, not here.
#[derive(Debug, Error)]
pub(crate) enum FetchError {
    /// The endpoint reported 404; the id will never resolve.
    #[error("team {0} does not exist")]
    NotFound(u64),

    /// Network failure, timeout, or an unexpected status; worth retrying.
    #[error("transient failure: {0}")]
    Transient(#[from] reqwest::Error),
}

/// Performs one GET for the given team id, substituting `{id}` into the
/// endpoint template.
pub(crate) async fn fetch_team(
    client: &Client,
    endpoint: &str,
    id: u64,
) -> Result<Bytes, FetchError> {
    let url = endpoint.replace("{id}", &id.to_string());

    let response = client.get(&url).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(id));
    }

    let response = response.error_for_status()?;

    Ok(response.bytes().await?)
}
