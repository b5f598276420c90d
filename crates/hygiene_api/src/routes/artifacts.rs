//! `GET /jobs/:id/{artefact}`.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use hygiene_ids::JobId;
use hygiene_protocol::types::ArtifactName;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct DownloadQuery {
    #[serde(default)]
    pub download: bool,
}

pub async fn download(
    State(state): State<AppState>,
    Path((job_id, artifact)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let job_id = JobId::parse(&job_id).map_err(|e| ApiError::validation(e.to_string()))?;
    let name = ArtifactName::parse(&artifact).ok_or_else(|| ApiError::validation(format!("unknown artifact: {artifact}")))?;

    let stream = state.artifacts.get(&job_id, name).await?;
    let body = Body::from_stream(ReaderStream::new(stream.reader));

    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, stream.content_type)
        .body(body)
        .expect("static headers are always valid");

    if query.download {
        response.headers_mut().insert(
            header::CONTENT_DISPOSITION,
            header::HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name.file_name()))
                .expect("artifact file names are ASCII"),
        );
    }

    Ok(response)
}
