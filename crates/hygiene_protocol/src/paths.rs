//! Object-store key layout: `{job_id}/artifacts/{name}`.

use hygiene_ids::JobId;

use crate::types::ArtifactName;

/// Compute the object-store key for a job's artefact.
pub fn artifact_key(job_id: &JobId, name: ArtifactName) -> String {
    format!("{job_id}/artifacts/{}", name.file_name())
}

/// Compute the key prefix under which all of a job's artefacts live.
pub fn job_prefix(job_id: &JobId) -> String {
    format!("{job_id}/artifacts/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_spec() {
        let id = JobId::parse("11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(
            artifact_key(&id, ArtifactName::Report),
            "11111111-1111-1111-1111-111111111111/artifacts/report.md"
        );
    }
}
