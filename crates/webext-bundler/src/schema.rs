//! Manifest schema validation against the remote extension schema.
//!
//! Validation is a best-effort collaborator: a schema violation in the
//! rendered manifest is fatal (the broken manifest must never reach the
//! output directory), but a network that cannot produce the schema at all
//! only degrades the build to a warning. The line between the two is the
//! fetch itself: a DNS/connect failure within the one-second budget means
//! "offline", never "invalid".

use std::time::Duration;

use serde_json::Value;

use crate::{Error, Result};

/// The published JSON schema for extension manifests.
pub const MANIFEST_SCHEMA_URL: &str = "https://json.schemastore.org/chrome-manifest";

/// Budget for deciding whether the network is there at all.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for the full schema download once connected.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a validation attempt that did not find violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The manifest conforms to the schema.
    Valid,
    /// The schema could not be fetched or compiled; validation skipped.
    Skipped(String),
}

/// Validate `manifest` against the remote schema.
///
/// # Errors
///
/// [`Error::ManifestInvalid`] with the collected schema diagnostics when
/// the manifest does not conform. Network unavailability is not an error.
pub async fn validate_manifest(manifest: &Value) -> Result<ValidationOutcome> {
    let schema = match fetch_schema(MANIFEST_SCHEMA_URL).await {
        Ok(schema) => schema,
        Err(reason) => {
            tracing::warn!("skipping manifest validation: {reason}");
            return Ok(ValidationOutcome::Skipped(reason));
        }
    };
    validate_against(&schema, manifest)
}

/// Fetch and parse the schema document. All failures collapse into a
/// skip reason: an unreachable or broken schema host must not fail builds.
async fn fetch_schema(url: &str) -> std::result::Result<Value, String> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to construct HTTP client: {e}"))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("schema unreachable ({url}): {e}"))?;

    if !response.status().is_success() {
        return Err(format!("schema fetch returned {} ({url})", response.status()));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| format!("schema at {url} is not valid JSON: {e}"))
}

/// Validate `manifest` against an already-fetched `schema` document.
pub fn validate_against(schema: &Value, manifest: &Value) -> Result<ValidationOutcome> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            let reason = format!("schema did not compile: {e}");
            tracing::warn!("skipping manifest validation: {reason}");
            return Ok(ValidationOutcome::Skipped(reason));
        }
    };

    let diagnostics: Vec<String> = validator
        .iter_errors(manifest)
        .map(|error| format!("{}: {error}", error.instance_path()))
        .collect();

    if diagnostics.is_empty() {
        Ok(ValidationOutcome::Valid)
    } else {
        Err(Error::ManifestInvalid {
            diagnostics: diagnostics.join("\n"),
        })
    }
}
