//! Moodle web-service proxy — course listings and course contents.
//!
//! A thin pass-through over Moodle's REST web services, shaped for the
//! course-browsing frontend. No launch security lives here; the web-service
//! token authorizes read-only catalogue calls and is never logged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::MoodleConfig;
use crate::{Error, Result};

/// A course as the frontend consumes it.
#[derive(Debug, Clone, Serialize)]
pub struct Course {
    /// Moodle course id
    pub id: u64,
    /// Full display name
    pub fullname: String,
    /// Short name
    pub shortname: String,
    /// Summary text (placeholder when Moodle sends none)
    pub summary: String,
    /// Category display name
    pub categoryname: String,
    /// Enrolled user count
    pub enrolledusercount: u64,
    /// Course format (topics, weeks, ...)
    pub format: String,
    /// First overview image, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imageurl: Option<String>,
}

/// Raw course row from `core_course_get_courses`.
#[derive(Debug, Deserialize)]
struct RawCourse {
    id: u64,
    fullname: String,
    shortname: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    categoryname: Option<String>,
    #[serde(default)]
    enrolledusercount: Option<u64>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    overviewfiles: Vec<RawOverviewFile>,
}

#[derive(Debug, Deserialize)]
struct RawOverviewFile {
    #[serde(default)]
    fileurl: Option<String>,
}

impl From<RawCourse> for Course {
    fn from(raw: RawCourse) -> Self {
        Self {
            id: raw.id,
            fullname: raw.fullname,
            shortname: raw.shortname,
            summary: raw
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "No description available".to_string()),
            categoryname: raw
                .categoryname
                .unwrap_or_else(|| "Uncategorized".to_string()),
            enrolledusercount: raw.enrolledusercount.unwrap_or(0),
            format: raw.format.unwrap_or_else(|| "Unknown".to_string()),
            imageurl: raw.overviewfiles.into_iter().find_map(|f| f.fileurl),
        }
    }
}

/// Client for Moodle's REST web-service endpoint.
#[derive(Debug)]
pub struct MoodleClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl MoodleClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when credentials are missing.
    pub fn from_config(config: &MoodleConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(Error::Config(
                "Moodle credentials not configured".to_string(),
            ));
        }

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http: reqwest::Client::new(),
        })
    }

    /// List all courses visible to the web-service token.
    pub async fn courses(&self) -> Result<Vec<Course>> {
        let raw: Vec<RawCourse> = self
            .call("core_course_get_courses", &[])
            .await?;

        debug!(count = raw.len(), "Fetched Moodle courses");
        Ok(raw.into_iter().map(Course::from).collect())
    }

    /// Course contents (sections and modules), passed through unmodified.
    pub async fn course_contents(&self, course_id: u64) -> Result<Value> {
        let contents: Value = self
            .call(
                "core_course_get_contents",
                &[("courseid", course_id.to_string())],
            )
            .await?;

        Ok(contents)
    }

    /// Call one web-service function and decode the JSON response.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        wsfunction: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        debug!(wsfunction = %wsfunction, "Calling Moodle web service");

        let response = self
            .http
            .get(format!("{}/webservice/rest/server.php", self.base_url))
            .query(&[
                ("wstoken", self.token.as_str()),
                ("wsfunction", wsfunction),
                ("moodlewsrestformat", "json"),
            ])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Moodle request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "Moodle API returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid Moodle response: {e}")))?;

        // Moodle reports errors as 200s with an exception envelope
        if let Some(exception) = body.get("exception") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::Upstream(format!(
                "Moodle exception {exception}: {message}"
            )));
        }

        serde_json::from_value(body)
            .map_err(|e| Error::Upstream(format!("unexpected Moodle response shape: {e}")))
    }
}
