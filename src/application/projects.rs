//! Project list loading through the read-through cache.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    cache::{CachifiedError, CachifiedOptions, CacheService, FreshnessContext, SqliteStore, Timings},
    config::{ContentEnvironment, ContentSettings, ProjectsSource},
    domain::{
        error::DomainError,
        projects::{Project, find_by_slug},
    },
};

pub const PROJECTS_KEY: &str = "content:data:projects";

const PRODUCTION_TTL: Duration = Duration::from_secs(60 * 60);
const PRODUCTION_SWR: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download `{url}`: {source}")]
    Download {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to parse project list: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Cache(#[from] CachifiedError),
}

/// Serves the project list from the durable cache tier.
#[derive(Clone)]
pub struct ProjectService {
    cache: CacheService,
    source: ProjectsSource,
    environment: ContentEnvironment,
    http: reqwest::Client,
}

impl ProjectService {
    pub fn new(cache: CacheService, settings: &ContentSettings) -> Self {
        Self {
            cache,
            source: settings.projects_source.clone(),
            environment: settings.environment,
            http: reqwest::Client::new(),
        }
    }

    fn store(&self) -> &Arc<SqliteStore> {
        self.cache.durable()
    }

    #[instrument(skip_all, fields(source = %self.source))]
    pub async fn projects(
        &self,
        context: Option<&FreshnessContext>,
        timings: Option<&Timings>,
    ) -> Result<Vec<Project>, ContentError> {
        let mut options = CachifiedOptions::new(PROJECTS_KEY).check_value(Value::is_array);
        options = if self.environment.is_development() {
            options
                .ttl(Duration::ZERO)
                .stale_while_revalidate(Duration::ZERO)
                .force_fresh(true)
        } else {
            options
                .ttl(PRODUCTION_TTL)
                .stale_while_revalidate(PRODUCTION_SWR)
        };
        if let Some(context) = context {
            options = options.context(context);
        }
        if let Some(timings) = timings {
            options = options.timings(timings);
        }

        let source = self.source.clone();
        let http = self.http.clone();
        let projects = self
            .cache
            .cachified()
            .run(self.store(), options, move || load_projects(source, http))
            .await?;
        Ok(projects)
    }

    pub async fn project_by_slug(
        &self,
        slug: &str,
        context: Option<&FreshnessContext>,
        timings: Option<&Timings>,
    ) -> Result<Project, ContentError> {
        let projects = self.projects(context, timings).await?;
        find_by_slug(&projects, slug)
            .cloned()
            .ok_or_else(|| DomainError::not_found("project").into())
    }
}

async fn load_projects(
    source: ProjectsSource,
    http: reqwest::Client,
) -> Result<Vec<Project>, ContentError> {
    let text = match source {
        ProjectsSource::File(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ContentError::Read { path, source })?,
        ProjectsSource::Remote(url) => download(&http, url).await?,
    };
    let projects = parse_projects(&text)?;
    debug!(count = projects.len(), "project list loaded");
    Ok(projects)
}

async fn download(http: &reqwest::Client, url: Url) -> Result<String, ContentError> {
    let response = match http.get(url.clone()).send().await {
        Ok(response) => response,
        Err(source) => return Err(ContentError::Download { url, source }),
    };
    match response.error_for_status() {
        Ok(response) => response
            .text()
            .await
            .map_err(|source| ContentError::Download { url, source }),
        Err(source) => Err(ContentError::Download { url, source }),
    }
}

/// Parse a YAML sequence of projects, skipping `null` and `false` items.
pub fn parse_projects(text: &str) -> Result<Vec<Project>, ContentError> {
    let document: serde_yaml::Value = serde_yaml::from_str(text)?;
    let serde_yaml::Value::Sequence(items) = document else {
        return Err(DomainError::validation("Projects is not an array.").into());
    };

    items
        .into_iter()
        .filter(|item| !matches!(item, serde_yaml::Value::Null | serde_yaml::Value::Bool(false)))
        .map(|item| serde_yaml::from_value(item).map_err(ContentError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- title: Ray marcher
  slug: ray-marcher
  description: Signed distance fields on the GPU
  cover_image: /images/ray.png
  images: [/images/ray-1.png]
  tags: [graphics, rust]
- null
- false
- title: Synth
  slug: synth
  description: A tiny synthesizer
  cover_image: /images/synth.png
  images: []
  links:
    github: https://github.com/example/synth
"#;

    #[test]
    fn falsy_items_are_skipped() {
        let projects = parse_projects(SAMPLE).expect("projects");
        let slugs: Vec<&str> = projects.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["ray-marcher", "synth"]);
    }

    #[test]
    fn mapping_document_is_rejected() {
        let err = parse_projects("title: not a list").expect_err("mapping");
        assert!(matches!(err, ContentError::Domain(DomainError::Validation { .. })));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = parse_projects("- [unterminated").expect_err("invalid yaml");
        assert!(matches!(err, ContentError::Parse(_)));
    }
}
