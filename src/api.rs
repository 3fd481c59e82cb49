// API client module: a small blocking HTTP client for a Label-Studio
// compatible annotation platform. It owns the auth header and the endpoint
// paths; everything above it works with the typed records below.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::sync::{Record, RemoteError, RemoteTask, TaskStore};

/// List endpoints are paginated; pages are walked until a short one.
const PAGE_SIZE: usize = 100;

/// Where the platform lives and how to authenticate against it. Built once
/// at the composition root and handed to `ApiClient::new`; nothing else in
/// the crate reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub api_key: String,
}

impl Config {
    /// Read `LABELOPS_BASE_URL` (default `http://localhost:8080`) and
    /// `LABELOPS_API_KEY` (required).
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("LABELOPS_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into());
        let api_key =
            std::env::var("LABELOPS_API_KEY").context("LABELOPS_API_KEY must be set")?;
        Ok(Config::new(base_url, api_key))
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Config {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

/// A project on the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
}

#[derive(Deserialize)]
struct ProjectPage {
    results: Vec<Project>,
}

#[derive(Deserialize)]
struct TaskPage {
    tasks: Vec<RemoteTask>,
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    title: &'a str,
    label_config: &'a str,
}

/// Blocking client for the platform API. Holds a reqwest client with the
/// token header baked in, so calls are one-liners at the call sites.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        // Legacy token scheme: `Authorization: Token <key>`.
        let token = HeaderValue::from_str(&format!("Token {}", config.api_key))
            .context("API key contains characters that cannot be sent in a header")?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: config.base_url,
        })
    }

    /// All projects, across pages, in the platform's listing order.
    pub fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        let mut projects = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/api/projects?page={}&page_size={}",
                self.base_url, page, PAGE_SIZE
            );
            let res = self
                .client
                .get(&url)
                .send()
                .map_err(|e| RemoteError::new(format!("Listing projects failed: {}", e)))?;
            // The platform answers 404 past the last page instead of an
            // empty one.
            if page > 1 && res.status() == StatusCode::NOT_FOUND {
                break;
            }
            let body: ProjectPage = parse(check(res, "Listing projects")?)?;
            let count = body.results.len();
            projects.extend(body.results);
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(projects)
    }

    pub fn create_project(
        &self,
        title: &str,
        label_config: &str,
    ) -> Result<Project, RemoteError> {
        let url = format!("{}/api/projects", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&CreateProjectRequest {
                title,
                label_config,
            })
            .send()
            .map_err(|e| RemoteError::new(format!("Creating project failed: {}", e)))?;
        parse(check(res, "Creating project")?)
    }

    pub fn delete_project(&self, project_id: i64) -> Result<(), RemoteError> {
        let url = format!("{}/api/projects/{}", self.base_url, project_id);
        let res = self
            .client
            .delete(&url)
            .send()
            .map_err(|e| RemoteError::new(format!("Deleting project failed: {}", e)))?;
        check(res, "Deleting project")?;
        Ok(())
    }

    pub fn delete_task(&self, task_id: i64) -> Result<(), RemoteError> {
        let url = format!("{}/api/tasks/{}", self.base_url, task_id);
        let res = self
            .client
            .delete(&url)
            .send()
            .map_err(|e| RemoteError::new(format!("Deleting task failed: {}", e)))?;
        check(res, "Deleting task")?;
        Ok(())
    }

    pub fn delete_all_tasks(&self, project_id: i64) -> Result<(), RemoteError> {
        let url = format!("{}/api/projects/{}/tasks", self.base_url, project_id);
        let res = self
            .client
            .delete(&url)
            .send()
            .map_err(|e| RemoteError::new(format!("Deleting tasks failed: {}", e)))?;
        check(res, "Deleting tasks")?;
        Ok(())
    }
}

impl TaskStore for ApiClient {
    fn list_tasks(&self, project_id: i64) -> Result<Vec<RemoteTask>, RemoteError> {
        let mut tasks = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/api/tasks?project={}&page={}&page_size={}",
                self.base_url, project_id, page, PAGE_SIZE
            );
            let res = self
                .client
                .get(&url)
                .send()
                .map_err(|e| RemoteError::new(format!("Listing tasks failed: {}", e)))?;
            if page > 1 && res.status() == StatusCode::NOT_FOUND {
                break;
            }
            let body: TaskPage = parse(check(res, "Listing tasks")?)?;
            let count = body.tasks.len();
            tasks.extend(body.tasks);
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(tasks)
    }

    fn import_tasks(&self, project_id: i64, batch: &[Record]) -> Result<(), RemoteError> {
        let url = format!("{}/api/projects/{}/import", self.base_url, project_id);
        let res = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .map_err(|e| RemoteError::new(format!("Importing tasks failed: {}", e)))?;
        check(res, "Importing tasks")?;
        Ok(())
    }

    fn update_task(&self, task_id: i64, data: &Record) -> Result<(), RemoteError> {
        let url = format!("{}/api/tasks/{}", self.base_url, task_id);
        let res = self
            .client
            .patch(&url)
            .json(&serde_json::json!({ "data": data }))
            .send()
            .map_err(|e| RemoteError::new(format!("Updating task failed: {}", e)))?;
        check(res, "Updating task")?;
        Ok(())
    }
}

/// Turn a non-2xx response into a `RemoteError` carrying status and body.
fn check(res: Response, what: &str) -> Result<Response, RemoteError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().unwrap_or_else(|_| "".into());
    Err(RemoteError::new(format!(
        "{} failed: {} - {}",
        what, status, body
    )))
}

fn parse<T: serde::de::DeserializeOwned>(res: Response) -> Result<T, RemoteError> {
    res.json()
        .map_err(|e| RemoteError::new(format!("Parsing response failed: {}", e)))
}
