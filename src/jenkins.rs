// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Jenkins client.
//!
//! [`JenkinsApi`] is everything a run needs from a Jenkins server. Jenkins
//! itself is the only persistent store autojobs has, every decision is made
//! by reading job documents back from it. [`HttpJenkins`] implements the
//! trait over the Jenkins remote access API.
//!
//! # Crumbs
//!
//! Jenkins protects every POST with a CSRF crumb, and binds that crumb to the
//! web session it was issued in. The client keeps a cookie store so that the
//! session cookie of the crumb request travels along with every POST.

use serde::Deserialize;
use std::cell::RefCell;
use tracing::{debug, instrument};

/// Operations autojobs performs against a Jenkins server.
pub trait JenkinsApi {
    /// Check if job exists.
    fn job_exists(&self, name: &str) -> Result<bool>;

    /// Fetch raw configuration document of job, `None` if there is no such job.
    fn job_config(&self, name: &str) -> Result<Option<String>>;

    /// Create job from configuration document.
    fn create_job(&self, name: &str, config: &str) -> Result<()>;

    /// Replace configuration document of job.
    fn update_job(&self, name: &str, config: &str) -> Result<()>;

    /// Delete job.
    fn delete_job(&self, name: &str) -> Result<()>;

    /// Schedule a build of job.
    fn build_job(&self, name: &str) -> Result<()>;

    /// Names of every job.
    fn list_jobs(&self) -> Result<Vec<String>>;

    /// Check if view exists.
    fn view_exists(&self, name: &str) -> Result<bool>;

    /// Names of every job in view.
    fn view_jobs(&self, name: &str) -> Result<Vec<String>>;

    /// Add job to view.
    fn add_job_to_view(&self, view: &str, job: &str) -> Result<()>;
}

/// Jenkins client over the remote access API.
///
/// Blocking, one request at a time.
#[derive(Debug)]
pub struct HttpJenkins {
    base: String,
    client: reqwest::blocking::Client,
    auth: Option<(String, Option<String>)>,
    crumb: RefCell<Option<Option<Crumb>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb: String,
    crumb_request_field: String,
}

#[derive(Debug, Deserialize)]
struct JobListing {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    name: String,
}

impl HttpJenkins {
    /// Construct client and verify that the server answers.
    ///
    /// # Errors
    ///
    /// - Return [`JenkinsError::Http`] if the server cannot be reached.
    /// - Return [`JenkinsError::Status`] or [`JenkinsError::Forbidden`] if the
    ///   server refuses the request.
    #[instrument(skip(password), level = "debug")]
    pub fn connect(url: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .build()?;
        let jenkins = Self {
            base: url.trim_end_matches('/').to_string(),
            client,
            auth: username.map(|username| (username.to_string(), password.map(ToString::to_string))),
            crumb: RefCell::new(None),
        };

        let url = jenkins.url("api/json");
        let response = jenkins.get(&url)?;
        check(response, &url)?;
        debug!("connected to {}", jenkins.base);

        Ok(jenkins)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn job_url(&self, name: &str, path: &str) -> String {
        self.url(&format!("job/{}/{}", urlencoding::encode(name), path))
    }

    fn view_url(&self, name: &str, path: &str) -> String {
        self.url(&format!("view/{}/{}", urlencoding::encode(name), path))
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut request = self.client.get(url);
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, password.as_ref());
        }

        Ok(request.send()?)
    }

    fn post(&self, url: &str, body: Option<&str>) -> Result<reqwest::blocking::Response> {
        let mut request = self.client.post(url);
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, password.as_ref());
        }
        if let Some(crumb) = self.crumb()? {
            request = request.header(crumb.crumb_request_field, crumb.crumb);
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body.to_string());
        }

        let response = request.send()?;
        check(response, url)
    }

    /// CSRF crumb, fetched on first use.
    fn crumb(&self) -> Result<Option<Crumb>> {
        if let Some(crumb) = self.crumb.borrow().as_ref() {
            return Ok(crumb.clone());
        }

        let url = self.url("crumbIssuer/api/json");
        let response = self.get(&url)?;
        let crumb = if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("crumb issuer disabled");
            None
        } else {
            let body = check(response, &url)?.text()?;
            Some(serde_json::from_str::<Crumb>(&body)?)
        };
        self.crumb.replace(Some(crumb.clone()));

        Ok(crumb)
    }

    fn exists(&self, url: &str) -> Result<bool> {
        let response = self.get(url)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response, url)?;

        Ok(true)
    }

    fn job_names(&self, url: &str) -> Result<Vec<String>> {
        let response = self.get(url)?;
        let body = check(response, url)?.text()?;
        let listing: JobListing = serde_json::from_str(&body)?;

        Ok(listing.jobs.into_iter().map(|job| job.name).collect())
    }
}

impl JenkinsApi for HttpJenkins {
    fn job_exists(&self, name: &str) -> Result<bool> {
        self.exists(&self.job_url(name, "api/json"))
    }

    fn job_config(&self, name: &str) -> Result<Option<String>> {
        let url = self.job_url(name, "config.xml");
        let response = self.get(&url)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(check(response, &url)?.text()?))
    }

    #[instrument(skip(self, config), level = "debug")]
    fn create_job(&self, name: &str, config: &str) -> Result<()> {
        let url = self.url(&format!("createItem?name={}", urlencoding::encode(name)));
        self.post(&url, Some(config))?;

        Ok(())
    }

    #[instrument(skip(self, config), level = "debug")]
    fn update_job(&self, name: &str, config: &str) -> Result<()> {
        self.post(&self.job_url(name, "config.xml"), Some(config))?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn delete_job(&self, name: &str) -> Result<()> {
        self.post(&self.job_url(name, "doDelete"), None)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn build_job(&self, name: &str) -> Result<()> {
        self.post(&self.job_url(name, "build"), None)?;
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<String>> {
        self.job_names(&self.url("api/json?tree=jobs[name]"))
    }

    fn view_exists(&self, name: &str) -> Result<bool> {
        self.exists(&self.view_url(name, "api/json"))
    }

    fn view_jobs(&self, name: &str) -> Result<Vec<String>> {
        self.job_names(&self.view_url(name, "api/json?tree=jobs[name]"))
    }

    #[instrument(skip(self), level = "debug")]
    fn add_job_to_view(&self, view: &str, job: &str) -> Result<()> {
        let url = self.view_url(view, &format!("addJobToView?name={}", urlencoding::encode(job)));
        self.post(&url, None)?;
        Ok(())
    }
}

fn check(
    response: reqwest::blocking::Response,
    url: &str,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(JenkinsError::Forbidden { url: url.into() });
    }
    if !status.is_success() {
        return Err(JenkinsError::Status {
            status: status.as_u16(),
            url: url.into(),
        });
    }

    Ok(response)
}

/// Jenkins client error types.
#[derive(Debug, thiserror::Error)]
pub enum JenkinsError {
    /// Server denies permission.
    #[error("permission denied at {url}")]
    Forbidden { url: String },

    /// Server answers with an unexpected status.
    #[error("unexpected status {status} at {url}")]
    Status { status: u16, url: String },

    /// Request cannot be sent or its response read.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Response body is not the expected JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl JenkinsError {
    /// Check if error is a permission denial.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = JenkinsError> = std::result::Result<T, E>;
