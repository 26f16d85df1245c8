#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::Command;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

pub const DOC: &str = "doc-1";

/// Create a `pagetree` command isolated from the user's config and env.
#[allow(dead_code)]
pub fn pagetree_cmd(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagetree"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("PAGETREE_CONFIG", config);
    cmd.env_remove("PAGETREE_API_TOKEN");
    cmd.env_remove("PAGETREE_API_BASE_URL");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write a config pointing at `base_url` with fast polling.
#[allow(dead_code)]
pub fn write_config(dir: &TempDir, base_url: &str, token: Option<&str>) -> PathBuf {
    let token_line = token.map(|t| format!("token = \"{t}\"\n")).unwrap_or_default();
    let content = format!(
        "[api]\nbase_url = \"{base_url}\"\n{token_line}timeout_secs = 5\n\n\
         [export]\npoll_interval_ms = 10\nmax_poll_attempts = 5\nsettle_delay_ms = 0\n\
         retry_max_attempts = 1\nretry_base_delay_ms = 10\n"
    );
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// Mount the endpoints for one page that exports successfully.
#[allow(dead_code)]
pub async fn mount_page(server: &MockServer, id: &str, name: &str, children: &[&str]) {
    let page_path = format!("/docs/{DOC}/pages/{id}");
    let children: Vec<_> = children.iter().map(|c| json!({ "id": c })).collect();
    Mock::given(method("GET"))
        .and(path(page_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "updatedAt": "2024-05-01T00:00:00Z",
            "children": children,
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{page_path}/export")))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({ "id": format!("job-{id}"), "status": "inProgress" })),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{page_path}/export/job-{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "downloadLink": format!("{}/downloads/{id}.md", server.uri()),
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/downloads/{id}.md")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("Body of {name}.")))
        .mount(server)
        .await;
}
