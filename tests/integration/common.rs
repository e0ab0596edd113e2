//! Mock remote source and test configuration shared by the integration tests

use fleet_harvest::config::Config;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
///
/// Delays and element timeouts are zeroed; the connectivity probe targets the
/// mock server itself so it always reports the network as up.
pub fn create_test_config(server: &MockServer, data_dir: &Path) -> Config {
    let mut config: Config = toml::from_str(&format!(
        r#"
[source]
base-url = "{}"

[pipeline]
workers = 2
start = 100
end = 90
points-threshold = 375
checkpoint-interval = 2
request-delay-ms = 0
request-jitter-ms = 0
session-create-delay-secs = 0

[supervisor]
poll-interval-secs = 1
restart-delay-secs = 0
stagger-ms = 0
shutdown-grace-secs = 5

[connectivity]
probe-address = "{}"
probe-timeout-ms = 500
initial-delay-ms = 1
max-delay-ms = 2
max-attempts = 2

[page]
page-load-timeout-secs = 5
element-timeout-secs = 0
export-timeout-secs = 0
"#,
        server.uri(),
        server.address()
    ))
    .expect("Failed to parse test config");

    config.output.data_dir = data_dir.join("databases");
    config.output.merged_path = data_dir.join("fleets_merged.db");
    config
}

/// Mounts the home page private records redirect to
pub async fn mount_home(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Home</title></head><body>Welcome</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts a public record page and its export view
pub async fn mount_fleet(server: &MockServer, identifier: i64, faction: &str, points: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/fleet/{}/", identifier)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><head><title>Fleet {id}</title></head><body>
                    <h1>Fleet {id}</h1>
                    <button class="export" data-href="/fleet/{id}/export">Export</button>
                    </body></html>"#,
                    id = identifier
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/fleet/{}/export", identifier)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    "Name: Fleet {}\nFaction: {}\nCommander: Grand Admiral Thrawn\nTotal Points: {}\n",
                    identifier, faction, points
                ))
                .insert_header("content-type", "text/plain; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Mounts a private record, which redirects home
pub async fn mount_private(server: &MockServer, identifier: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/fleet/{}/", identifier)))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/"))
        .mount(server)
        .await;
}

/// Mounts every identifier of `[100, 90)` as a public record worth 400 points
pub async fn mount_full_range(server: &MockServer) {
    mount_home(server).await;
    for identifier in 91..=100 {
        let faction = if identifier % 2 == 0 { "Empire" } else { "Rebel" };
        mount_fleet(server, identifier, faction, 400).await;
    }
}

/// Identifiers whose record page was requested, in request order
pub async fn requested_identifiers(server: &MockServer) -> Vec<i64> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| {
            let segments: Vec<_> = request
                .url
                .path_segments()?
                .filter(|s| !s.is_empty())
                .collect();
            match segments.as_slice() {
                ["fleet", id] => id.parse().ok(),
                _ => None,
            }
        })
        .collect()
}
