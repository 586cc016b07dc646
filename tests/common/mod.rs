//! Common test utilities for stepwise integration tests
//!
//! - Mock API server setup using wiremock
//! - Context and step builders

#![allow(dead_code)]

use serde_json::{json, Value as JsonValue};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stepwise::{Config, ScenarioContext, Step};

/// Start a mock server answering the user endpoints used across tests
pub async fn user_api() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": {"id": 123, "name": "John", "email": "john@example.com", "age": 30}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 123,
            "name": "John",
            "email": "john@example.com",
            "age": 30,
            "profile": {"city": "Lisbon", "roles": ["admin", "dev"]},
            "nickname": ""
        })))
        .mount(&server)
        .await;

    server
}

/// Mount a fixed JSON response
pub async fn mount_json(server: &MockServer, verb: &str, route: &str, status: u16, body: JsonValue) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

pub fn config_for(server: &MockServer) -> Config {
    Config::default().with_base_url(server.uri())
}

pub fn context_for(server: &MockServer) -> ScenarioContext {
    ScenarioContext::new(&config_for(server)).expect("context builds")
}

pub fn step(sentence: &str) -> Step {
    Step::new(sentence)
}

pub fn step_with(sentence: &str, docstring: &str) -> Step {
    Step::new(sentence).with_docstring(docstring)
}
