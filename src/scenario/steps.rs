//! Step operations
//!
//! Every operation resolves its text arguments against the store before use
//! and returns the first problem as a [`StepError`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use super::{ResponseSnapshot, ScenarioContext};
use crate::compare;
use crate::errors::{Result, StepError};
use crate::fake::parse_data_spec;
use crate::json::{as_bool, as_f64, render_scalar};
use crate::process::{CommandResult, ProcessRunner};
use crate::store::Value;
use crate::template;

/// Expectation keyword accepted by `response_property_should_be`
const EMPTY: &str = "empty";

impl ScenarioContext {
    /// Send a request and replace the response snapshot
    pub async fn send_request(&mut self, method: &str, endpoint: &str, payload: Option<&str>) -> Result<()> {
        let method: Method = method
            .parse()
            .map_err(|_| StepError::Argument(format!("Invalid method: {}", method)))?;
        let url = Url::parse(&self.request_url(&template::resolve(endpoint, &self.store)))?;
        let payload = payload.map(|p| template::resolve(p, &self.store)).unwrap_or_default();

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.resolve(&self.store) {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|e| StepError::Argument(format!("Invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|e| StepError::Argument(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        debug!(method = %method, url = %url, payload = %payload, "Sending request");

        let mut request = self.client.request(method, url).headers(headers);
        if !payload.is_empty() {
            request = request.body(payload);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(status, body = %body, "Response received");
        self.response = Some(ResponseSnapshot { status, body });
        Ok(())
    }

    /// Absolute endpoints are used as-is, others are appended to the base URL
    fn request_url(&self, endpoint: &str) -> String {
        if self.base_url.is_empty() || endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        if endpoint.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            if endpoint.starts_with('/') { endpoint.to_string() } else { format!("/{}", endpoint) }
        )
    }

    pub fn response_status_should_be(&self, expected: u16) -> Result<()> {
        let response = self.require_response()?;
        if response.status != expected {
            return Err(StepError::mismatch(
                "status",
                expected,
                format!("{} with body {}", response.status, response.body),
            ));
        }
        debug!(status = response.status, "Response status matches");
        Ok(())
    }

    /// Compare one property of the response body with an expectation.
    ///
    /// `empty` accepts null, a missing property or an empty string. `true`
    /// and `false` compare truthiness, a double-quoted expectation compares
    /// text, a number compares numerically, and anything else compares the
    /// property's rendered text.
    pub fn response_property_should_be(&self, path: &str, expected: &str) -> Result<()> {
        let response = self.require_response()?;
        let value = response.property(path);
        let expected = template::resolve(expected, &self.store);

        if expected == EMPTY {
            return match value {
                None | Some(JsonValue::Null) => Ok(()),
                Some(JsonValue::String(ref s)) if s.is_empty() => Ok(()),
                Some(other) => Err(StepError::mismatch(path, EMPTY, render_scalar(&other))),
            };
        }

        let value = value.ok_or_else(|| StepError::PropertyNotFound { path: path.to_string() })?;
        debug!(path, expected = %expected, actual = %render_scalar(&value), "Checking property");

        if expected == "true" || expected == "false" {
            let actual = as_bool(&value);
            if actual != (expected == "true") {
                return Err(StepError::mismatch(path, &expected, actual));
            }
        } else if expected.len() >= 2 && expected.starts_with('"') && expected.ends_with('"') {
            let text = &expected[1..expected.len() - 1];
            let actual = render_scalar(&value);
            if actual != text {
                return Err(StepError::mismatch(path, text, actual));
            }
        } else if let Ok(number) = expected.parse::<f64>() {
            let actual = as_f64(&value);
            if actual != number {
                return Err(StepError::mismatch(path, number, actual));
            }
        } else {
            let actual = render_scalar(&value);
            if actual != expected {
                return Err(StepError::mismatch(path, &expected, actual));
            }
        }

        Ok(())
    }

    pub fn response_property_should_not_be_empty(&self, path: &str) -> Result<()> {
        let response = self.require_response()?;
        let value = response
            .property(path)
            .ok_or_else(|| StepError::PropertyNotFound { path: path.to_string() })?;

        let rendered = render_scalar(&value);
        if rendered.is_empty() {
            return Err(StepError::mismatch(path, "a non-empty value", "\"\""));
        }
        debug!(path, value = %rendered, "Property is not empty");
        Ok(())
    }

    /// Require the response body to equal a JSON template exactly
    pub fn response_should_match_json(&self, expected: &str) -> Result<()> {
        let (expected, actual) = self.expected_and_actual(expected)?;
        compare::equals(&expected, &actual)?;
        debug!("JSON match successful");
        Ok(())
    }

    /// Require the response body to contain a JSON template
    pub fn response_should_contain_json(&self, expected: &str) -> Result<()> {
        let (expected, actual) = self.expected_and_actual(expected)?;
        compare::contains(&expected, &actual)?;
        debug!("JSON subset match successful");
        Ok(())
    }

    fn expected_and_actual(&self, expected: &str) -> Result<(JsonValue, JsonValue)> {
        let response = self.require_response()?;
        let expected = template::resolve_json(expected, &self.store)?;
        let actual = response.json()?;
        debug!(expected = %expected, actual = %actual, "Comparing JSON");
        Ok((expected, actual))
    }

    /// Store a response property under `name`, keeping its JSON type
    pub fn store_response_property(&mut self, path: &str, name: &str) -> Result<()> {
        let value = self
            .require_response()?
            .property(path)
            .ok_or_else(|| StepError::PropertyNotFound { path: path.to_string() })?;

        let value = Value::from_json(value);
        debug!(path, variable = name, value = %value, kind = value.kind(), "Stored response property");
        self.store.set(name, value);
        Ok(())
    }

    /// Store a literal, typed the way [`Value::parse_literal`] reads it
    pub fn store_value(&mut self, literal: &str, name: &str) -> Result<()> {
        let resolved = template::resolve(literal, &self.store);
        let value = Value::parse_literal(&resolved)?;
        debug!(variable = name, value = %value, kind = value.kind(), "Stored value");
        self.store.set(name, value);
        Ok(())
    }

    /// Copy the last command's output into the store
    pub fn store_command_output(&mut self, name: &str) -> Result<()> {
        let output = self
            .command
            .as_ref()
            .map(|c| c.stdout.clone())
            .unwrap_or_default();
        if output.is_empty() {
            return Err(StepError::Argument("command output is empty".to_string()));
        }
        debug!(variable = name, value = %output, "Stored command output");
        self.store.set(name, output);
        Ok(())
    }

    /// Set a header template; it is resolved on every request
    pub fn set_header(&mut self, name: &str, template: &str) {
        debug!(header = name, template, "Set header");
        self.headers.set(name, template);
    }

    pub fn reset_all_variables(&mut self) {
        self.store.clear();
        debug!("Reset all variables");
    }

    /// Delete a comma-separated list of variables
    pub fn reset_variables(&mut self, names: &str) {
        self.store.delete_many(names);
        debug!(names, "Reset variables");
    }

    /// Generate values for every `name=pattern` pair of a data specification
    pub fn generate_fake_data(&mut self, spec: &str) -> Result<()> {
        for pair in parse_data_spec(spec)? {
            let value = self.generator.generate(&pair.pattern)?;
            debug!(variable = %pair.name, pattern = %pair.pattern, value = %value, "Generated fake data");
            self.store.set(pair.name, value);
        }
        Ok(())
    }

    pub async fn execute_command(&mut self, command: &str) -> Result<()> {
        self.run_command(command, None, None).await
    }

    pub async fn execute_command_in_directory(&mut self, command: &str, dir: &str) -> Result<()> {
        self.run_command(command, Some(dir), None).await
    }

    pub async fn execute_command_with_timeout(&mut self, command: &str, seconds: u64) -> Result<()> {
        self.run_command(command, None, Some(Duration::from_secs(seconds))).await
    }

    async fn run_command(&mut self, command: &str, dir: Option<&str>, timeout: Option<Duration>) -> Result<()> {
        let command = template::resolve(command, &self.store);
        let dir = dir
            .map(|d| template::resolve(d, &self.store))
            .filter(|d| !d.is_empty());

        let mut runner = ProcessRunner::new()
            .maybe_timeout(timeout.or(self.command_timeout))
            .cancel_token(self.cancel.clone());
        if let Some(dir) = dir {
            runner = runner.dir(PathBuf::from(dir));
        }

        match runner.run_capture(&command).await {
            Ok(result) => {
                let checked = result.check();
                self.command = Some(result);
                checked
            }
            Err(e @ StepError::Timeout { .. }) => {
                self.command = Some(CommandResult::timed_out());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn command_output(&self) -> &str {
        self.command.as_ref().map(|c| c.stdout.as_str()).unwrap_or_default()
    }

    pub fn command_output_should_match(&self, expected: &str) -> Result<()> {
        let expected = template::resolve(expected, &self.store);
        let actual = self.command_output();
        if actual != expected {
            return Err(StepError::mismatch("command output", format!("'{}'", expected), format!("'{}'", actual)));
        }
        Ok(())
    }

    pub fn command_output_should_contain(&self, expected: &str) -> Result<()> {
        let expected = template::resolve(expected, &self.store);
        let actual = self.command_output();
        if !actual.contains(&expected) {
            return Err(StepError::mismatch(
                "command output",
                format!("text containing '{}'", expected),
                format!("'{}'", actual),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::errors::StepError;
    use crate::fake::FakeGenerator;
    use serde_json::json;

    fn context_with_body(body: JsonValue) -> ScenarioContext {
        let mut ctx = ScenarioContext::new(&Config::default()).unwrap();
        ctx.response = Some(ResponseSnapshot { status: 200, body: body.to_string() });
        ctx
    }

    fn body() -> JsonValue {
        json!({
            "success": true,
            "data": {"id": 123, "email": "test@example.com", "score": 4.5, "note": "", "gone": null},
            "items": [1, 2, 3]
        })
    }

    #[test]
    fn test_request_url_joining() {
        let config = Config::default().with_base_url("http://api.test/");
        let ctx = ScenarioContext::new(&config).unwrap();
        assert_eq!(ctx.request_url("/users"), "http://api.test/users");
        assert_eq!(ctx.request_url("users"), "http://api.test/users");
        assert_eq!(ctx.request_url("https://other.test/x"), "https://other.test/x");

        let bare = ScenarioContext::new(&Config::default()).unwrap();
        assert_eq!(bare.request_url("http://localhost/a"), "http://localhost/a");
    }

    #[test]
    fn test_assertions_need_a_response() {
        let ctx = ScenarioContext::new(&Config::default()).unwrap();
        assert!(matches!(ctx.response_status_should_be(200), Err(StepError::NoResponse)));
        assert!(matches!(ctx.response_should_contain_json("{}"), Err(StepError::NoResponse)));
    }

    #[test]
    fn test_property_should_be_variants() {
        let mut ctx = context_with_body(body());
        ctx.store.set("expected_id", 123.0);

        ctx.response_property_should_be("success", "true").unwrap();
        ctx.response_property_should_be("data.id", "123").unwrap();
        ctx.response_property_should_be("data.id", "${expected_id}").unwrap();
        ctx.response_property_should_be("data.score", "4.50").unwrap();
        ctx.response_property_should_be("data.email", "\"test@example.com\"").unwrap();
        ctx.response_property_should_be("data.email", "test@example.com").unwrap();
        ctx.response_property_should_be("items.#", "3").unwrap();

        assert!(ctx.response_property_should_be("success", "false").is_err());
        assert!(ctx.response_property_should_be("data.id", "124").is_err());
        assert!(matches!(
            ctx.response_property_should_be("data.missing", "1"),
            Err(StepError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn test_property_should_be_empty() {
        let ctx = context_with_body(body());
        ctx.response_property_should_be("data.note", "empty").unwrap();
        ctx.response_property_should_be("data.gone", "empty").unwrap();
        ctx.response_property_should_be("not.exists", "empty").unwrap();
        assert!(ctx.response_property_should_be("data.email", "empty").is_err());
        assert!(ctx.response_property_should_be("data.id", "empty").is_err());
    }

    #[test]
    fn test_property_should_be_empty_from_variable() {
        let mut ctx = context_with_body(body());
        ctx.store_value("empty", "expected").unwrap();
        ctx.response_property_should_be("data.note", "${expected}").unwrap();
        ctx.response_property_should_be("data.gone", "${expected}").unwrap();
        assert!(ctx.response_property_should_be("data.email", "${expected}").is_err());
    }

    #[test]
    fn test_property_should_not_be_empty() {
        let ctx = context_with_body(body());
        ctx.response_property_should_not_be_empty("data.email").unwrap();
        ctx.response_property_should_not_be_empty("data.id").unwrap();
        assert!(ctx.response_property_should_not_be_empty("data.note").is_err());
        assert!(ctx.response_property_should_not_be_empty("data.gone").is_err());
        assert!(matches!(
            ctx.response_property_should_not_be_empty("data.missing"),
            Err(StepError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn test_store_response_property_keeps_types() {
        let mut ctx = context_with_body(body());
        ctx.store_response_property("data.id", "id").unwrap();
        ctx.store_response_property("data.email", "email").unwrap();
        ctx.store_response_property("success", "ok").unwrap();
        ctx.store_response_property("items", "items").unwrap();

        assert_eq!(ctx.store.get("id"), Some(&Value::Number(123.0)));
        assert_eq!(ctx.store.get("email"), Some(&Value::from("test@example.com")));
        assert_eq!(ctx.store.get("ok"), Some(&Value::Boolean(true)));
        assert_eq!(ctx.store.get("items"), Some(&Value::Json(json!([1, 2, 3]))));
        assert!(ctx.store_response_property("nope", "x").is_err());
    }

    #[test]
    fn test_json_match_and_contain_with_placeholders() {
        let mut ctx = context_with_body(json!({"user": {"id": 7, "name": "Ann"}, "active": true}));
        ctx.store.set("id", 7.0);
        ctx.store.set("name", "Ann");

        ctx.response_should_contain_json(r#"{"user": {"id": ${id}}}"#).unwrap();
        ctx.response_should_match_json(
            r#"{"user": {"id": ${id}, "name": ${name}}, "active": true}"#,
        )
        .unwrap();
        assert!(ctx.response_should_match_json(r#"{"user": {"id": ${id}}}"#).is_err());
    }

    #[test]
    fn test_store_value_and_reset() {
        let mut ctx = ScenarioContext::new(&Config::default()).unwrap();
        ctx.store_value("42", "n").unwrap();
        ctx.store_value("\"hello\"", "s").unwrap();
        ctx.store_value("{\"a\": 1}", "obj").unwrap();
        ctx.store_value("${n}", "copy").unwrap();

        assert_eq!(ctx.store.get("n"), Some(&Value::Number(42.0)));
        assert_eq!(ctx.store.get("s"), Some(&Value::from("hello")));
        assert_eq!(ctx.store.get("obj"), Some(&Value::Json(json!({"a": 1}))));
        assert_eq!(ctx.store.get("copy"), Some(&Value::Number(42.0)));
        assert!(ctx.store_value("{broken", "bad").is_ok());
        assert!(ctx.store_value("{broken}", "bad").is_err());

        ctx.reset_variables("n, s");
        assert!(!ctx.store.contains("n"));
        assert!(ctx.store.contains("obj"));
        ctx.reset_all_variables();
        assert!(ctx.store.is_empty());
    }

    #[test]
    fn test_store_command_output_requires_output() {
        let mut ctx = ScenarioContext::new(&Config::default()).unwrap();
        assert!(matches!(ctx.store_command_output("out"), Err(StepError::Argument(_))));

        ctx.command = Some(CommandResult { stdout: "hello".to_string(), exit_code: Some(0), ..Default::default() });
        ctx.store_command_output("out").unwrap();
        assert_eq!(ctx.store.get("out"), Some(&Value::from("hello")));
        ctx.command_output_should_match("hello").unwrap();
        ctx.command_output_should_contain("ell").unwrap();
        assert!(ctx.command_output_should_match("hell").is_err());
    }

    struct Fixed;

    impl FakeGenerator for Fixed {
        fn generate(&self, pattern: &str) -> Result<String> {
            Ok(format!("fake:{}", pattern))
        }
    }

    #[test]
    fn test_generate_fake_data_uses_generator() {
        let mut ctx = ScenarioContext::new(&Config::default()).unwrap().with_generator(Fixed);
        ctx.generate_fake_data("email={email}, ids=[1,2]").unwrap();
        assert_eq!(ctx.store.get("email"), Some(&Value::from("fake:{email}")));
        assert_eq!(ctx.store.get("ids"), Some(&Value::from("fake:[1,2]")));
        assert!(matches!(ctx.generate_fake_data("oops"), Err(StepError::InvalidSpec(_))));
    }
}
