//! Step sentence table
//!
//! Maps step sentences such as `I send a "GET" request to "/users"` onto
//! [`ScenarioContext`] operations. A leading Gherkin keyword (`Given`,
//! `When`, `Then`, `And`, `But`, `*`) is ignored. Sentences ending in `:`
//! take their payload or expected JSON from the step's doc string.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use super::{ScenarioContext, Step};
use crate::errors::{Result, StepError};

/// A parsed step, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    SendRequest { method: String, endpoint: String, payload: Option<String> },
    ResponseStatus(u16),
    PropertyShouldBe { path: String, expected: String },
    PropertyNotEmpty { path: String },
    MatchJson(String),
    ContainJson(String),
    StoreProperty { path: String, name: String },
    StoreValue { value: String, name: String },
    StoreCommandOutput { name: String },
    SetHeader { name: String, value: String },
    ResetAllVariables,
    ResetVariables(String),
    GenerateFakeData(String),
    ExecuteCommand { command: String, dir: Option<String>, timeout: Option<u64> },
    CommandOutputShouldMatch(String),
    CommandOutputShouldContain(String),
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    SendRequest,
    SendRequestWithPayload,
    ResponseStatus,
    PropertyShouldBe,
    PropertyNotEmpty,
    MatchJson,
    ContainJson,
    StoreProperty,
    StoreValue,
    StoreCommandOutput,
    SetHeader,
    ResetAllVariables,
    ResetVariables,
    GenerateFakeData,
    ExecuteCommand,
    ExecuteCommandInDirectory,
    ExecuteCommandWithTimeout,
    CommandOutputShouldMatch,
    CommandOutputShouldContain,
}

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:Given|When|Then|And|But|\*)\s+").expect("keyword pattern is valid")
});

static PATTERNS: Lazy<Vec<(Regex, Kind)>> = Lazy::new(|| {
    [
        (r#"^I send a "([^"]*)" request to "([^"]*)"$"#, Kind::SendRequest),
        (r#"^I send a "([^"]*)" request to "([^"]*)" with payload:$"#, Kind::SendRequestWithPayload),
        (r"^the response status should be (\d+)$", Kind::ResponseStatus),
        (r#"^the response property "([^"]*)" should not be empty$"#, Kind::PropertyNotEmpty),
        (r#"^the response property "([^"]*)" should be (.*?)$"#, Kind::PropertyShouldBe),
        (r"^the response should match JSON:$", Kind::MatchJson),
        (r"^the response should contain JSON:$", Kind::ContainJson),
        (r#"^I store the response property "([^"]*)" as "([^"]*)"$"#, Kind::StoreProperty),
        (r#"^I store the command output as "([^"]*)"$"#, Kind::StoreCommandOutput),
        (r#"^I store "([^"]*)" as "([^"]*)"$"#, Kind::StoreValue),
        (r#"^I set header "([^"]*)" to "([^"]*)"$"#, Kind::SetHeader),
        (r"^I reset all variables$", Kind::ResetAllVariables),
        (r#"^I reset variables "([^"]*)"$"#, Kind::ResetVariables),
        (r#"^I generate fake data: "([^"]*)"$"#, Kind::GenerateFakeData),
        (r#"^I execute command "([^"]*)"$"#, Kind::ExecuteCommand),
        (r#"^I execute command "([^"]*)" in directory "([^"]*)"$"#, Kind::ExecuteCommandInDirectory),
        (r#"^I execute command "([^"]*)" with timeout (\d+)$"#, Kind::ExecuteCommandWithTimeout),
        (r#"^the command output should match "([^"]*)"$"#, Kind::CommandOutputShouldMatch),
        (r#"^the command output should contain "([^"]*)"$"#, Kind::CommandOutputShouldContain),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("step pattern is valid"), kind))
    .collect()
});

/// Resolves step sentences to [`StepAction`]s and runs them
#[derive(Debug, Clone, Copy, Default)]
pub struct StepRegistry;

impl StepRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Sentence patterns, in match order
    pub fn patterns(&self) -> Vec<&'static str> {
        PATTERNS.iter().map(|(re, _)| re.as_str()).collect()
    }

    /// Parse a step into an action without running it
    pub fn parse(&self, step: &Step) -> Result<StepAction> {
        let sentence = KEYWORD_RE.replace(step.sentence.trim(), "");
        let sentence = sentence.trim_end();

        for (re, kind) in PATTERNS.iter() {
            if let Some(caps) = re.captures(sentence) {
                return build_action(*kind, &caps, step.docstring.as_deref());
            }
        }

        Err(StepError::UndefinedStep(step.sentence.clone()))
    }

    /// Parse and run one step against a context
    pub async fn execute(&self, ctx: &mut ScenarioContext, step: &Step) -> Result<()> {
        let action = self.parse(step)?;
        debug!(sentence = %step.sentence, "Running step");
        run_action(ctx, action).await
    }
}

fn arg(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default()
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Result<T> {
    let text = arg(caps, i);
    text.parse()
        .map_err(|_| StepError::Argument(format!("'{}' is out of range", text)))
}

fn require_docstring(docstring: Option<&str>) -> Result<String> {
    docstring
        .map(str::to_string)
        .ok_or_else(|| StepError::Argument("step requires a doc string".to_string()))
}

fn build_action(kind: Kind, caps: &Captures<'_>, docstring: Option<&str>) -> Result<StepAction> {
    let action = match kind {
        Kind::SendRequest => StepAction::SendRequest {
            method: arg(caps, 1),
            endpoint: arg(caps, 2),
            payload: None,
        },
        Kind::SendRequestWithPayload => StepAction::SendRequest {
            method: arg(caps, 1),
            endpoint: arg(caps, 2),
            payload: Some(require_docstring(docstring)?),
        },
        Kind::ResponseStatus => StepAction::ResponseStatus(number(caps, 1)?),
        Kind::PropertyShouldBe => StepAction::PropertyShouldBe { path: arg(caps, 1), expected: arg(caps, 2) },
        Kind::PropertyNotEmpty => StepAction::PropertyNotEmpty { path: arg(caps, 1) },
        Kind::MatchJson => StepAction::MatchJson(require_docstring(docstring)?),
        Kind::ContainJson => StepAction::ContainJson(require_docstring(docstring)?),
        Kind::StoreProperty => StepAction::StoreProperty { path: arg(caps, 1), name: arg(caps, 2) },
        Kind::StoreValue => StepAction::StoreValue { value: arg(caps, 1), name: arg(caps, 2) },
        Kind::StoreCommandOutput => StepAction::StoreCommandOutput { name: arg(caps, 1) },
        Kind::SetHeader => StepAction::SetHeader { name: arg(caps, 1), value: arg(caps, 2) },
        Kind::ResetAllVariables => StepAction::ResetAllVariables,
        Kind::ResetVariables => StepAction::ResetVariables(arg(caps, 1)),
        Kind::GenerateFakeData => StepAction::GenerateFakeData(arg(caps, 1)),
        Kind::ExecuteCommand => StepAction::ExecuteCommand { command: arg(caps, 1), dir: None, timeout: None },
        Kind::ExecuteCommandInDirectory => StepAction::ExecuteCommand {
            command: arg(caps, 1),
            dir: Some(arg(caps, 2)),
            timeout: None,
        },
        Kind::ExecuteCommandWithTimeout => StepAction::ExecuteCommand {
            command: arg(caps, 1),
            dir: None,
            timeout: Some(number(caps, 2)?),
        },
        Kind::CommandOutputShouldMatch => StepAction::CommandOutputShouldMatch(arg(caps, 1)),
        Kind::CommandOutputShouldContain => StepAction::CommandOutputShouldContain(arg(caps, 1)),
    };
    Ok(action)
}

async fn run_action(ctx: &mut ScenarioContext, action: StepAction) -> Result<()> {
    match action {
        StepAction::SendRequest { method, endpoint, payload } => {
            ctx.send_request(&method, &endpoint, payload.as_deref()).await
        }
        StepAction::ResponseStatus(code) => ctx.response_status_should_be(code),
        StepAction::PropertyShouldBe { path, expected } => ctx.response_property_should_be(&path, &expected),
        StepAction::PropertyNotEmpty { path } => ctx.response_property_should_not_be_empty(&path),
        StepAction::MatchJson(expected) => ctx.response_should_match_json(&expected),
        StepAction::ContainJson(expected) => ctx.response_should_contain_json(&expected),
        StepAction::StoreProperty { path, name } => ctx.store_response_property(&path, &name),
        StepAction::StoreValue { value, name } => ctx.store_value(&value, &name),
        StepAction::StoreCommandOutput { name } => ctx.store_command_output(&name),
        StepAction::SetHeader { name, value } => {
            ctx.set_header(&name, &value);
            Ok(())
        }
        StepAction::ResetAllVariables => {
            ctx.reset_all_variables();
            Ok(())
        }
        StepAction::ResetVariables(names) => {
            ctx.reset_variables(&names);
            Ok(())
        }
        StepAction::GenerateFakeData(spec) => ctx.generate_fake_data(&spec),
        StepAction::ExecuteCommand { command, dir: Some(dir), .. } => {
            ctx.execute_command_in_directory(&command, &dir).await
        }
        StepAction::ExecuteCommand { command, timeout: Some(seconds), .. } => {
            ctx.execute_command_with_timeout(&command, seconds).await
        }
        StepAction::ExecuteCommand { command, .. } => ctx.execute_command(&command).await,
        StepAction::CommandOutputShouldMatch(expected) => ctx.command_output_should_match(&expected),
        StepAction::CommandOutputShouldContain(expected) => ctx.command_output_should_contain(&expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sentence: &str) -> Result<StepAction> {
        StepRegistry::new().parse(&Step::new(sentence))
    }

    #[test]
    fn test_keywords_are_stripped() {
        for sentence in [
            "Given I reset all variables",
            "When I reset all variables",
            "  And I reset all variables  ",
            "* I reset all variables",
            "I reset all variables",
        ] {
            assert_eq!(parse(sentence).unwrap(), StepAction::ResetAllVariables, "{}", sentence);
        }
    }

    #[test]
    fn test_request_sentences() {
        assert_eq!(
            parse(r#"When I send a "GET" request to "/users/${id}""#).unwrap(),
            StepAction::SendRequest { method: "GET".into(), endpoint: "/users/${id}".into(), payload: None }
        );

        let step = Step::new(r#"When I send a "POST" request to "/users" with payload:"#)
            .with_docstring(r#"{"name": "${name}"}"#);
        assert_eq!(
            StepRegistry::new().parse(&step).unwrap(),
            StepAction::SendRequest {
                method: "POST".into(),
                endpoint: "/users".into(),
                payload: Some(r#"{"name": "${name}"}"#.into()),
            }
        );
    }

    #[test]
    fn test_docstring_is_required() {
        assert!(matches!(
            parse(r#"I send a "POST" request to "/users" with payload:"#),
            Err(StepError::Argument(_))
        ));
        assert!(matches!(parse("Then the response should match JSON:"), Err(StepError::Argument(_))));
    }

    #[test]
    fn test_property_sentences() {
        assert_eq!(
            parse(r#"Then the response property "data.id" should be 123"#).unwrap(),
            StepAction::PropertyShouldBe { path: "data.id".into(), expected: "123".into() }
        );
        assert_eq!(
            parse(r#"Then the response property "data.name" should be "John""#).unwrap(),
            StepAction::PropertyShouldBe { path: "data.name".into(), expected: "\"John\"".into() }
        );
        assert_eq!(
            parse(r#"Then the response property "data.email" should not be empty"#).unwrap(),
            StepAction::PropertyNotEmpty { path: "data.email".into() }
        );
    }

    #[test]
    fn test_store_sentences_do_not_overlap() {
        assert_eq!(
            parse(r#"And I store the response property "data.id" as "user_id""#).unwrap(),
            StepAction::StoreProperty { path: "data.id".into(), name: "user_id".into() }
        );
        assert_eq!(
            parse(r#"And I store the command output as "out""#).unwrap(),
            StepAction::StoreCommandOutput { name: "out".into() }
        );
        assert_eq!(
            parse(r#"And I store "42" as "answer""#).unwrap(),
            StepAction::StoreValue { value: "42".into(), name: "answer".into() }
        );
    }

    #[test]
    fn test_command_sentences() {
        assert_eq!(
            parse(r#"When I execute command "ls" in directory "/tmp""#).unwrap(),
            StepAction::ExecuteCommand { command: "ls".into(), dir: Some("/tmp".into()), timeout: None }
        );
        assert_eq!(
            parse(r#"When I execute command "sleep 2" with timeout 1"#).unwrap(),
            StepAction::ExecuteCommand { command: "sleep 2".into(), dir: None, timeout: Some(1) }
        );
        assert_eq!(
            parse(r#"Then the command output should contain "ok""#).unwrap(),
            StepAction::CommandOutputShouldContain("ok".into())
        );
    }

    #[test]
    fn test_status_out_of_range() {
        assert_eq!(parse("Then the response status should be 201").unwrap(), StepAction::ResponseStatus(201));
        assert!(matches!(
            parse("Then the response status should be 99999"),
            Err(StepError::Argument(_))
        ));
    }

    #[test]
    fn test_undefined_step() {
        match parse("Given something nobody wrote a step for") {
            Err(StepError::UndefinedStep(sentence)) => {
                assert_eq!(sentence, "Given something nobody wrote a step for")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(StepRegistry::new().patterns().len(), 19);
    }
}
