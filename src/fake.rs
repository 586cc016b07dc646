//! Fake data generation
//!
//! A data specification assigns generated values to variables:
//!
//! ```text
//! email={email}, name={firstname} {lastname}, age={number:18,99}
//! ```
//!
//! Pairs are separated by commas, except commas nested inside `{}` or `[]`.
//! Each pattern is handed to a [`FakeGenerator`]; the default
//! [`TagGenerator`] replaces `{tag}` and `{tag:args}` with values from the
//! `fake` crate and keeps every other character, including unknown tags.

use fake::faker::address::en::{CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::boolean::en::Boolean;
use fake::faker::company::en::{CompanyName, Profession};
use fake::faker::internet::en::{DomainSuffix, FreeEmail, IPv4, IPv6, Password, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use uuid::Uuid;

use crate::errors::{Result, StepError};

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("tag pattern is valid")
});

/// One `name=pattern` entry of a data specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpecPair {
    pub name: String,
    pub pattern: String,
}

/// Source of generated values for data patterns
pub trait FakeGenerator: Send + Sync {
    fn generate(&self, pattern: &str) -> Result<String>;
}

/// Split on commas that are not nested inside `{}` or `[]`.
///
/// A trailing empty segment is dropped, so `""` yields nothing.
pub fn split_outside_brackets(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for c in s.chars() {
        match c {
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => result.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// Parse a data specification into trimmed `name=pattern` pairs
pub fn parse_data_spec(spec: &str) -> Result<Vec<DataSpecPair>> {
    split_outside_brackets(spec)
        .iter()
        .map(|pair| {
            let (name, pattern) = pair
                .trim()
                .split_once('=')
                .ok_or_else(|| StepError::InvalidSpec(format!("expected name=pattern, got '{}'", pair.trim())))?;
            Ok(DataSpecPair {
                name: name.trim().to_string(),
                pattern: pattern.trim().to_string(),
            })
        })
        .collect()
}

/// Default generator backed by the `fake` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct TagGenerator;

impl FakeGenerator for TagGenerator {
    fn generate(&self, pattern: &str) -> Result<String> {
        let mut result = String::with_capacity(pattern.len());
        let mut last = 0;

        for caps in TAG_RE.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let args = caps.get(2).map(|m| m.as_str());

            result.push_str(&pattern[last..whole.start()]);
            match generate_tag(&tag.to_ascii_lowercase(), args)? {
                Some(value) => result.push_str(&value),
                None => result.push_str(whole.as_str()),
            }
            last = whole.end();
        }

        result.push_str(&pattern[last..]);
        Ok(result)
    }
}

/// Generate a value for one tag; `None` for tags this generator does not know
fn generate_tag(tag: &str, args: Option<&str>) -> Result<Option<String>> {
    let value = match tag {
        "name" => Name().fake(),
        "firstname" => FirstName().fake(),
        "lastname" => LastName().fake(),
        "email" => FreeEmail().fake(),
        "phone" => PhoneNumber().fake(),
        "username" => Username().fake(),
        "password" => Password(8..20).fake(),
        "city" => CityName().fake(),
        "street" => {
            let number: u32 = (1..9999u32).fake();
            let street: String = StreetName().fake();
            format!("{} {}", number, street)
        }
        "zip" => ZipCode().fake(),
        "state" => StateName().fake(),
        "country" => CountryName().fake(),
        "company" => CompanyName().fake(),
        "jobtitle" => Profession().fake(),
        "word" => Word().fake(),
        "sentence" => Sentence(5..12).fake(),
        "paragraph" => Paragraph(3..7).fake(),
        "uuid" => Uuid::new_v4().to_string(),
        "ipv4address" => IPv4().fake(),
        "ipv6address" => IPv6().fake(),
        "domainname" => {
            let word: String = Word().fake();
            let suffix: String = DomainSuffix().fake();
            format!("{}.{}", word, suffix)
        }
        "bool" => {
            let b: bool = Boolean(50).fake();
            b.to_string()
        }
        "number" => random_number(args)?,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `{number}` or `{number:MIN,MAX}`
fn random_number(args: Option<&str>) -> Result<String> {
    let (min, max) = match args {
        None => (0, i32::MAX as i64),
        Some(range) => {
            let (min, max) = range
                .split_once(',')
                .ok_or_else(|| StepError::InvalidSpec(format!("number range '{}' is not MIN,MAX", range)))?;
            let parse = |s: &str| {
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| StepError::InvalidSpec(format!("invalid number bound '{}'", s.trim())))
            };
            (parse(min)?, parse(max)?)
        }
    };

    if min > max {
        return Err(StepError::InvalidSpec(format!("number range {}..{} is empty", min, max)));
    }

    let mut rng = rand::rng();
    Ok(rng.random_range(min..=max).to_string())
}
