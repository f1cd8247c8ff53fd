//! Rule grammar parsing.
//!
//! A rule reads `[selector ":"] requests "/" timespec`, where `timespec` is
//! an optional amount followed by a unit out of `s`, `m`, `h`. Examples:
//! `"10/s"`, `"5/15m"`, `"user:100/h"`.

use std::str::FromStr;

use crate::error::FloodgateError;

/// Parsed form of a single rate rule.
///
/// Rules are parsed fresh from their textual form wherever they are needed;
/// the text is the source of truth and parsed values are never cached
/// across invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Optional dimension the rule is scoped to (e.g. "user", "apikey").
    pub selector: Option<String>,
    /// Occurrences allowed inside the window. Always >= 1.
    pub allowed_requests: u32,
    /// Window length in seconds. Always >= 1.
    pub window_secs: u64,
}

impl FromStr for Rule {
    type Err = FloodgateError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (selector, rate) = parse_expression(text)?;
        let (allowed_requests, window_secs) = parse_rate(rate, text)?;

        Ok(Self {
            selector: selector.map(str::to_string),
            allowed_requests,
            window_secs,
        })
    }
}

/// Split a rule into its optional selector and the rate part.
fn parse_expression(text: &str) -> Result<(Option<&str>, &str), FloodgateError> {
    let malformed = || FloodgateError::MalformedRule(text.to_string());

    match text.split_once(':') {
        None => Ok((None, text)),
        Some((selector, rate)) => {
            if selector.is_empty()
                || !selector.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                || rate.contains(':')
            {
                return Err(malformed());
            }
            Ok((Some(selector), rate))
        }
    }
}

/// Parse `requests "/" timespec` into (allowed requests, window seconds).
fn parse_rate(rate: &str, full_text: &str) -> Result<(u32, u64), FloodgateError> {
    let malformed = || FloodgateError::MalformedRule(full_text.to_string());

    let (requests, timespec) = rate.split_once('/').ok_or_else(malformed)?;

    let allowed_requests: u32 = requests.parse().map_err(|_| malformed())?;
    if allowed_requests == 0 {
        return Err(malformed());
    }

    let window_secs = to_seconds(timespec).ok_or_else(malformed)?;
    Ok((allowed_requests, window_secs))
}

/// Convert a timespec like `s`, `10s`, `m`, `5m` into seconds.
fn to_seconds(timespec: &str) -> Option<u64> {
    let mut chars = timespec.chars();
    let unit = chars.next_back()?;
    let multiplier: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        _ => return None,
    };

    let amount_text = chars.as_str();
    let amount: u64 = if amount_text.is_empty() {
        1
    } else {
        amount_text.parse().ok()?
    };
    if amount == 0 {
        return None;
    }

    Some(multiplier * amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rule(text: &str, selector: Option<&str>, requests: u32, window_secs: u64) {
        let rule: Rule = text.parse().unwrap();

        assert_eq!(rule.selector.as_deref(), selector);
        assert_eq!(rule.allowed_requests, requests);
        assert_eq!(rule.window_secs, window_secs);
    }

    fn assert_malformed(text: &str) {
        match text.parse::<Rule>() {
            Err(FloodgateError::MalformedRule(bad)) => assert_eq!(bad, text),
            other => panic!("expected MalformedRule for {:?}, got {:?}", text, other),
        }
    }

    #[test]
    fn test_seconds() {
        assert_rule("5/s", None, 5, 1);
    }

    #[test]
    fn test_seconds_multiple() {
        assert_rule("5/7s", None, 5, 7);
    }

    #[test]
    fn test_minutes() {
        assert_rule("5/m", None, 5, 60);
        assert_rule("5/5m", None, 5, 5 * 60);
    }

    #[test]
    fn test_hours() {
        assert_rule("150/h", None, 150, 60 * 60);
        assert_rule("3/5h", None, 3, 5 * 60 * 60);
    }

    #[test]
    fn test_selector_prefix() {
        assert_rule("user:100/h", Some("user"), 100, 3600);
        assert_rule("vova:10/3m", Some("vova"), 10, 180);
        assert_rule("api_key2:1/s", Some("api_key2"), 1, 1);
    }

    #[test]
    fn test_bad_rates() {
        assert_malformed("");
        assert_malformed("1/");
        assert_malformed("/m");
        assert_malformed("/");
        assert_malformed("vova/baba");
        assert_malformed("1/1");
        assert_malformed("vova");
        assert_malformed("1.5/s");
        assert_malformed("5/1.5m");
        assert_malformed("5/2d");
    }

    #[test]
    fn test_bad_selector_delimiters() {
        assert_malformed(":vova:");
        assert_malformed(":123:");
        assert_malformed("pita::1");
        assert_malformed("::1");
        assert_malformed("vova:pita:1.0");
        assert_malformed("hey:vova:pita:1.0");
        assert_malformed("vova:15:1.0");
        assert_malformed("vova:15//1:1.0");
        assert_malformed("vova:15/s/:1.0");
        assert_malformed("vova:15/s:-1.0");
        assert_malformed("vo va:1/s");
    }

    #[test]
    fn test_zero_quantities_rejected() {
        assert_malformed("0/s");
        assert_malformed("5/0s");
        assert_malformed("5/0m");
    }
}
