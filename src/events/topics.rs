//! # The well-known topic grammar.
//!
//! Topics are plain strings; listeners match them with regular expressions
//! and receive the named captures. The constants here are the patterns the
//! core guarantees to emit; the builder functions produce the concrete topic
//! strings with parameters substituted.
//!
//! ```text
//! /build/app:<A>/provisioning/token:<T>
//! /build/app:<A>/started/token:<T>
//! /build/app:<A>/complete/token:<T>
//! /log/app:<A>/logtype:<info|warn|crit>/log<MESSAGE>
//! ```

use std::fmt;

/// Matches the topic emitted when a build enters provisioning.
pub const SIGNAL_BUILD_PROVISIONING: &str =
    r"/build/app:(?P<app>\w+)/provisioning/token:(?P<token>\w+)$";

/// Matches the topic emitted when a build's runner process has started.
pub const SIGNAL_BUILD_STARTED: &str = r"/build/app:(?P<app>\w+)/started/token:(?P<token>\w+)$";

/// Matches the topic emitted when a build finishes, for any reason.
pub const SIGNAL_BUILD_COMPLETE: &str = r"/build/app:(?P<app>\w+)/complete/token:(?P<token>\w+)$";

/// Matches the log broadcast topic.
pub const EVENT_CORE_LOG: &str =
    r"/log/app:(?P<app>\w+)/logtype:(?P<logtype>\w+)/log(?P<logmessage>.*)$";

/// Severity tag carried in `/log/…` topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Crit,
}

impl LogLevel {
    /// The `logtype:` segment value.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Crit => "crit",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic for a build entering provisioning.
pub fn provisioning(app: &str, token: &str) -> String {
    format!("/build/app:{app}/provisioning/token:{token}")
}

/// Topic for a build whose runner process launched.
pub fn started(app: &str, token: &str) -> String {
    format!("/build/app:{app}/started/token:{token}")
}

/// Topic for a finished build.
pub fn complete(app: &str, token: &str) -> String {
    format!("/build/app:{app}/complete/token:{token}")
}

/// Topic broadcasting one log line at the given severity.
pub fn log(app: &str, level: LogLevel, message: &str) -> String {
    format!("/log/app:{app}/logtype:{level}/log{message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::pattern::named_group_matches;
    use regex::Regex;

    #[test]
    fn built_topics_match_their_patterns() {
        let cases = [
            (SIGNAL_BUILD_PROVISIONING, provisioning("demo", "tok123")),
            (SIGNAL_BUILD_STARTED, started("demo", "tok123")),
            (SIGNAL_BUILD_COMPLETE, complete("demo", "tok123")),
        ];
        for (pattern, topic) in cases {
            let re = Regex::new(pattern).expect("pattern");
            let captures = named_group_matches(&re, &topic).expect("match");
            assert_eq!(captures.get("app").map(String::as_str), Some("demo"));
            assert_eq!(captures.get("token").map(String::as_str), Some("tok123"));
        }
    }

    #[test]
    fn log_topics_carry_level_and_message() {
        let re = Regex::new(EVENT_CORE_LOG).expect("pattern");
        let topic = log("demo", LogLevel::Warn, "disk is filling up");
        let captures = named_group_matches(&re, &topic).expect("match");
        assert_eq!(captures.get("logtype").map(String::as_str), Some("warn"));
        assert_eq!(
            captures.get("logmessage").map(String::as_str),
            Some("disk is filling up")
        );
    }
}
