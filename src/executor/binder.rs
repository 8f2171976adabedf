//! Splices caller-supplied parameters into a script as interpreter-native
//! variable assignments.
//!
//! Values are quoted for the target dialect and the dialect's string
//! delimiter is escaped; nothing else is sanitized.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptDialect {
    PowerShell,
    Posix,
}

impl ScriptDialect {
    /// One assignment statement, without the trailing newline.
    pub fn assignment(self, name: &str, value: &str) -> String {
        match self {
            Self::PowerShell => format!("${} = \"{}\"", name, value.replace('"', "`\"")),
            Self::Posix => format!("{}='{}'", name, value.replace('\'', "'\\''")),
        }
    }
}

impl FromStr for ScriptDialect {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "powershell" | "pwsh" => Ok(Self::PowerShell),
            "posix" | "sh" => Ok(Self::Posix),
            other => Err(AppError::InvalidRequest(format!(
                "Unknown script dialect '{}'",
                other
            ))),
        }
    }
}

/// Parameter names become interpreter variable names, so only plain
/// identifiers are accepted.
pub fn is_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Builds the text fed to the interpreter: one assignment per parameter,
/// a blank line, then the body untouched.
pub fn compose_script(
    dialect: ScriptDialect,
    body: &str,
    params: &BTreeMap<String, String>,
) -> String {
    let mut script = String::with_capacity(body.len() + params.len() * 32 + 1);
    for (name, value) in params {
        script.push_str(&dialect.assignment(name, value));
        script.push('\n');
    }
    script.push('\n');
    script.push_str(body);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_name_rules() {
        assert!(is_parameter_name("Count"));
        assert!(is_parameter_name("_tenant_id2"));
        assert!(!is_parameter_name("2fast"));
        assert!(!is_parameter_name("with space"));
        assert!(!is_parameter_name("semi;colon"));
        assert!(!is_parameter_name("x\nrm"));
        assert!(!is_parameter_name(""));
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn powershell_assignments_escape_double_quotes() {
        let body = "Get-Mailbox -ResultSize $Count\nWrite-Output $Note";
        let script = compose_script(
            ScriptDialect::PowerShell,
            body,
            &params(&[("Count", "5"), ("Note", "a \"quoted\" value")]),
        );

        assert!(script.contains("$Count = \"5\"\n"));
        assert!(script.contains("$Note = \"a `\"quoted`\" value\"\n"));
        assert!(script.ends_with(&format!("\n\n{}", body)));
    }

    #[test]
    fn posix_assignments_escape_single_quotes() {
        let script = compose_script(
            ScriptDialect::Posix,
            "echo \"$Name\"",
            &params(&[("Name", "O'Brien")]),
        );
        assert_eq!(script, "Name='O'\\''Brien'\n\necho \"$Name\"");
    }

    #[test]
    fn empty_params_still_prefix_blank_line() {
        let script = compose_script(ScriptDialect::PowerShell, "Get-Date", &BTreeMap::new());
        assert_eq!(script, "\nGet-Date");
    }

    #[test]
    fn undeclared_keys_pass_through() {
        let script = compose_script(
            ScriptDialect::PowerShell,
            "",
            &params(&[("Whatever", "x")]),
        );
        assert_eq!(script, "$Whatever = \"x\"\n\n");
    }

    #[test]
    fn parses_dialect_names() {
        assert_eq!("PowerShell".parse::<ScriptDialect>().expect("ps"), ScriptDialect::PowerShell);
        assert_eq!("posix".parse::<ScriptDialect>().expect("posix"), ScriptDialect::Posix);
        assert!("cmd".parse::<ScriptDialect>().is_err());
    }
}
