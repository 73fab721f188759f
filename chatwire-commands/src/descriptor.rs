// ABOUTME: Validated, immutable shape of a command: name, aliases, positional parameters.
// ABOUTME: Owns argument-count checks, token conversion, and usage strings.

use crate::context::Arguments;
use crate::error::InvocationError;
use crate::kind::{ArgValue, ArgumentKind};

/// Whether a positional argument must be supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum Optionality {
    Required,
    /// Missing tokens take `default`, or stay absent when there is none
    Optional { default: Option<ArgValue> },
}

impl Optionality {
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. })
    }

    pub fn default_value(&self) -> Option<&ArgValue> {
        match self {
            Self::Optional { default } => default.as_ref(),
            Self::Required => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDescriptor {
    pub index: usize,
    pub name: String,
    pub kind: ArgumentKind,
    pub optionality: Optionality,
}

/// Trailing parameter receiving every token from `index` onward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestDescriptor {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    /// Identifier of the handler this command was declared from
    pub handler: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub parameters: Vec<ArgumentDescriptor>,
    pub rest: Option<RestDescriptor>,
    pub required_count: usize,
}

impl CommandDescriptor {
    pub fn has_rest_parameter(&self) -> bool {
        self.rest.is_some()
    }

    /// True when `token` is the name or one of the aliases (case-sensitive)
    pub fn answers_to(&self, token: &str) -> bool {
        self.name == token || self.aliases.iter().any(|alias| alias == token)
    }

    /// Most tokens accepted, `None` with a rest parameter
    pub fn max_count(&self) -> Option<usize> {
        match self.rest {
            Some(_) => None,
            None => Some(self.parameters.len()),
        }
    }

    pub fn accepts_count(&self, count: usize) -> bool {
        count >= self.required_count && self.max_count().map_or(true, |max| count <= max)
    }

    /// Convert whitespace-separated tokens into arguments.
    ///
    /// Checks the count first, then converts left to right; the first token
    /// that fails to parse aborts with its position and kind.
    pub fn convert(&self, tokens: &[&str]) -> Result<Arguments, InvocationError> {
        if !self.accepts_count(tokens.len()) {
            return Err(InvocationError::ArgumentCount {
                command: self.name.clone(),
                given: tokens.len(),
                min: self.required_count,
                max: self.max_count(),
            });
        }

        let mut values = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let value = match tokens.get(param.index) {
                Some(token) => {
                    Some(param.kind.parse(token).map_err(|e| InvocationError::BadArgument {
                        command: self.name.clone(),
                        index: param.index,
                        kind: param.kind,
                        token: token.to_string(),
                        reason: e.reason,
                    })?)
                }
                None => param.optionality.default_value().cloned(),
            };
            values.push(value);
        }

        let rest = self.rest.as_ref().map(|rest| {
            tokens
                .get(rest.index..)
                .unwrap_or_default()
                .iter()
                .map(|token| token.to_string())
                .collect()
        });

        Ok(Arguments::new(values, rest))
    }

    /// One-line usage, e.g. `!roll <sides:u32> [count:u8] [label...]`
    pub fn usage(&self, prefix: &str) -> String {
        let mut usage = format!("{}{}", prefix, self.name);
        for param in &self.parameters {
            let slot = format!("{}:{}", param.name, param.kind);
            match &param.optionality {
                Optionality::Required => usage.push_str(&format!(" <{}>", slot)),
                Optionality::Optional { default: None } => usage.push_str(&format!(" [{}]", slot)),
                Optionality::Optional {
                    default: Some(default),
                } => usage.push_str(&format!(" [{}={}]", slot, default)),
            }
        }
        if let Some(rest) = &self.rest {
            usage.push_str(&format!(" [{}...]", rest.name));
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(parameters: Vec<ArgumentDescriptor>, rest: Option<RestDescriptor>) -> CommandDescriptor {
        let required_count = parameters
            .iter()
            .take_while(|p| !p.optionality.is_optional())
            .count();
        CommandDescriptor {
            handler: "TestCommand".to_string(),
            name: "test".to_string(),
            aliases: vec!["t".to_string()],
            description: None,
            parameters,
            rest,
            required_count,
        }
    }

    fn required(index: usize, name: &str, kind: ArgumentKind) -> ArgumentDescriptor {
        ArgumentDescriptor {
            index,
            name: name.to_string(),
            kind,
            optionality: Optionality::Required,
        }
    }

    fn optional(index: usize, name: &str, kind: ArgumentKind, default: Option<ArgValue>) -> ArgumentDescriptor {
        ArgumentDescriptor {
            index,
            name: name.to_string(),
            kind,
            optionality: Optionality::Optional { default },
        }
    }

    #[test]
    fn test_int_bool_conversion() {
        let cmd = descriptor(
            vec![
                required(0, "count", ArgumentKind::I32),
                required(1, "loud", ArgumentKind::Bool),
            ],
            None,
        );

        let args = cmd.convert(&["5", "true"]).unwrap();
        assert_eq!(args.get::<i32>(0), Some(5));
        assert_eq!(args.get::<bool>(1), Some(true));

        let err = cmd.convert(&["abc", "true"]).unwrap_err();
        match err {
            InvocationError::BadArgument {
                index, kind, token, ..
            } => {
                assert_eq!(index, 0);
                assert_eq!(kind, ArgumentKind::I32);
                assert_eq!(token, "abc");
            }
            other => panic!("expected BadArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_count_bounds_without_rest() {
        let cmd = descriptor(
            vec![
                required(0, "sides", ArgumentKind::U32),
                optional(1, "count", ArgumentKind::U8, None),
                optional(2, "bonus", ArgumentKind::I32, None),
            ],
            None,
        );
        assert_eq!(cmd.required_count, 1);
        assert!(!cmd.accepts_count(0));
        assert!(cmd.accepts_count(1));
        assert!(cmd.accepts_count(3));
        assert!(!cmd.accepts_count(4));

        assert!(matches!(
            cmd.convert(&[]),
            Err(InvocationError::ArgumentCount { given: 0, min: 1, max: Some(3), .. })
        ));
    }

    #[test]
    fn test_rest_collects_trailing_tokens() {
        let cmd = descriptor(
            vec![required(0, "sides", ArgumentKind::U32)],
            Some(RestDescriptor {
                index: 1,
                name: "label".to_string(),
            }),
        );
        assert!(cmd.accepts_count(50));

        let args = cmd.convert(&["6", "for", "initiative"]).unwrap();
        assert_eq!(args.get::<u32>(0), Some(6));
        assert_eq!(args.rest(), ["for".to_string(), "initiative".to_string()]);

        let bare = cmd.convert(&["6"]).unwrap();
        assert!(bare.rest().is_empty());
    }

    #[test]
    fn test_missing_optional_uses_default_or_absence() {
        let cmd = descriptor(
            vec![
                required(0, "sides", ArgumentKind::U32),
                optional(1, "count", ArgumentKind::U8, Some(ArgValue::U8(1))),
                optional(2, "who", ArgumentKind::HashId, None),
            ],
            None,
        );
        let args = cmd.convert(&["20"]).unwrap();
        assert_eq!(args.get::<u8>(1), Some(1));
        assert!(!args.is_present(2));
    }

    #[test]
    fn test_answers_to_name_and_alias_case_sensitive() {
        let cmd = descriptor(vec![], None);
        assert!(cmd.answers_to("test"));
        assert!(cmd.answers_to("t"));
        assert!(!cmd.answers_to("Test"));
    }

    #[test]
    fn test_usage_string() {
        let cmd = descriptor(
            vec![
                required(0, "sides", ArgumentKind::U32),
                optional(1, "count", ArgumentKind::U8, Some(ArgValue::U8(1))),
            ],
            Some(RestDescriptor {
                index: 2,
                name: "label".to_string(),
            }),
        );
        assert_eq!(cmd.usage("!"), "!test <sides:u32> [count:u8=1] [label...]");
    }
}
