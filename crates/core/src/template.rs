//! Templating applied to documents before they are decoded

use crate::error::Result;
use std::collections::BTreeMap;

pub trait Templater {
    fn process(&self, input: &str) -> Result<String>;
}

/// Replaces `${name}` placeholders with configured values.
///
/// Placeholders without a value are kept verbatim so documents may carry
/// `${...}` text meant for a later stage.
#[derive(Debug, Clone, Default)]
pub struct VarsTemplater {
    vars: BTreeMap<String, String>,
}

impl VarsTemplater {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl Templater for VarsTemplater {
    fn process(&self, input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.vars.get(name.trim()) {
                        Some(value) => output.push_str(value),
                        None => {
                            output.push_str("${");
                            output.push_str(name);
                            output.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    output.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templater(pairs: &[(&str, &str)]) -> VarsTemplater {
        VarsTemplater::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_substitution() {
        let t = templater(&[("VERSION", "1.2.3"), ("NAME", "app")]);
        assert_eq!(
            t.process("name: ${NAME}\nversion: ${ VERSION }\n").unwrap(),
            "name: app\nversion: 1.2.3\n"
        );
    }

    #[test]
    fn test_unknown_and_unterminated_placeholders_are_kept() {
        let t = templater(&[]);
        assert_eq!(t.process("a ${MISSING} b").unwrap(), "a ${MISSING} b");
        assert_eq!(t.process("tail ${OPEN").unwrap(), "tail ${OPEN");
    }
}
