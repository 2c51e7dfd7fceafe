use serde::{Deserialize, Serialize};

use crate::rpc::proto::{ArgumentType, Interpreter, Script, ScriptArgument};

/// Plain, serializable form of one backend message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub interpreter: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentPayload {
    pub name: String,
    pub argument_type: String,
    #[serde(default)]
    pub default: String,
}

impl Payload {
    /// Human readable text of the message
    pub fn text(&self) -> &str {
        &self.name
    }
}

impl From<Script> for Payload {
    fn from(script: Script) -> Self {
        let interpreter = Interpreter::try_from(script.interpreter)
            .map(Interpreter::label)
            .unwrap_or("unknown")
            .to_string();

        Payload {
            name: script.name,
            description: script.description,
            file: script.file,
            interpreter,
            arguments: script.arguments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ScriptArgument> for ArgumentPayload {
    fn from(argument: ScriptArgument) -> Self {
        ArgumentPayload {
            name: argument.name,
            argument_type: ArgumentType::try_from(argument.argument_type)
                .map(ArgumentType::label)
                .unwrap_or("unknown")
                .to_string(),
            default: argument.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_forwarded_unchanged() {
        let script = Script {
            name: "backup".into(),
            description: "sync home to nas".into(),
            file: "/scripts/backup.py".into(),
            interpreter: Interpreter::Alias as i32,
            arguments: vec![ScriptArgument {
                name: "target".into(),
                argument_type: ArgumentType::String as i32,
                default: "nas".into(),
            }],
        };

        let payload = Payload::from(script);
        assert_eq!(payload.text(), "backup");
        assert_eq!(payload.description, "sync home to nas");
        assert_eq!(payload.file, "/scripts/backup.py");
        assert_eq!(payload.interpreter, "alias");
        assert_eq!(
            payload.arguments,
            vec![ArgumentPayload {
                name: "target".into(),
                argument_type: "string".into(),
                default: "nas".into(),
            }]
        );
    }

    #[test]
    fn test_unknown_enum_values_do_not_fail_conversion() {
        let script = Script {
            name: "odd".into(),
            interpreter: 99,
            arguments: vec![ScriptArgument {
                name: "x".into(),
                argument_type: -3,
                default: String::new(),
            }],
            ..Default::default()
        };

        let payload = Payload::from(script);
        assert_eq!(payload.interpreter, "unknown");
        assert_eq!(payload.arguments[0].argument_type, "unknown");
    }

    #[test]
    fn test_payload_json_shape() {
        let payload = Payload::from(Script::named("alpha"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["name"], "alpha");
        assert_eq!(json["interpreter"], "python");
        assert!(json["arguments"].as_array().unwrap().is_empty());
    }
}
