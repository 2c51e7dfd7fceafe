//! Wire types of the `flaunch.ScriptEngine` service.
//!
//! Generated from `proto/flaunch.proto` by the build script, plus the
//! helpers the relay uses on top of the generated types.

tonic::include_proto!("flaunch");

impl Interpreter {
    pub fn label(self) -> &'static str {
        match self {
            Interpreter::Python => "python",
            Interpreter::Alias => "alias",
        }
    }
}

impl ArgumentType {
    pub fn label(self) -> &'static str {
        match self {
            ArgumentType::Boolean => "boolean",
            ArgumentType::Integer => "integer",
            ArgumentType::Uinteger => "uinteger",
            ArgumentType::Float => "float",
            ArgumentType::String => "string",
            ArgumentType::List => "list",
            ArgumentType::Notspecified => "notspecified",
        }
    }
}

impl Script {
    /// A script carrying only its display name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_script_wire_roundtrip_keeps_arguments() {
        let script = Script {
            name: "deploy".into(),
            description: "push the build".into(),
            file: "/scripts/deploy.py".into(),
            interpreter: Interpreter::Python as i32,
            arguments: vec![ScriptArgument {
                name: "dry_run".into(),
                argument_type: ArgumentType::Boolean as i32,
                default: "false".into(),
            }],
        };

        let bytes = script.encode_to_vec();
        let decoded = Script::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, script);
    }

    #[test]
    fn test_unknown_enum_value_is_rejected() {
        assert!(ArgumentType::try_from(42).is_err());
        assert_eq!(ArgumentType::try_from(5).unwrap(), ArgumentType::List);
    }

    #[test]
    fn test_labels_follow_proto_names() {
        for value in 0..=6 {
            let argument_type = ArgumentType::try_from(value).unwrap();
            assert_eq!(argument_type.label(), argument_type.as_str_name().to_lowercase());
        }
        for value in 0..=1 {
            let interpreter = Interpreter::try_from(value).unwrap();
            assert_eq!(interpreter.label(), interpreter.as_str_name().to_lowercase());
        }
    }
}
