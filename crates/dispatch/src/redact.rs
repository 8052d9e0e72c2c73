//! Sensitive data redaction
//!
//! Pure, deterministic, no I/O. Every value reachable under a sensitive key
//! (matched case-insensitively) is replaced by the fixed marker, recursively
//! through nested maps and sequences. Structure and non-matching keys are
//! preserved exactly, and no input can make redaction fail: value types the
//! walker does not recognize pass through untouched unless they sit under a
//! sensitive key.

use std::collections::{HashMap, HashSet};

use chronicle_core::config::REDACTION_MARKER;
use chronicle_core::Value;

/// Structure-preserving redactor carrying its configuration explicitly
///
/// The key set and per-command argument indices are plain data threaded in
/// from [`DispatchConfig`](chronicle_core::DispatchConfig); there is no
/// process-wide state.
#[derive(Debug, Clone)]
pub struct Redactor {
    /// Lowercased sensitive key names
    keys: HashSet<String>,
    /// Positional argument indices to redact, per command
    command_args: HashMap<String, Vec<usize>>,
}

impl Redactor {
    /// Build a redactor from a key set and a per-command argument map
    pub fn new(
        sensitive_keys: &HashSet<String>,
        command_args: &HashMap<String, Vec<usize>>,
    ) -> Self {
        Redactor {
            keys: sensitive_keys.iter().map(|k| k.to_lowercase()).collect(),
            command_args: command_args.clone(),
        }
    }

    /// True when `key` names a sensitive field
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(&key.to_lowercase())
    }

    /// Produce a structurally identical copy with sensitive values replaced
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = HashMap::with_capacity(map.len());
                for (key, inner) in map {
                    if self.is_sensitive(key) {
                        out.insert(key.clone(), Value::String(REDACTION_MARKER.to_string()));
                    } else {
                        out.insert(key.clone(), self.redact(inner));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    /// Redact configured positional arguments of `cmd`
    ///
    /// Arguments that look like flags keep their value: a mis-typed flag in
    /// a credential slot is not a secret, and hiding it would obscure what
    /// the user actually ran.
    pub fn redact_args(&self, cmd: &str, args: &[String]) -> Vec<String> {
        let indices = match self.command_args.get(cmd) {
            Some(indices) => indices,
            None => return args.to_vec(),
        };
        let mut out = args.to_vec();
        for &idx in indices {
            if let Some(arg) = out.get_mut(idx) {
                if !arg.starts_with('-') {
                    *arg = REDACTION_MARKER.to_string();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::DEFAULT_SENSITIVE_KEYS;
    use proptest::prelude::*;

    fn default_redactor() -> Redactor {
        let keys = DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect();
        let mut command_args = HashMap::new();
        command_args.insert("login".to_string(), vec![0]);
        Redactor::new(&keys, &command_args)
    }

    fn marker() -> Value {
        Value::String(REDACTION_MARKER.to_string())
    }

    #[test]
    fn test_top_level_key_redacted() {
        let input = Value::from_json(serde_json::json!({"password": "hunter2", "user": "ada"}));
        let out = default_redactor().redact(&input);
        let map = out.as_object().unwrap();
        assert_eq!(map.get("password"), Some(&marker()));
        assert_eq!(map.get("user"), Some(&Value::String("ada".into())));
    }

    #[test]
    fn test_nested_and_array_paths_redacted() {
        let input = Value::from_json(serde_json::json!({
            "sessions": [
                {"token": "aaa", "device": "cli"},
                {"token": "bbb", "device": "web"}
            ],
            "meta": {"auth": {"SECRET": "x"}}
        }));
        let out = default_redactor().redact(&input);
        let sessions = out.as_object().unwrap()["sessions"].as_array().unwrap();
        for session in sessions {
            assert_eq!(session.as_object().unwrap().get("token"), Some(&marker()));
            assert_ne!(session.as_object().unwrap().get("device"), Some(&marker()));
        }
        let auth = out.as_object().unwrap()["meta"].as_object().unwrap()["auth"]
            .as_object()
            .unwrap();
        assert_eq!(auth.get("SECRET"), Some(&marker()), "case-insensitive match");
    }

    #[test]
    fn test_non_object_values_pass_through() {
        let redactor = default_redactor();
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(9),
            Value::Float(2.5),
            Value::String("plain".into()),
        ] {
            assert_eq!(redactor.redact(&value), value);
        }
    }

    #[test]
    fn test_login_credential_argument_redacted() {
        let redactor = default_redactor();
        let args = vec!["ada@example.com:pw".to_string(), "--ttl=3600".to_string()];
        let out = redactor.redact_args("login", &args);
        assert_eq!(out[0], REDACTION_MARKER);
        assert_eq!(out[1], "--ttl=3600");
    }

    #[test]
    fn test_flag_in_credential_slot_kept() {
        let redactor = default_redactor();
        let out = redactor.redact_args("login", &["--help".to_string()]);
        assert_eq!(out[0], "--help");
    }

    #[test]
    fn test_unmapped_command_args_untouched() {
        let redactor = default_redactor();
        let args = vec!["whatever".to_string()];
        assert_eq!(redactor.redact_args("worldstate_snapshot", &args), args);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof!["password|token|secret".prop_map(String::from), "[a-f]{1,4}"],
                    inner,
                    0..4
                )
                .prop_map(Value::Object),
            ]
        })
    }

    fn assert_no_sensitive_leaf(redactor: &Redactor, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    if redactor.is_sensitive(key) {
                        assert_eq!(inner, &marker());
                    } else {
                        assert_no_sensitive_leaf(redactor, inner);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    assert_no_sensitive_leaf(redactor, item);
                }
            }
            _ => {}
        }
    }

    proptest! {
        /// Every sensitive key at any depth carries the marker afterwards.
        #[test]
        fn prop_no_sensitive_value_survives(value in value_strategy()) {
            let redactor = default_redactor();
            let out = redactor.redact(&value);
            assert_no_sensitive_leaf(&redactor, &out);
        }

        /// Redacting twice equals redacting once.
        #[test]
        fn prop_redaction_is_idempotent(value in value_strategy()) {
            let redactor = default_redactor();
            let once = redactor.redact(&value);
            prop_assert_eq!(redactor.redact(&once), once.clone());
        }

        /// Structure (types, lengths, key sets) is preserved exactly.
        #[test]
        fn prop_structure_preserved(value in value_strategy()) {
            fn same_shape(redactor: &Redactor, a: &Value, b: &Value) -> bool {
                match (a, b) {
                    (Value::Object(x), Value::Object(y)) => {
                        x.len() == y.len()
                            && x.iter().all(|(k, v)| match y.get(k) {
                                Some(w) if redactor.is_sensitive(k) => w == &Value::String(REDACTION_MARKER.to_string()),
                                Some(w) => same_shape(redactor, v, w),
                                None => false,
                            })
                    }
                    (Value::Array(x), Value::Array(y)) => {
                        x.len() == y.len()
                            && x.iter().zip(y).all(|(v, w)| same_shape(redactor, v, w))
                    }
                    (v, w) => v == w,
                }
            }
            let redactor = default_redactor();
            let out = redactor.redact(&value);
            prop_assert!(same_shape(&redactor, &value, &out));
        }
    }
}
