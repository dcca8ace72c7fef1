//! The directive parser — extracts the JSON payload after `</think>` and
//! reconciles both response dialects into one [`ParsedResponse`].
//!
//! The model speaks two grammars:
//! - **Action form**: `{"action": {"type", "tags", "value"}, "next_state"?}`
//! - **Legacy form**: a flat object of `working_memory_add`,
//!   `working_memory_remove`, `storage_add`, `storage_remove`,
//!   `status_change`, `thinking_log`, `evaluation_log` fields.
//!
//! This module is the only place the dialects exist; everything downstream
//! sees normalized directives in response-document order.

use pagemind_core::error::DirectiveError;
use pagemind_core::{Directive, DirectiveOp, ParsedResponse, Phase, Value};

/// Parse the verbatim output text of one model response.
pub fn parse_response(text: &str) -> Result<ParsedResponse, DirectiveError> {
    let Some(delim) = text.find("</think>") else {
        return Err(DirectiveError::MissingThinkDelimiter);
    };
    let payload = text[delim + "</think>".len()..].trim();

    let document = parse_payload(payload)?;
    if !document.is_object() {
        return Err(DirectiveError::InvalidDirectiveJson {
            position: 0,
            reason: "directive payload must be a JSON object".into(),
        });
    }

    if document.get("action").is_some() {
        parse_action_form(&document)
    } else {
        parse_legacy_form(&document)
    }
}

/// Parse the payload as JSON, retrying once after transport unescaping.
///
/// The endpoint returns the output inside a JSON string; most of the time
/// the transport layer has already decoded it, but some models emit the
/// directive document escaped a second time (`{\"action\": ...}`).
fn parse_payload(payload: &str) -> Result<Value, DirectiveError> {
    match Value::parse(payload) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let unescaped = unescape_transport(payload);
            if unescaped != payload {
                if let Ok(value) = Value::parse(&unescaped) {
                    return Ok(value);
                }
            }
            let (position, reason) = match first_err {
                pagemind_core::error::ValueError::Parse { position, reason } => (position, reason),
                other => (0, other.to_string()),
            };
            Err(DirectiveError::InvalidDirectiveJson { position, reason })
        }
    }
}

/// Undo one level of JSON string escaping. Unknown escapes pass through.
fn unescape_transport(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_action_form(document: &Value) -> Result<ParsedResponse, DirectiveError> {
    let action = document.get("action").expect("caller checked presence");

    let type_name = action
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let op = DirectiveOp::parse(type_name)
        .ok_or_else(|| DirectiveError::UnknownActionType(type_name.to_string()))?;

    let key = key_from_tags(action.get("tags"))?;

    let directive = if op.is_add() {
        let value = action.get("value").cloned().unwrap_or(Value::Null);
        Directive::add(op, key, value)
    } else {
        Directive::remove(op, key)
    };

    let next_phase = parse_next_phase(document.get("next_state"))?;

    Ok(ParsedResponse {
        directives: vec![directive],
        next_phase,
        thinking_log: None,
        evaluation_log: None,
    })
}

/// Underscore-join the tag list. Non-string tags are silently skipped; an
/// empty result is an error.
fn key_from_tags(tags: Option<&Value>) -> Result<String, DirectiveError> {
    let parts: Vec<&str> = tags
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let key = parts.join("_");
    if key.is_empty() {
        return Err(DirectiveError::EmptyKey);
    }
    Ok(key)
}

fn parse_next_phase(value: Option<&Value>) -> Result<Option<Phase>, DirectiveError> {
    match value.and_then(Value::as_str) {
        Some(name) => Ok(Some(Phase::parse(name)?)),
        None => Ok(None),
    }
}

fn parse_legacy_form(document: &Value) -> Result<ParsedResponse, DirectiveError> {
    let mut response = ParsedResponse::default();
    let entries = document.as_entries().expect("caller checked object");

    // Field order is directive order.
    for (field, value) in entries {
        match field.as_str() {
            "working_memory_add" => push_adds(&mut response, DirectiveOp::WorkingMemoryAdd, value),
            "storage_add" => push_adds(&mut response, DirectiveOp::StorageAdd, value),
            "working_memory_remove" => {
                push_removes(&mut response, DirectiveOp::WorkingMemoryRemove, value)
            }
            "storage_remove" => push_removes(&mut response, DirectiveOp::StorageRemove, value),
            "status_change" => {
                response.next_phase = parse_next_phase(Some(value))?;
            }
            "thinking_log" => {
                response.thinking_log = value.as_str().map(str::to_string);
            }
            "evaluation_log" => {
                response.evaluation_log = value.as_str().map(str::to_string);
            }
            // Models decorate responses with extra fields; ignore them.
            _ => {}
        }
    }
    Ok(response)
}

/// Each entry of an add object becomes one directive, in entry order.
fn push_adds(response: &mut ParsedResponse, op: DirectiveOp, value: &Value) {
    if let Some(entries) = value.as_entries() {
        for (key, item) in entries {
            response
                .directives
                .push(Directive::add(op, key.clone(), item.clone()));
        }
    }
}

/// A remove field names one key (string) or several (array of strings).
fn push_removes(response: &mut ParsedResponse, op: DirectiveOp, value: &Value) {
    match value {
        Value::Text(key) => response.directives.push(Directive::remove(op, key.clone())),
        Value::Array(items) => {
            for key in items.iter().filter_map(Value::as_str) {
                response.directives.push(Directive::remove(op, key.to_string()));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_delimiter_is_an_error() {
        assert_eq!(
            parse_response("no delimiter here"),
            Err(DirectiveError::MissingThinkDelimiter)
        );
    }

    #[test]
    fn action_form_normalizes() {
        let text = r#"<think>planning</think>{"action":{"type":"working_memory_add","tags":["a","b"],"value":{"x":1}},"next_state":"paging"}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.directives.len(), 1);
        let directive = &parsed.directives[0];
        assert_eq!(directive.op, DirectiveOp::WorkingMemoryAdd);
        assert_eq!(directive.key, "a_b");
        assert_eq!(
            directive.value.as_ref().unwrap().get("x").and_then(Value::as_f64),
            Some(1.0)
        );
        assert_eq!(parsed.next_phase, Some(Phase::Paging));
    }

    #[test]
    fn action_form_accepts_escaped_payload() {
        // The directive document escaped one extra time by the model.
        let text = "<think>x</think>{\\\"action\\\":{\\\"type\\\":\\\"storage_add\\\",\\\"tags\\\":[\\\"notes\\\"],\\\"value\\\":\\\"hi\\\"}}";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.directives[0].op, DirectiveOp::StorageAdd);
        assert_eq!(parsed.directives[0].key, "notes");
    }

    #[test]
    fn unknown_action_type_fails() {
        let text = r#"</think>{"action":{"type":"memory_defrag","tags":["a"]}}"#;
        assert_eq!(
            parse_response(text),
            Err(DirectiveError::UnknownActionType("memory_defrag".into()))
        );
    }

    #[test]
    fn non_string_tags_are_skipped() {
        let text = r#"</think>{"action":{"type":"working_memory_add","tags":["a",42,null,"b"],"value":1}}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.directives[0].key, "a_b");
    }

    #[test]
    fn empty_tags_fail_with_empty_key() {
        for tags in ["[]", "[42]", "null"] {
            let text = format!(
                r#"</think>{{"action":{{"type":"working_memory_add","tags":{tags},"value":1}}}}"#
            );
            assert_eq!(parse_response(&text), Err(DirectiveError::EmptyKey));
        }
    }

    #[test]
    fn legacy_multi_op_keeps_field_order() {
        let text = r#"</think>{"working_memory_add":{"k":"v"},"storage_add":{"k2":2},"status_change":"executing"}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.directives.len(), 2);
        assert_eq!(parsed.directives[0].op, DirectiveOp::WorkingMemoryAdd);
        assert_eq!(parsed.directives[0].key, "k");
        assert_eq!(parsed.directives[1].op, DirectiveOp::StorageAdd);
        assert_eq!(parsed.directives[1].key, "k2");
        assert_eq!(parsed.next_phase, Some(Phase::Executing));
    }

    #[test]
    fn legacy_removes_accept_string_and_array() {
        let text = r#"</think>{"working_memory_remove":"one","storage_remove":["two","three"]}"#;
        let parsed = parse_response(text).unwrap();
        let keys: Vec<&str> = parsed.directives.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["one", "two", "three"]);
        assert!(parsed.directives.iter().all(|d| d.value.is_none()));
    }

    #[test]
    fn legacy_add_entries_stay_in_order() {
        let text = r#"</think>{"working_memory_add":{"z":1,"a":2,"m":3}}"#;
        let parsed = parse_response(text).unwrap();
        let keys: Vec<&str> = parsed.directives.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn legacy_logs_are_extracted() {
        let text = r#"</think>{"thinking_log":"tried A","evaluation_log":"A failed","status_change":"thinking"}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.thinking_log.as_deref(), Some("tried A"));
        assert_eq!(parsed.evaluation_log.as_deref(), Some("A failed"));
        assert!(parsed.directives.is_empty());
    }

    #[test]
    fn invalid_phase_name_fails() {
        let text = r#"</think>{"status_change":"dreaming"}"#;
        assert_eq!(
            parse_response(text),
            Err(DirectiveError::InvalidPhase("dreaming".into()))
        );
    }

    #[test]
    fn garbage_payload_fails_with_position() {
        let text = "</think>{broken";
        match parse_response(text) {
            Err(DirectiveError::InvalidDirectiveJson { .. }) => {}
            other => panic!("expected InvalidDirectiveJson, got {other:?}"),
        }
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(matches!(
            parse_response("</think>[1,2,3]"),
            Err(DirectiveError::InvalidDirectiveJson { .. })
        ));
    }

    #[test]
    fn unknown_legacy_fields_are_ignored() {
        let text = r#"</think>{"confidence":0.9,"working_memory_add":{"k":1}}"#;
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.directives.len(), 1);
    }

    #[test]
    fn empty_object_yields_empty_response() {
        let parsed = parse_response("</think>{}").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn first_delimiter_wins() {
        let text = "<think>a</think>{\"working_memory_add\":{\"k\":1}}</think>";
        // Trailing junk after the document is a parse failure, which is the
        // contract: the payload is everything after the FIRST delimiter.
        assert!(parse_response(text).is_err());
    }
}
