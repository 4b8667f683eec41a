use serde::Deserialize;
use serde_json::Value;

/// Per-model pricing for the non-streaming cost estimate in `result` events
/// (spec.md §4.8 "opus/sonnet/haiku-class rates are declared constants").
/// Kept local rather than re-derived from `ralph-quota`'s catalog because the
/// model string on the wire (e.g. `claude-opus-4-20250514`) is a live CLI's
/// model identifier, not necessarily the catalog's own `id`.
const OPUS_CLASS_RATE: (f64, f64) = (15.0, 75.0);
const SONNET_CLASS_RATE: (f64, f64) = (3.0, 15.0);
const HAIKU_CLASS_RATE: (f64, f64) = (0.25, 1.25);

fn rate_for_model(model: &str) -> (f64, f64) {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        OPUS_CLASS_RATE
    } else if lower.contains("haiku") {
        HAIKU_CLASS_RATE
    } else {
        SONNET_CLASS_RATE
    }
}

pub fn cost_for_tokens(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (in_rate, out_rate) = rate_for_model(model);
    (input_tokens as f64 / 1_000_000.0) * in_rate + (output_tokens as f64 / 1_000_000.0) * out_rate
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Text,
    Tool { name: String },
}

/// Parser state threaded across lines of one session's stream (spec.md §9
/// "keep the parser a pure function of `(line, parserState) -> (parserState',
/// outputs[])` with no I/O").
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    current_block: Option<BlockKind>,
    text_buffer: String,
    tool_input_buffer: String,
    saw_deltas: bool,
    pub model: Option<String>,
}

/// One unit of structured output surfaced to the live-output ring buffer
/// (spec.md §4.8, §7 "types `system` or `result`").
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    Text(String),
    ToolStart { name: String, input_summary: String },
    Result { text: Option<String> },
    System { message: String },
    Usage { input_tokens: u64, output_tokens: u64, cost_usd: f64 },
    ModelUpdate(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawEvent {
    #[serde(rename = "message_start")]
    MessageStart {},
    #[serde(rename = "content_block_start")]
    ContentBlockStart { content_block: RawContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: RawDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {},
    #[serde(rename = "assistant")]
    Assistant { message: RawAssistantMessage },
    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        usage: Option<RawUsage>,
        #[serde(default)]
        model: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAssistantMessage {
    #[serde(default)]
    content: Vec<RawContentItem>,
}

#[derive(Debug, Deserialize)]
struct RawContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// Last two path components of a `/`-separated path, for a file-op tool's
/// short summary (spec.md §4.8 `content_block_stop`).
fn last_two_components(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() <= 2 {
        parts.join("/")
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "…"
    }
}

/// Summarizes a tool's accumulated JSON input for `tool_start` records
/// (spec.md §4.8 `content_block_stop`): file-op tools get the last two path
/// components, shell tools a 60-char truncation of the command, pattern-match
/// tools their raw pattern, anything else a bounded fallback.
fn summarize_tool_input(tool_name: &str, raw_json: &str) -> String {
    let lower = tool_name.to_lowercase();
    let parsed: Option<Value> = serde_json::from_str(raw_json).ok();

    let string_field = |field: &str| -> Option<String> {
        parsed
            .as_ref()
            .and_then(|v| v.get(field))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    if lower.contains("read") || lower.contains("write") || lower.contains("edit") {
        if let Some(path) = string_field("file_path").or_else(|| string_field("path")) {
            return last_two_components(&path);
        }
    }
    if lower.contains("bash") || lower.contains("shell") || lower.contains("exec") {
        if let Some(command) = string_field("command") {
            return truncate(&command, 60);
        }
    }
    if lower.contains("grep") || lower.contains("search") || lower.contains("glob") {
        if let Some(pattern) = string_field("pattern") {
            return pattern;
        }
    }
    truncate(raw_json, 60)
}

fn flush_text(state: &mut ParserState, outputs: &mut Vec<StreamOutput>) {
    if !state.text_buffer.is_empty() {
        outputs.push(StreamOutput::Text(std::mem::take(&mut state.text_buffer)));
    }
}

/// `(line, parserState) -> (parserState', outputs[])` (spec.md §9). Parses
/// one newline-delimited JSON event and returns the structured outputs it
/// produces, mutating `state` in place.
pub fn parse_line(line: &str, state: &mut ParserState) -> Vec<StreamOutput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut outputs = Vec::new();
    let event: RawEvent = match serde_json::from_str(trimmed) {
        Ok(e) => e,
        Err(err) => {
            outputs.push(StreamOutput::System {
                message: format!("malformed stream event: {err}"),
            });
            return outputs;
        }
    };

    match event {
        RawEvent::MessageStart {} => {
            state.text_buffer.clear();
            state.current_block = None;
            state.saw_deltas = false;
        }
        RawEvent::ContentBlockStart { content_block } => {
            flush_text(state, &mut outputs);
            state.current_block = match content_block.kind.as_str() {
                "tool_use" => Some(BlockKind::Tool {
                    name: content_block.name.unwrap_or_else(|| "unknown_tool".to_string()),
                }),
                _ => Some(BlockKind::Text),
            };
            state.tool_input_buffer.clear();
        }
        RawEvent::ContentBlockDelta { delta } => {
            state.saw_deltas = true;
            match delta.kind.as_str() {
                "text_delta" => {
                    if let Some(text) = delta.text {
                        state.text_buffer.push_str(&text);
                        while let Some(pos) = state.text_buffer.find('\n') {
                            let line: String = state.text_buffer.drain(..=pos).collect();
                            let trimmed = line.trim_end_matches('\n');
                            if !trimmed.is_empty() {
                                outputs.push(StreamOutput::Text(trimmed.to_string()));
                            }
                        }
                    }
                }
                "input_json_delta" => {
                    if let Some(partial) = delta.partial_json {
                        state.tool_input_buffer.push_str(&partial);
                    }
                }
                _ => {}
            }
        }
        RawEvent::ContentBlockStop {} => match state.current_block.take() {
            Some(BlockKind::Tool { name }) => {
                let summary = summarize_tool_input(&name, &state.tool_input_buffer);
                outputs.push(StreamOutput::ToolStart {
                    name,
                    input_summary: summary,
                });
                state.tool_input_buffer.clear();
            }
            _ => flush_text(state, &mut outputs),
        },
        RawEvent::Assistant { message } => {
            if !state.saw_deltas {
                for item in message.content {
                    if item.kind == "text" {
                        if let Some(text) = item.text {
                            outputs.push(StreamOutput::Text(text));
                        }
                    }
                }
            }
        }
        RawEvent::Result { result, usage, model } => {
            if let Some(model) = model {
                state.model = Some(model.clone());
                outputs.push(StreamOutput::ModelUpdate(model));
            }
            if let Some(usage) = usage {
                let (input_tokens, output_tokens) = match (usage.input_tokens, usage.output_tokens) {
                    (Some(i), Some(o)) => (i, o),
                    _ => {
                        let total = usage.total_tokens.unwrap_or(0);
                        (total * 33 / 100, total - (total * 33 / 100))
                    }
                };
                let cost_usd = cost_for_tokens(
                    state.model.as_deref().unwrap_or("claude-sonnet-4"),
                    input_tokens,
                    output_tokens,
                );
                outputs.push(StreamOutput::Usage {
                    input_tokens,
                    output_tokens,
                    cost_usd,
                });
            }
            outputs.push(StreamOutput::Result { text: result });
        }
    }

    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_flushes_on_newline() {
        let mut state = ParserState::default();
        parse_line(r#"{"type":"message_start"}"#, &mut state);
        parse_line(
            r#"{"type":"content_block_start","content_block":{"type":"text"}}"#,
            &mut state,
        );
        let out1 = parse_line(
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hello\n"}}"#,
            &mut state,
        );
        assert_eq!(out1, vec![StreamOutput::Text("hello".to_string())]);
    }

    #[test]
    fn tool_use_block_emits_tool_start_with_shell_truncation() {
        let mut state = ParserState::default();
        parse_line(
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"bash"}}"#,
            &mut state,
        );
        parse_line(
            &format!(
                r#"{{"type":"content_block_delta","delta":{{"type":"input_json_delta","partial_json":"{{\"command\":\"{}\"}}"}}}}"#,
                "echo hello world".to_string() + &"x".repeat(80)
            ),
            &mut state,
        );
        let out = parse_line(r#"{"type":"content_block_stop"}"#, &mut state);
        match &out[0] {
            StreamOutput::ToolStart { name, input_summary } => {
                assert_eq!(name, "bash");
                assert!(input_summary.chars().count() <= 61);
            }
            _ => panic!("expected ToolStart"),
        }
    }

    #[test]
    fn file_tool_summarizes_to_last_two_path_components() {
        let mut state = ParserState::default();
        parse_line(
            r#"{"type":"content_block_start","content_block":{"type":"tool_use","name":"read_file"}}"#,
            &mut state,
        );
        parse_line(
            r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{\"file_path\":\"/a/b/c/d.rs\"}"}}"#,
            &mut state,
        );
        let out = parse_line(r#"{"type":"content_block_stop"}"#, &mut state);
        match &out[0] {
            StreamOutput::ToolStart { input_summary, .. } => assert_eq!(input_summary, "c/d.rs"),
            _ => panic!("expected ToolStart"),
        }
    }

    #[test]
    fn malformed_json_emits_system_record_not_silently_dropped() {
        let mut state = ParserState::default();
        let out = parse_line("{not valid json", &mut state);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], StreamOutput::System { .. }));
    }

    #[test]
    fn assistant_fallback_only_fires_when_no_deltas_seen() {
        let mut state = ParserState::default();
        parse_line(r#"{"type":"message_start"}"#, &mut state);
        let out = parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#,
            &mut state,
        );
        assert_eq!(out, vec![StreamOutput::Text("hi".to_string())]);

        state.saw_deltas = true;
        let out2 = parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"ignored"}]}}"#,
            &mut state,
        );
        assert!(out2.is_empty());
    }

    #[test]
    fn result_event_apportions_total_tokens_33_67_when_split_absent() {
        let mut state = ParserState::default();
        let out = parse_line(
            r#"{"type":"result","result":"done","usage":{"total_tokens":1000}}"#,
            &mut state,
        );
        let usage = out
            .iter()
            .find_map(|o| match o {
                StreamOutput::Usage { input_tokens, output_tokens, .. } => Some((*input_tokens, *output_tokens)),
                _ => None,
            })
            .unwrap();
        assert_eq!(usage, (330, 670));
    }

    #[test]
    fn result_with_explicit_split_is_used_directly() {
        let mut state = ParserState::default();
        let out = parse_line(
            r#"{"type":"result","result":"done","usage":{"input_tokens":100,"output_tokens":50}}"#,
            &mut state,
        );
        let usage = out
            .iter()
            .find_map(|o| match o {
                StreamOutput::Usage { input_tokens, output_tokens, .. } => Some((*input_tokens, *output_tokens)),
                _ => None,
            })
            .unwrap();
        assert_eq!(usage, (100, 50));
    }
}
