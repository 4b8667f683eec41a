use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Running token/cost metrics for the current session, reset at each
/// session launch (§3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cost_usd: f64,
    pub tool_call_count: u32,
}

/// A recently-seen tool invocation, kept in a bounded ring for live-output
/// display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSummary {
    pub name: String,
    pub input_summary: String,
}

/// Live activity snapshot for the currently-running session (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool_input_summary: Option<String>,
    pub is_thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_thinking_snippet: Option<String>,
    #[serde(default)]
    pub recent_tools: VecDeque<ToolCallSummary>,
    pub metrics: ActivityMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

pub const RECENT_TOOLS_CAP: usize = 10;

impl AgentActivity {
    pub fn reset() -> Self {
        Self {
            current_tool: None,
            current_tool_input_summary: None,
            is_thinking: false,
            last_thinking_snippet: None,
            recent_tools: VecDeque::new(),
            metrics: ActivityMetrics::default(),
            started_at: Some(Utc::now()),
        }
    }

    pub fn push_tool(&mut self, summary: ToolCallSummary) {
        self.recent_tools.push_back(summary);
        while self.recent_tools.len() > RECENT_TOOLS_CAP {
            self.recent_tools.pop_front();
        }
    }
}

impl Default for AgentActivity {
    fn default() -> Self {
        Self::reset()
    }
}

/// The structured output ring buffer kept by the engine while tailing a
/// session's JSON event stream (§4.8). Retains the last 100 records,
/// trimmed to 60 on overflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StreamRecord {
    Text { content: String },
    ToolStart { tool: String, input_summary: String },
    Result { content: Option<String> },
    System { content: String },
}

pub const OUTPUT_RING_CAP: usize = 100;
pub const OUTPUT_RING_TRIM_TO: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct OutputRing {
    records: VecDeque<StreamRecord>,
}

impl OutputRing {
    pub fn push(&mut self, record: StreamRecord) {
        self.records.push_back(record);
        if self.records.len() > OUTPUT_RING_CAP {
            while self.records.len() > OUTPUT_RING_TRIM_TO {
                self.records.pop_front();
            }
        }
    }

    pub fn as_slice(&self) -> Vec<StreamRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_ring_trims_to_60_on_overflow() {
        let mut ring = OutputRing::default();
        for i in 0..120 {
            ring.push(StreamRecord::System {
                content: format!("line {i}"),
            });
        }
        assert_eq!(ring.len(), 60);
    }

    #[test]
    fn recent_tools_caps_at_ten() {
        let mut activity = AgentActivity::reset();
        for i in 0..15 {
            activity.push_tool(ToolCallSummary {
                name: format!("tool{i}"),
                input_summary: String::new(),
            });
        }
        assert_eq!(activity.recent_tools.len(), RECENT_TOOLS_CAP);
    }
}
