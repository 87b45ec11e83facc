//! Wire types for DAP 1.x: the envelope (`Message`/`Request`/`Response`/
//! `Event`) plus the typed argument/result/body structs for the command and
//! event surface §4.2 names. Modeled after the teacher's `dap/types.rs`, with
//! `Capabilities` broadened to the full DAP 1.x flag set (grounded on
//! `vanilla-technologies-debug-adapter-protocol`'s richer `Capabilities`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

/// A DAP protocol message: one JSON object per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "request")]
    Request(Request),
    #[serde(rename = "response")]
    Response(Response),
    #[serde(rename = "event")]
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// §4.2: "error message extracted from `message`, falling back to
    /// `body.error.format`".
    pub fn error_message(&self) -> Option<String> {
        if let Some(m) = &self.message {
            return Some(m.clone());
        }
        self.body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(|e| e.get("format"))
            .and_then(|f| f.as_str())
            .map(|s| s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

// ---------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    #[serde(rename = "clientID")]
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    pub locale: Option<String>,
    pub lines_start_at1: Option<bool>,
    pub columns_start_at1: Option<bool>,
    pub path_format: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_variable_type: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_variable_paging: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_run_in_terminal_request: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_memory_references: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_progress_reporting: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_invalidated_event: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_memory_event: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_ansistyling: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub supports_start_debugging_request: bool,
}

impl Default for InitializeRequestArguments {
    /// §4.3: "a fixed client profile declaring support for runInTerminal,
    /// startDebugging, variable types, variable paging, progress reporting,
    /// invalidated events, memory events, ANSI styling."
    fn default() -> Self {
        Self {
            client_id: Some("dapcore".to_string()),
            client_name: Some("dapcore".to_string()),
            adapter_id: String::new(),
            locale: Some("en-US".to_string()),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".to_string()),
            supports_variable_type: true,
            supports_variable_paging: true,
            supports_run_in_terminal_request: true,
            supports_memory_references: true,
            supports_progress_reporting: true,
            supports_invalidated_event: true,
            supports_memory_event: true,
            supports_ansistyling: true,
            supports_start_debugging_request: true,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    #[serde(skip_serializing_if = "is_false")]
    pub supports_configuration_done_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_function_breakpoints: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_conditional_breakpoints: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_hit_conditional_breakpoints: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_evaluate_for_hovers: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_step_back: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_set_variable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_restart_frame: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_goto_targets_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_step_in_targets_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_completions_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_modules_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_restart_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_exception_options: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_value_formatting_options: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_exception_info_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub support_terminate_debuggee: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub support_suspend_debuggee: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_delayed_stack_trace_loading: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_loaded_sources_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_log_points: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_terminate_threads_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_set_expression: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_terminate_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_data_breakpoints: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_read_memory_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_disassemble_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_cancel_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_breakpoint_locations_request: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_clipboard_context: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_stepping_granularity: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_instruction_breakpoints: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub supports_exception_filter_options: bool,
    #[serde(default)]
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
}

impl Capabilities {
    /// §4.6 `capabilities` event: "merge into session.capabilities".
    /// Booleans OR together (an adapter only ever adds support, never
    /// retracts it mid-session); the filter list is replaced wholesale if
    /// the update carries one.
    pub fn merge(&mut self, update: &Capabilities) {
        macro_rules! or_merge {
            ($($field:ident),* $(,)?) => {
                $(self.$field = self.$field || update.$field;)*
            };
        }
        or_merge!(
            supports_configuration_done_request,
            supports_function_breakpoints,
            supports_conditional_breakpoints,
            supports_hit_conditional_breakpoints,
            supports_evaluate_for_hovers,
            supports_step_back,
            supports_set_variable,
            supports_restart_frame,
            supports_goto_targets_request,
            supports_step_in_targets_request,
            supports_completions_request,
            supports_modules_request,
            supports_restart_request,
            supports_exception_options,
            supports_value_formatting_options,
            supports_exception_info_request,
            support_terminate_debuggee,
            support_suspend_debuggee,
            supports_delayed_stack_trace_loading,
            supports_loaded_sources_request,
            supports_log_points,
            supports_terminate_threads_request,
            supports_set_expression,
            supports_terminate_request,
            supports_data_breakpoints,
            supports_read_memory_request,
            supports_disassemble_request,
            supports_cancel_request,
            supports_breakpoint_locations_request,
            supports_clipboard_context,
            supports_stepping_granularity,
            supports_instruction_breakpoints,
            supports_exception_filter_options,
        );
        if !update.exception_breakpoint_filters.is_empty() {
            self.exception_breakpoint_filters = update.exception_breakpoint_filters.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub supports_condition: bool,
    #[serde(default)]
    pub condition_description: Option<String>,
}

// ---------------------------------------------------------------------
// launch / attach / configurationDone / disconnect / terminate / restart
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequestArguments {
    #[serde(default, rename = "noDebug", skip_serializing_if = "Option::is_none")]
    pub no_debug: Option<bool>,
    #[serde(flatten)]
    pub additional: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachRequestArguments {
    #[serde(flatten)]
    pub additional: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_debuggee: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
}

// ---------------------------------------------------------------------
// source / breakpoints
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    pub filters: Vec<String>,
}

// ---------------------------------------------------------------------
// execution control
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadScopedArguments {
    pub thread_id: i64,
}

pub type ContinueArguments = ThreadScopedArguments;
pub type NextArguments = ThreadScopedArguments;
pub type StepInArguments = ThreadScopedArguments;
pub type StepOutArguments = ThreadScopedArguments;
pub type PauseArguments = ThreadScopedArguments;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    #[serde(default)]
    pub expensive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    pub variables_reference: i64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInTargetsArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    pub text: String,
    pub column: i64,
}

// ---------------------------------------------------------------------
// event bodies
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub all_threads_stopped: bool,
    #[serde(default)]
    pub hit_breakpoint_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(default)]
    pub all_threads_continued: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    pub reason: String,
    pub thread_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    #[serde(default)]
    pub category: Option<String>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: String,
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSourceEventBody {
    pub reason: String,
    pub source: Source,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {
    #[serde(default)]
    pub restart: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidatedEventBody {
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_frame_id: Option<i64>,
}

// ---------------------------------------------------------------------
// reverse requests
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalRequestArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cwd: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDebuggingRequestArguments {
    pub configuration: Value,
    pub request: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_merge_is_monotonic_and_never_retracts_support() {
        let mut caps = Capabilities {
            supports_conditional_breakpoints: true,
            ..Default::default()
        };
        let update = Capabilities {
            supports_function_breakpoints: true,
            ..Default::default()
        };
        caps.merge(&update);
        assert!(caps.supports_conditional_breakpoints);
        assert!(caps.supports_function_breakpoints);
    }

    #[test]
    fn response_error_message_falls_back_to_body_error_format() {
        let resp = Response {
            seq: 2,
            request_seq: 1,
            command: "launch".to_string(),
            success: false,
            message: None,
            body: Some(serde_json::json!({"error": {"format": "boom"}})),
        };
        assert_eq!(resp.error_message().as_deref(), Some("boom"));
    }

    #[test]
    fn default_initialize_arguments_declare_the_fixed_client_profile() {
        let args = InitializeRequestArguments::default();
        assert!(args.supports_run_in_terminal_request);
        assert!(args.supports_start_debugging_request);
        assert_eq!(args.lines_start_at1, Some(true));
    }
}
