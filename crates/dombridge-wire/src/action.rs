//! The catalog of executor operations and their parameter shapes.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::envelope::Parameters;
use crate::error::WireError;

/// Operations the executor peer understands. Anything else fails with
/// `UnsupportedAction` before reaching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FindElement,
    ClickElement,
    InputText,
    GetElementText,
    SendKey,
    GetPageInfo,
    GetLastClickedElement,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::FindElement,
        ActionKind::ClickElement,
        ActionKind::InputText,
        ActionKind::GetElementText,
        ActionKind::SendKey,
        ActionKind::GetPageInfo,
        ActionKind::GetLastClickedElement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::FindElement => "find_element",
            ActionKind::ClickElement => "click_element",
            ActionKind::InputText => "input_text",
            ActionKind::GetElementText => "get_element_text",
            ActionKind::SendKey => "send_key",
            ActionKind::GetPageInfo => "get_page_info",
            ActionKind::GetLastClickedElement => "get_last_clicked_element",
        }
    }

    /// Parameter keys that must be present, each with a non-empty string value.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            ActionKind::FindElement
            | ActionKind::ClickElement
            | ActionKind::GetElementText => &["selector"],
            ActionKind::InputText => &["selector", "text"],
            ActionKind::SendKey => &["selector", "key"],
            ActionKind::GetPageInfo | ActionKind::GetLastClickedElement => &[],
        }
    }

    /// Validates the fixed parameter shape for this action.
    pub fn validate(&self, parameters: &Parameters) -> Result<(), WireError> {
        for key in self.required_params() {
            let present = parameters
                .get(*key)
                .and_then(|value| value.as_str())
                .is_some_and(|s| !s.trim().is_empty());
            if !present {
                return Err(WireError::MissingParameter {
                    action: *self,
                    name: key,
                });
            }
        }
        for value in parameters.values() {
            if value.is_object() || value.is_array() {
                return Err(WireError::NonScalarParameter { action: *self });
            }
        }
        Ok(())
    }
}

impl FromStr for ActionKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| WireError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which class of caller issued a command. Carried on the wire as `source`
/// for logging on the executor side; never used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    #[default]
    Interactive,
    Tool,
    Assistant,
}

impl CallerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerKind::Interactive => "interactive",
            CallerKind::Tool => "tool",
            CallerKind::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interactive" => Some(CallerKind::Interactive),
            "tool" => Some(CallerKind::Tool),
            "assistant" => Some(CallerKind::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("test params must be an object"),
        }
    }

    #[test]
    fn test_action_round_trips_through_str() {
        for action in ActionKind::ALL {
            let parsed: ActionKind = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err = "drop_database".parse::<ActionKind>().unwrap_err();
        assert!(matches!(err, WireError::UnknownAction(name) if name == "drop_database"));
    }

    #[test]
    fn test_action_serde_uses_snake_case() {
        let json = serde_json::to_string(&ActionKind::ClickElement).unwrap();
        assert_eq!(json, "\"click_element\"");
    }

    #[test]
    fn test_validate_accepts_complete_params() {
        let p = params(json!({"selector": "#go"}));
        assert!(ActionKind::ClickElement.validate(&p).is_ok());

        let p = params(json!({"selector": "#name", "text": "hello"}));
        assert!(ActionKind::InputText.validate(&p).is_ok());

        let p = params(json!({}));
        assert!(ActionKind::GetPageInfo.validate(&p).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_selector() {
        let p = params(json!({}));
        let err = ActionKind::ClickElement.validate(&p).unwrap_err();
        assert!(matches!(
            err,
            WireError::MissingParameter { name: "selector", .. }
        ));
    }

    #[test]
    fn test_validate_rejects_blank_selector() {
        let p = params(json!({"selector": "   "}));
        assert!(ActionKind::FindElement.validate(&p).is_err());
    }

    #[test]
    fn test_validate_rejects_nested_values() {
        let p = params(json!({"selector": "#go", "extra": {"nested": true}}));
        let err = ActionKind::ClickElement.validate(&p).unwrap_err();
        assert!(matches!(err, WireError::NonScalarParameter { .. }));
    }

    #[test]
    fn test_caller_kind_parse() {
        assert_eq!(CallerKind::parse("tool"), Some(CallerKind::Tool));
        assert_eq!(CallerKind::parse("nope"), None);
        assert_eq!(CallerKind::default(), CallerKind::Interactive);
    }
}
