//! Token stream emitted by the page parser
//!
//! This is the only artifact consumed downstream: an ordered list of
//! `(header_path, name, params)` triples serialized as JSON into the
//! `data` field of a parsed record.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Template parameters in declaration order.
pub type Params = IndexMap<String, String>;

/// One label in the header path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderSegment {
    /// Filler for a skipped heading level.
    Placeholder,
    Text(String),
    /// A heading whose title was a recognized meaning-header template.
    Meaning {
        template: String,
        params: Params,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

/// Payload of a token: either free text or named parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenParams {
    Text(String),
    Named(Params),
}

impl TokenParams {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TokenParams::Text(text) => Some(text),
            TokenParams::Named(_) => None,
        }
    }

    pub fn as_named(&self) -> Option<&Params> {
        match self {
            TokenParams::Named(params) => Some(params),
            TokenParams::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub header: Vec<HeaderSegment>,
    pub name: String,
    pub params: TokenParams,
}

impl Token {
    pub fn new(header: Vec<HeaderSegment>, name: impl Into<String>, params: TokenParams) -> Self {
        Self {
            header,
            name: name.into(),
            params,
        }
    }

    /// Provenance tokens (`_name`) record pass-through expansions and
    /// well-known parameter text rather than terminal templates.
    pub fn is_synthetic(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// Serialize a token list into a record payload.
pub fn tokens_to_value(tokens: &[Token]) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(tokens)
}

/// Read a token list back from a record payload.
pub fn tokens_from_value(value: &serde_json::Value) -> Result<Vec<Token>, serde_json::Error> {
    Vec::<Token>::deserialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_segments_serialize_compactly() {
        let mut params = Params::new();
        params.insert("1".to_string(), "кошка".to_string());
        let header = vec![
            HeaderSegment::Placeholder,
            HeaderSegment::Text("Морфология".to_string()),
            HeaderSegment::Meaning {
                template: "заголовок".to_string(),
                params,
                text: None,
            },
        ];
        let value = serde_json::to_value(&header).unwrap();
        assert_eq!(
            value,
            json!([null, "Морфология", {"template": "заголовок", "params": {"1": "кошка"}}])
        );
    }

    #[test]
    fn test_params_keep_declaration_order() {
        let mut params = Params::new();
        params.insert("z".to_string(), "1".to_string());
        params.insert("a".to_string(), "2".to_string());
        let token = Token::new(vec![], "сущ ru f a 1a", TokenParams::Named(params));
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.find("\"z\"").unwrap() < json.find("\"a\"").unwrap());
    }

    #[test]
    fn test_tokens_value_round_trip() {
        let tokens = vec![
            Token::new(vec![], "_слоги", TokenParams::Text("ко-шка".to_string())),
            Token::new(
                vec![HeaderSegment::Text("Значение".to_string())],
                "морфо",
                TokenParams::Named(Params::new()),
            ),
        ];
        let value = tokens_to_value(&tokens).unwrap();
        assert_eq!(tokens_from_value(&value).unwrap(), tokens);
        assert!(tokens[0].is_synthetic());
        assert!(!tokens[1].is_synthetic());
    }
}
