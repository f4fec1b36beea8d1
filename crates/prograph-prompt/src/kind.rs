//! Prompt type names.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The prompt family a task runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptKind {
    /// Plain fine-tuning of backbone and answering head.
    #[serde(rename = "None")]
    None,
    /// Per-class prompt token graphs (ProG / all-in-one).
    #[serde(rename = "ProG")]
    ProG,
    #[serde(rename = "gpf")]
    Gpf,
    #[serde(rename = "gpf-plus")]
    GpfPlus,
    #[serde(rename = "Gprompt")]
    Gprompt,
    #[serde(rename = "gppt")]
    Gppt,
}

impl PromptKind {
    pub const ALL: [PromptKind; 6] = [
        PromptKind::None,
        PromptKind::ProG,
        PromptKind::Gpf,
        PromptKind::GpfPlus,
        PromptKind::Gprompt,
        PromptKind::Gppt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::None => "None",
            PromptKind::ProG => "ProG",
            PromptKind::Gpf => "gpf",
            PromptKind::GpfPlus => "gpf-plus",
            PromptKind::Gprompt => "Gprompt",
            PromptKind::Gppt => "gppt",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PromptKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnsupportedPrompt(s.to_string()))
    }
}
