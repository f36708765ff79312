//! Script payloads handed to the command transport.
//!
//! Scripts are owned by an external storage collaborator; the engine
//! treats them as an opaque (content, interpreter) pair.

use serde::{Deserialize, Serialize};

use crate::instance::Platform;

/// Interpreter the remote agent should run the script with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterType {
    /// POSIX shell (Linux instances).
    Shell,
    /// PowerShell (Windows instances).
    PowerShell,
}

impl InterpreterType {
    /// SSM document that runs scripts of this interpreter type.
    pub fn document_name(self) -> &'static str {
        match self {
            Self::Shell => "AWS-RunShellScript",
            Self::PowerShell => "AWS-RunPowerShellScript",
        }
    }

    /// Default interpreter for an instance platform.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Linux => Self::Shell,
            Platform::Windows => Self::PowerShell,
        }
    }
}

/// An executable script: opaque content plus its interpreter type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub content: String,
    pub interpreter: InterpreterType,
}

impl Script {
    pub fn new(content: impl Into<String>, interpreter: InterpreterType) -> Self {
        Self {
            content: content.into(),
            interpreter,
        }
    }
}
