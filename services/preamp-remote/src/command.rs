//! Outbound command vocabulary and its text encoding

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between control id and value in an adjust command.
///
/// Firmware builds disagree on this: some expect `Volume:50`, others
/// `Volumes50`. Pick the one the connected device parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustSeparator {
    #[default]
    Colon,
    LetterS,
}

impl AdjustSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustSeparator::Colon => ":",
            AdjustSeparator::LetterS => "s",
        }
    }
}

impl std::str::FromStr for AdjustSeparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "colon" | ":" => Ok(AdjustSeparator::Colon),
            "letter_s" | "s" => Ok(AdjustSeparator::LetterS),
            _ => Err(format!(
                "Invalid separator: {}. Use: colon, letter_s",
                s
            )),
        }
    }
}

/// Parameterless controls with a literal wire string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedCommand {
    PowerToggle,
    VolumeDown,
    VolumeUp,
    InputDown,
    InputUp,
}

impl FixedCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixedCommand::PowerToggle => "Power:Toggle",
            FixedCommand::VolumeDown => "Volume:Down",
            FixedCommand::VolumeUp => "Volume:Up",
            FixedCommand::InputDown => "Input:Down",
            FixedCommand::InputUp => "Input:Up",
        }
    }
}

impl fmt::Display for FixedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command sent to the preamp, one per text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request the full state snapshot
    GetValues,
    Fixed(FixedCommand),
    /// A slider or selector moved to a new value
    Adjust { control_id: String, value: String },
}

impl Command {
    pub fn adjust(control_id: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Adjust {
            control_id: control_id.into(),
            value: value.into(),
        }
    }

    /// Encode as the exact outbound frame
    pub fn encode(&self, separator: AdjustSeparator) -> String {
        match self {
            Command::GetValues => "getValues".to_string(),
            Command::Fixed(fixed) => fixed.as_str().to_string(),
            Command::Adjust { control_id, value } => {
                format!("{}{}{}", control_id, separator.as_str(), value)
            }
        }
    }
}

impl From<FixedCommand> for Command {
    fn from(fixed: FixedCommand) -> Self {
        Command::Fixed(fixed)
    }
}
