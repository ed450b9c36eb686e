mod parser;
mod vocabulary;

pub use parser::parse;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Circle,
    Square,
    Rectangle,
    Triangle,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorName {
    Red,
    Blue,
    Green,
    Yellow,
    Orange,
    Purple,
    Pink,
    Black,
    White,
    Gray,
    Brown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Animation {
    Rotate,
    Bounce,
    Move,
}

/// Structured representation of one spoken drawing command.
///
/// Every field always carries a usable value: extraction that finds no
/// keyword falls back to the documented default, so downstream code never
/// has to handle an "unknown" case. One intent is produced per command,
/// handed to the generator, and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIntent {
    pub action: Action,
    pub shape: Shape,
    pub color: ColorName,
    pub size: SizeClass,
    pub position: Anchor,
    pub animation: Option<Animation>,
    pub count: u32,
    pub original_command: String,
}

impl ParsedIntent {
    /// The all-defaults intent for a command that matched nothing.
    pub fn defaults_for(command: &str) -> Self {
        Self {
            action: Action::Create,
            shape: Shape::Circle,
            color: ColorName::Blue,
            size: SizeClass::Medium,
            position: Anchor::Center,
            animation: None,
            count: 1,
            original_command: command.to_string(),
        }
    }
}
