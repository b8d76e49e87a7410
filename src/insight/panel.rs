use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Line {
    Text(String),
    Copyable(String),
}

impl Line {
    pub fn as_str(&self) -> &str {
        match self {
            Line::Text(text) | Line::Copyable(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub lines: Vec<Line>,
}

impl Section {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            lines: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.lines.push(Line::Text(text.into()));
        self
    }

    pub fn copyable(mut self, text: impl Into<String>) -> Self {
        self.lines.push(Line::Copyable(text.into()));
        self
    }
}

/// Render model handed back to the wallet for one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightPanel {
    pub sections: Vec<Section>,
}

impl InsightPanel {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading == heading)
    }
}

impl fmt::Display for InsightPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, section) in self.sections.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", section.heading)?;
            writeln!(f, "{}", "-".repeat(section.heading.chars().count().max(3)))?;
            for line in &section.lines {
                let indent = if matches!(line, Line::Copyable(_)) { "  " } else { "" };
                writeln!(f, "{}{}", indent, line.as_str())?;
            }
        }
        Ok(())
    }
}
