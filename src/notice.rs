use std::fmt;

/// Shown in place of a blank batch label.
pub const NO_LABEL: &str = "No data";

/// Operator-facing messages produced by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Every row for the chosen key is verified; the last one was selected.
    AllVerified,
    Saved { label: String },
    /// Saved, but to a different row than the one on screen.
    Reassigned { label: String },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::AllVerified => "Notice",
            Notice::Saved { .. } => "Saved",
            Notice::Reassigned { .. } => "Auto-reassigned",
        }
    }
}

fn label_or_placeholder(label: &str) -> &str {
    if label.trim().is_empty() { NO_LABEL } else { label }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::AllVerified => write!(
                f,
                "All records with this value are already verified; the last one was selected."
            ),
            Notice::Saved { label } => {
                write!(f, "Saved successfully.\n\nBatch: {}", label_or_placeholder(label))
            }
            Notice::Reassigned { label } => write!(
                f,
                "The record you were viewing had already been verified by someone else.\n\n\
                 Your data was saved to the next free record.\n\nBatch: {}",
                label_or_placeholder(label)
            ),
        }
    }
}
