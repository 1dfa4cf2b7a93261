//! Serial labels: `"<serial_number> (<test_stand>)"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use strata_db::SerialMatch;

/// Display key for a serial number, disambiguated by test stand.
///
/// A label with no parenthesised suffix has no known stand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialLabel {
    pub serial_number: String,
    pub test_stand: Option<String>,
}

impl SerialLabel {
    pub fn new(serial_number: impl Into<String>, test_stand: Option<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            test_stand,
        }
    }

    /// Parse a label back into its parts. Splits on the last `" ("`.
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        match label.rsplit_once(" (") {
            Some((serial, stand)) => {
                let stand = stand.trim_end_matches(')');
                Self {
                    serial_number: serial.trim().to_string(),
                    test_stand: (!stand.is_empty()).then(|| stand.to_string()),
                }
            }
            None => Self {
                serial_number: label.to_string(),
                test_stand: None,
            },
        }
    }
}

impl fmt::Display for SerialLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.test_stand {
            Some(stand) => write!(f, "{} ({})", self.serial_number, stand),
            None => f.write_str(&self.serial_number),
        }
    }
}

impl From<SerialMatch> for SerialLabel {
    fn from(m: SerialMatch) -> Self {
        Self {
            serial_number: m.serial_number,
            test_stand: m.test_stand,
        }
    }
}
