use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

lazy_static! {
    static ref HEADER_COLOR_REGEX: Regex = Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap();
}

/// Header color used when a session starts.
pub const DEFAULT_HEADER_COLOR: &str = "#2563eb";

/// Presentation options applied by a transform.
///
/// Field names follow camelCase on the wire so the browser client can send
/// the object it already holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Render the header row in bold
    pub bold_headers: bool,

    /// Resize every column to fit its widest cell
    pub auto_fit_columns: bool,

    /// Paint the header row with `header_color` and a white font
    pub apply_styling: bool,

    /// `#RRGGBB`
    pub header_color: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bold_headers: true,
            auto_fit_columns: false,
            apply_styling: true,
            header_color: DEFAULT_HEADER_COLOR.to_string(),
        }
    }
}

impl Configuration {
    /// Check the structural constraints that must hold before a transform
    /// is dispatched.
    ///
    /// Only `header_color` is constrained; every combination of the boolean
    /// toggles is legal.
    ///
    /// # Examples
    /// ```
    /// use prettysheet::config::Configuration;
    ///
    /// let mut config = Configuration::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.header_color = "2563eb".to_string();
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if is_valid_header_color(&self.header_color) {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "header color must look like #RRGGBB, got {:?}",
                self.header_color
            )))
        }
    }

    /// The header color as a packed `0xRRGGBB` value.
    pub fn header_rgb(&self) -> Result<u32> {
        self.validate()?;
        u32::from_str_radix(&self.header_color[1..], 16)
            .map_err(|e| PipelineError::Validation(e.to_string()))
    }
}

/// Whether `color` is a `#` followed by exactly six hex digits.
pub fn is_valid_header_color(color: &str) -> bool {
    HEADER_COLOR_REGEX.is_match(color)
}
