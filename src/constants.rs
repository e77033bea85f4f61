//! Application-wide constants
//!
//! This module contains the magic strings and numbers used throughout
//! the application, providing a single source of truth for constant values.

/// Keyboard event constants
pub mod keys {
    /// Key name carried by Enter keydown events
    pub const ENTER: &str = "Enter";

    /// Legacy keyCode for Enter, still read by some page handlers
    pub const ENTER_KEY_CODE: u32 = 13;
}

/// Marker attributes used to classify editable elements
pub mod markers {
    /// Attribute set by structured rich-text editors that own their text
    /// model and must receive edits through their command pipeline
    pub const RICH_TEXT_EDITOR: &str = "data-slate-editor";
}

/// Synthetic event constants
pub mod events {
    /// inputType for a beforeinput event requesting a line break
    pub const INSERT_LINE_BREAK: &str = "insertLineBreak";
}

/// Document traversal constants
pub mod dom {
    /// Upper bound on ancestor-chain walks (guards against malformed
    /// page snapshots with parent cycles)
    pub const MAX_ANCESTOR_DEPTH: usize = 256;
}

/// Configuration file constants
pub mod config {
    /// Directory under the user config dir holding our files
    pub const APP_DIR: &str = "softreturn";

    /// Site registry file name
    pub const FILENAME: &str = "sites.json";
}
