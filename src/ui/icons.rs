//! Shared UI icons and emojis.
//!
//! This module provides common emoji constants used across the UI components
//! for consistent visual styling.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("âœ… ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("âŒ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("âœ¨ ", "*");

// File indicators
pub static FOLDER: Emoji<'_, '_> = Emoji("ğŸ“ ", "");
pub static FILE_NEW: Emoji<'_, '_> = Emoji("ğŸ“„ ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("ğŸ“ ", "~");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("ğŸ—‘ï¸  ", "-");

// Progress indicators
pub static PROGRESS: Emoji<'_, '_> = Emoji("ğŸ“Š ", "[PROG]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("ğŸš§ ", "[BLOCK]");
pub static PIVOT: Emoji<'_, '_> = Emoji("ğŸ”„ ", "[PIVOT]");

// DAG-specific indicators
pub static WAVE: Emoji<'_, '_> = Emoji("ğŸŒŠ ", "[W]");
pub static RUNNING: Emoji<'_, '_> = Emoji("â–¶ï¸  ", "[>]");
pub static REVIEW: Emoji<'_, '_> = Emoji("ğŸ” ", "[R]");
pub static CLOCK: Emoji<'_, '_> = Emoji("â±ï¸  ", "[T]");
