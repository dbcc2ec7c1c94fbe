//! Shared UI icons.
//!
//! Each icon falls back to plain ASCII on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static MISSING: Emoji<'_, '_> = Emoji("❓ ", "[??]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Run indicators
pub static WORKER: Emoji<'_, '_> = Emoji("⚙️  ", "[W]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
