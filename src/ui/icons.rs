//! Shared UI icons. Each falls back to ASCII when the terminal can't
//! render emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Session indicators
pub static CHAT: Emoji<'_, '_> = Emoji("💬 ", ">");
pub static AGENT: Emoji<'_, '_> = Emoji("🤖 ", "[AI]");
pub static CARD: Emoji<'_, '_> = Emoji("📎 ", "#");
pub static PLUG: Emoji<'_, '_> = Emoji("🔌 ", "[WS]");
pub static RECONNECT: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");

// Run indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
