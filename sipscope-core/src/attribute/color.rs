//! Attribute colorizers.
//!
//! Colors are abstract: front ends map them onto whatever their terminal or
//! table library offers.

use super::{header, AttributeId};
use crate::config::DisplaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrColor {
    pub color: Color,
    pub bold: bool,
}

impl AttrColor {
    pub const fn plain(color: Color) -> Self {
        Self { color, bold: false }
    }

    pub const fn bold(color: Color) -> Self {
        Self { color, bold: true }
    }
}

/// Maps a formatted attribute value to a color.
pub type Colorizer = fn(&str) -> Option<AttrColor>;

/// Color for an attribute value.
///
/// Returns `None` when colorizing is disabled, when the attribute has no
/// colorizer, or when the colorizer does not know the value.
pub fn color(id: AttributeId, value: &str, settings: &DisplaySettings) -> Option<AttrColor> {
    if !settings.colorize {
        return None;
    }
    header(id).colorizer.and_then(|colorizer| colorizer(value))
}

pub(super) fn sip_method(value: &str) -> Option<AttrColor> {
    let is = |method: &str| value.eq_ignore_ascii_case(method);
    if is("INVITE") {
        Some(AttrColor::bold(Color::Red))
    } else if is("NOTIFY") || is("OPTIONS") {
        Some(AttrColor::plain(Color::Yellow))
    } else if is("REGISTER") {
        Some(AttrColor::plain(Color::Magenta))
    } else if is("SUBSCRIBE") {
        Some(AttrColor::plain(Color::Blue))
    } else {
        None
    }
}

pub(super) fn call_state(value: &str) -> Option<AttrColor> {
    let is = |state: &str| value.eq_ignore_ascii_case(state);
    let color = if is("CALL SETUP") {
        Color::Yellow
    } else if is("IN CALL") {
        Color::Blue
    } else if is("COMPLETED") {
        Color::Green
    } else if is("CANCELLED") || is("REJECTED") {
        Color::Red
    } else if is("BUSY") {
        Color::Magenta
    } else if is("DIVERTED") {
        Color::Cyan
    } else {
        return None;
    };
    Some(AttrColor::plain(color))
}
